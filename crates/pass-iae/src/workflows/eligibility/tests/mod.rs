mod certification;
mod common;
