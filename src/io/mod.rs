pub mod archive;
pub mod common;
