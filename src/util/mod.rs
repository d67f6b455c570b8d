pub mod build_folder;
pub mod config;
pub mod file;
pub mod map;
pub mod nm;
pub mod objdump;
pub mod parse;
pub mod path;
pub mod report;
pub mod toolchain;
