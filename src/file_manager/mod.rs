// File system helpers: atomic JSON storage and directory operations
pub mod fs_ops;
pub mod json_ops;

pub use fs_ops::*;
pub use json_ops::*;
