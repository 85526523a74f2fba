pub mod filesystem;

pub use filesystem::{FileSystem, LocalFileSystem};
