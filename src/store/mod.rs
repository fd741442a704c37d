//! Persistence layer: the profile database is loaded and saved as one document.

pub mod json_file;
pub mod memory;
pub mod traits;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use traits::ProfileStore;
