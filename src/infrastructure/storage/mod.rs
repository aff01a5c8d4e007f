//! Durable backend adapters.

mod file_backend;
mod memory_backend;

pub use file_backend::FileBackend;
pub use memory_backend::MemoryBackend;
