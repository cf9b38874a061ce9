//! Persistence Adapters - Crash-safe JSON File Storage
//!
//! Implements the ledger and portfolio repository ports with whole-file
//! JSON tables written atomically (tmp → fsync → rename) and a last good
//! backup per file. No database dependency.

pub mod repository_impl;
pub mod state;

pub use repository_impl::JsonFileRepository;
pub use state::AtomicJsonFile;
