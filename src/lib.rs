//! Communication cards application library
//!
//! This library keeps a single in-memory aggregate of cards and groups,
//! mutates it only through reducer actions, persists it with a debounced
//! writer, and exchanges it as JSON for export and import.

mod card;
mod cli;
mod config;
mod errors;
mod helper;
mod persistence_scheduler;
mod provider;
mod query;
mod reducer;
mod storage;
mod types;

// Re-export key components
pub use card::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use persistence_scheduler::*;
pub use provider::*;
pub use query::*;
pub use reducer::*;
pub use storage::*;
pub use types::*;
