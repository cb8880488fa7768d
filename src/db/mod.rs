//! Database module for gamewatch.
//!
//! Provides SQLite storage with embedded migrations and the storage ports
//! used by the refresh cycle.

mod models;
mod ports;
mod store;

pub use models::*;
pub use ports::*;
pub use store::*;
