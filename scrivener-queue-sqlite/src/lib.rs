#![doc = include_str!("../README.md")]

pub mod store;
pub mod types;

pub use store::SqliteStore;

/// Schema for both tables. Applied by [`SqliteStore::connect`]; embedders
/// managing their own pool can execute it directly.
pub static SCHEMA_SQL: &str = include_str!("../schema.sql");
