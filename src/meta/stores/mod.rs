//! Metadata Store Implementations
//!
//! Concrete implementations of the `MetaStore` trait. The relational store
//! is the only backend: metadata consistency leans on its transactions and
//! row locks.
//!
//! - `DatabaseMetaStore`: SQL databases (PostgreSQL, SQLite)
pub mod database_store;

pub use database_store::DatabaseMetaStore;
