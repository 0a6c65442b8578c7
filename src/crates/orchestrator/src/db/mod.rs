//! Durable metadata store: jobs, checkpoints, artifacts and the cost ledger.

pub mod connection;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{DatabaseConnection, DatabasePool};
