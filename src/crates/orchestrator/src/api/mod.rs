//! HTTP read/control API and the live event stream.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod snapshot;

pub use error::{ApiError, ApiResult};
pub use routes::{create_router, AppState};
