//! HTTP boundary

pub mod api;

pub use api::{build_router, run_server, ApiError, AppState};
