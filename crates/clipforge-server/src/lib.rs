//! ClipForge Server - the HTTP surface over the engine.
//!
//! Thin request/response mapping: validation and JSON shapes live here,
//! everything stateful lives in the engine.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
