//! Request handlers for the HTTP API

pub mod api;

pub use api::{handle_rejection, routes, ApiError, AppState};
