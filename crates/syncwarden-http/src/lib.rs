pub mod auth;
pub mod http;
pub mod protocol;

pub use http::{HttpError, HttpState, build_router, run_http_server};
