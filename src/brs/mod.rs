//! BRS grading portal client.

pub mod api;
pub mod cache;
pub mod errors;
pub mod json;
pub mod middleware;
pub mod models;
pub mod session;

pub use api::BrsApi;
pub use cache::CachedDirectory;
pub use errors::BrsApiError;
pub use session::Session;
