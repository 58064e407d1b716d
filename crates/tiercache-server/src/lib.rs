//! tiercache HTTP endpoints
//!
//! On-demand revalidation by tag or path, cache inspection and direct entry
//! access over a shared [`tiercache::CacheHandler`].

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

pub use routes::{api_routes, app};
pub use state::AppState;
