pub mod auth;
pub mod cache;
pub mod content;
mod convert;
pub mod error;
pub mod feed;
pub mod follow;
pub mod handlers;
pub mod media;
pub mod middleware;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_helpers;

pub use routes::router;
pub use state::{AppState, AppStateInner};
