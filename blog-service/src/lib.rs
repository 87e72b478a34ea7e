pub mod app;
pub mod config;
pub mod content;
pub mod credentials;
pub mod error;
pub mod extractors;
pub mod metrics;
pub mod post_handlers;
pub mod tokens;
pub mod user_handlers;
pub mod users;

pub use app::{build_router, AppState};
pub use config::ServiceConfig;
