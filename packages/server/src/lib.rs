pub mod app;
pub mod config;
pub mod routes;

pub use app::{build_app, build_publisher, AppState};
pub use config::Config;
