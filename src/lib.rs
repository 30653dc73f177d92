pub mod app;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod protocol;
pub mod store;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
