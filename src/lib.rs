pub mod app;
pub mod config;
pub mod crawler;
pub mod error;
pub mod handlers;
pub mod ml;
pub mod models;
pub mod routes;
pub mod scripts;
pub mod services;

pub use config::Config;
pub use error::{ApiError, Result};
