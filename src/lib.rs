pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod models;

#[cfg(test)]
mod testing;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
