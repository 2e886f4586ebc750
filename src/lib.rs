pub mod config;
pub mod error;
pub mod models;
pub mod terminal;

pub use error::{AppError, Result};
