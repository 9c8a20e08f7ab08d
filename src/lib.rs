pub mod args;
mod backup;
pub mod calc;
pub mod commands;
mod config;
mod db;
mod error;
pub mod model;
pub mod reconcile;
#[cfg(test)]
mod test;
mod utils;

pub use backup::Backup;
pub use config::{Config, Policy};
pub use error::{error_type, Error, ErrorType, IntoResult, Result};
