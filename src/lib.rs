pub mod network;
pub mod config;
pub mod error;
pub mod utils;

pub use error::{SentryError, Result};
pub use config::Config;
pub use network::{Analyzer, Report};
