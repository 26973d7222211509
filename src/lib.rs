// Library crate - exports the detectors, routine and their configuration

pub mod config;
pub mod error;
pub mod trading_core;

// Re-export commonly used types
pub use config::IctConfig;
pub use error::DataError;
pub use trading_core::*;
