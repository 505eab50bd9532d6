//! `gatewarden-core` — configuration, runtime setting overrides, error type,
//! payload signing, and message texts shared by every Gatewarden crate.

pub mod config;
pub mod error;
pub mod settings;
pub mod signing;
pub mod texts;
pub mod words;

pub use config::Config;
pub use error::{GateError, Result};
pub use settings::RuntimeSettings;
