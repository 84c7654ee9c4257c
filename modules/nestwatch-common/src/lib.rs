pub mod config;
pub mod error;
pub mod pii;
pub mod security;
pub mod types;

pub use config::{Config, ExposureRules};
pub use error::NestwatchError;
pub use pii::detect_pii;
pub use security::{SecurityError, SecurityResult, UrlValidator};
pub use types::*;
