pub mod config_validator;
pub mod enhanced_config;
pub mod serde_fmt;
