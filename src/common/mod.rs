pub mod config;
pub mod error;
pub mod paths;

pub use config::Config;
pub use error::{RosterError, Result};
pub use paths::{resolve_config_file, system_config_file, user_config_file};
