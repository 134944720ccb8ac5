//! Configuration management module

pub mod env;
pub mod parser;
pub mod size;

pub use env::EnvManager;
pub use parser::{load_config, ConfigParser};
pub use size::{human_bytes, parse_size};

pub use crate::models::Config;
