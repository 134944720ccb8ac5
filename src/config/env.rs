//! Environment variable handling and .env file management

use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if it exists.
    ///
    /// Variables already present in the process environment win over the
    /// file. Returns whether a file was loaded.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let values = Self::read_env_file(path)?;
        for (key, value) in values {
            if std::env::var_os(&key).is_none() {
                std::env::set_var(key, value);
            }
        }
        Ok(true)
    }

    /// Read a `.env` file without touching the process environment
    pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
        let iter = dotenv::from_path_iter(path)?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item?;
            values.insert(key, value);
        }
        Ok(values)
    }
}
