//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::Result,
    i18n::Lang,
    models::Config,
};

/// Builds a [`Config`]: defaults, then `.env`, then the environment, then
/// CLI flags, then validation
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file()?;
        config.lang = Lang::resolve(self.cli.lang.as_deref());
        config.merge_from_env();

        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Parse against an explicit variable lookup instead of the process
    /// environment; no `.env` file is read
    pub fn parse_with_lookup<F>(&self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.lang = match self.cli.lang.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Lang::normalize(value),
            _ => Lang::detect_with(&lookup),
        };
        config.merge_from_lookup(&lookup);

        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(url) = &cli.dl_url {
            config.dl_url = url.clone();
        }
        if let Some(url) = &cli.ul_url {
            config.ul_url = url.clone();
        }
        if let Some(url) = &cli.latency_url {
            config.latency_url = url.clone();
        }
        if let Some(max) = &cli.max {
            config.max = max.clone();
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }
        if let Some(threads) = cli.threads {
            config.threads = threads;
        }
        if let Some(count) = cli.latency_count {
            config.latency_count = count;
        }

        config.enable_color = cli.use_colors();
        config.verbose = cli.verbose;
        config.debug = cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_cli_overrides_env() {
        let cli = Cli::parse_from(["nst", "--threads", "2", "--max", "10M", "--no-color"]);
        let config = ConfigParser::new(cli)
            .parse_with_lookup(env(&[("THREADS", "16"), ("TIMEOUT", "20")]))
            .unwrap();

        assert_eq!(config.threads, 2);
        assert_eq!(config.timeout_seconds, 20);
        assert_eq!(config.max_bytes, 10_000_000);
        assert!(!config.enable_color);
    }

    #[test]
    fn test_lang_flag_beats_environment() {
        let cli = Cli::parse_from(["nst", "--lang", "en"]);
        let config = ConfigParser::new(cli)
            .parse_with_lookup(env(&[("LANG", "zh_CN.UTF-8")]))
            .unwrap();
        assert_eq!(config.lang, Lang::En);

        let cli = Cli::parse_from(["nst"]);
        let config = ConfigParser::new(cli)
            .parse_with_lookup(env(&[("LANG", "zh_CN.UTF-8")]))
            .unwrap();
        assert_eq!(config.lang, Lang::Zh);
    }

    #[test]
    fn test_invalid_cli_value_fails_validation() {
        let cli = Cli::parse_from(["nst", "--threads", "65"]);
        let err = ConfigParser::new(cli).parse_with_lookup(env(&[])).unwrap_err();
        assert!(err.to_string().contains("THREADS must be <= 64"));
    }

    #[test]
    fn test_bad_url_from_env() {
        let cli = Cli::parse_from(["nst"]);
        let err = ConfigParser::new(cli)
            .parse_with_lookup(env(&[("LATENCY_URL", "example.com/small")]))
            .unwrap_err();
        assert!(err.to_string().contains("LATENCY_URL must start with http(s)://"));
    }

    #[test]
    fn test_debug_and_verbose_flags() {
        let cli = Cli::parse_from(["nst", "--debug", "--verbose"]);
        let config = ConfigParser::new(cli).parse_with_lookup(env(&[])).unwrap();
        assert!(config.debug);
        assert!(config.verbose);
    }
}
