//! Output language selection
//!
//! The language is a plain value resolved once at startup and carried in
//! [`crate::models::Config`]; every component that produces user-facing text
//! receives it explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variables consulted, in order, after `SPEEDTEST_LANG`
const LOCALE_VARS: [&str; 4] = ["LC_ALL", "LC_MESSAGES", "LANGUAGE", "LANG"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lang {
    #[default]
    En,
    Zh,
}

impl Lang {
    /// Anything starting with `zh` (case-insensitive) is Chinese
    pub fn normalize(value: &str) -> Self {
        if value.trim().to_lowercase().starts_with("zh") {
            Lang::Zh
        } else {
            Lang::En
        }
    }

    /// Use the explicit override when non-blank, otherwise the environment
    pub fn resolve(override_value: Option<&str>) -> Self {
        match override_value.map(str::trim) {
            Some(value) if !value.is_empty() => Self::normalize(value),
            _ => Self::detect_from_env(),
        }
    }

    pub fn detect_from_env() -> Self {
        Self::detect_with(|key| std::env::var(key).ok())
    }

    /// Detection against an arbitrary variable lookup
    pub fn detect_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SPEEDTEST_LANG") {
            if !value.trim().is_empty() {
                return Self::normalize(&value);
            }
        }

        let chinese = LOCALE_VARS.iter().any(|key| {
            lookup(key)
                .map(|value| value.trim().to_lowercase().starts_with("zh"))
                .unwrap_or(false)
        });

        if chinese {
            Lang::Zh
        } else {
            Lang::En
        }
    }

    /// Find `--lang X` or `--lang=X` before full argument parsing
    pub fn find_lang_arg<S: AsRef<str>>(args: &[S]) -> Option<String> {
        let mut iter = args.iter().map(|arg| arg.as_ref().trim());
        while let Some(arg) = iter.next() {
            if arg == "--lang" {
                return iter.next().map(str::to_string);
            }
            if let Some(value) = arg.strip_prefix("--lang=") {
                return Some(value.trim().to_string());
            }
        }
        None
    }

    pub fn is_zh(self) -> bool {
        self == Lang::Zh
    }

    /// Pick the string for this language
    pub fn text<'a>(self, en: &'a str, zh: &'a str) -> &'a str {
        match self {
            Lang::En => en,
            Lang::Zh => zh,
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lang::En => "en",
            Lang::Zh => "zh",
        })
    }
}
