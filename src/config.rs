// Runtime configuration for archir
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Extraction worker threads, 0 for the rayon default (ARCHIR_WORKERS)
    pub workers: usize,

    /// Source files larger than this are skipped, 0 disables (ARCHIR_MAX_FILE_BYTES)
    pub max_file_bytes: u64,

    /// Treat warnings as fatal in `check` (ARCHIR_DENY_WARNINGS)
    pub deny_warnings: bool,

    /// Log directive used when RUST_LOG is unset (ARCHIR_LOG)
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 0,
            max_file_bytes: 2 * 1024 * 1024,
            deny_warnings: false,
            log: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        override_parsed(&lookup, "ARCHIR_WORKERS", &mut config.workers);
        override_parsed(&lookup, "ARCHIR_MAX_FILE_BYTES", &mut config.max_file_bytes);
        if let Some(val) = lookup("ARCHIR_DENY_WARNINGS") {
            match parse_flag(&val) {
                Some(flag) => config.deny_warnings = flag,
                None => warn!(
                    value = %val,
                    default = config.deny_warnings,
                    "invalid ARCHIR_DENY_WARNINGS value, using default"
                ),
            }
        }
        if let Some(val) = lookup("ARCHIR_LOG")
            && !val.trim().is_empty()
        {
            config.log = val.trim().to_string();
        }
        config
    }
}

/// Get the global configuration instance
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    let Some(val) = lookup(key) else {
        return;
    };
    match val.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(value = %val, default = %slot, "invalid {key} value, using default"),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
