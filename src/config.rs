use std::{path::PathBuf, time::Duration};

use log::warn;

use crate::timer::DEFAULT_REFRESH_INTERVAL;

pub const DATA_DIR_VAR: &str = "MASTERY_TIMER_DATA_DIR";
pub const STORE_VAR: &str = "MASTERY_TIMER_STORE";
pub const REFRESH_MS_VAR: &str = "MASTERY_TIMER_REFRESH_MS";
pub const DEBUG_VAR: &str = "MASTERY_TIMER_DEBUG";

const DEFAULT_DATA_DIR: &str = ".mastery-timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    JsonFile,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub store: StoreBackend,
    pub refresh_interval: Duration,
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            store: StoreBackend::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Invalid values are reported and replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|value| !value.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(value) = lookup(STORE_VAR) {
            match value.trim().to_ascii_lowercase().as_str() {
                "json" => config.store = StoreBackend::JsonFile,
                "sqlite" => config.store = StoreBackend::Sqlite,
                other => warn!("{STORE_VAR}={other} is not 'json' or 'sqlite'; using json"),
            }
        }

        if let Some(value) = lookup(REFRESH_MS_VAR) {
            match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.refresh_interval = Duration::from_millis(ms),
                _ => warn!(
                    "{REFRESH_MS_VAR}={value} is not a positive integer; using {} ms",
                    DEFAULT_REFRESH_INTERVAL.as_millis()
                ),
            }
        }

        config.debug = lookup(DEBUG_VAR)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        config
    }

    pub fn store_path(&self) -> PathBuf {
        match self.store {
            StoreBackend::JsonFile => self.data_dir.join("settings.json"),
            StoreBackend::Sqlite => self.data_dir.join("mastery-timer.sqlite3"),
        }
    }
}
