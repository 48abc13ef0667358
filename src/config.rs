use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "keyscope";
const CONFIG_FILE_NAME: &str = "keyscope.toml";
const PROFILE_LOG_NAME: &str = "profiles.jsonl";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of rows shown for one key.
    pub window_size: usize,
    /// Elements requested per LRANGE call while filling a list window.
    pub list_page_size: usize,
    /// COUNT hint passed to SCAN while taking the keyspace inventory.
    pub scan_count: usize,
    pub database_count: u8,
    pub delimiter: char,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_log: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            window_size: 100,
            list_page_size: 1000,
            scan_count: 10000,
            database_count: 16,
            delimiter: ':',
            connect_timeout_ms: 5000,
            response_timeout_ms: 10000,
            profile_log: None,
        }
    }
}

impl Settings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    fn with_profile_log_near(mut self, config_file_path: &Path) -> Self {
        if self.profile_log.is_none() {
            let dir = config_file_path.parent().unwrap_or_else(|| Path::new("."));
            self.profile_log = Some(dir.join(PROFILE_LOG_NAME));
        }
        self
    }

    /// Path of the connection profile log, falling back to the working directory.
    pub fn profile_log_path(&self) -> PathBuf {
        self.profile_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(PROFILE_LOG_NAME))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|base_dirs| base_dirs.config_dir().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load(explicit_path: Option<&Path>) -> Self {
        let config_file_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_config_path() {
                Some(path) => path,
                None => {
                    log::warn!("Could not determine config directory. Using default in-memory settings.");
                    return Self::default();
                }
            },
        };

        if config_file_path.exists() {
            match fs::read_to_string(&config_file_path) {
                Ok(contents) => match toml::from_str::<Settings>(&contents) {
                    Ok(settings) => return settings.with_profile_log_near(&config_file_path),
                    Err(e) => {
                        log::warn!(
                            "Failed to parse config file at '{}': {}. Using default settings.",
                            config_file_path.display(),
                            e
                        );
                    }
                },
                Err(e) => {
                    log::warn!(
                        "Failed to read config file at '{}': {}. Using default settings.",
                        config_file_path.display(),
                        e
                    );
                }
            }
            return Self::default().with_profile_log_near(&config_file_path);
        }

        log::info!(
            "Config file not found at '{}'. Attempting to create a default one.",
            config_file_path.display()
        );
        let default_settings = Self::default();
        match toml::to_string_pretty(&default_settings) {
            Ok(toml_string) => {
                let created = config_file_path
                    .parent()
                    .map_or(Ok(()), fs::create_dir_all)
                    .and_then(|_| fs::write(&config_file_path, toml_string));
                if let Err(e) = created {
                    log::warn!(
                        "Failed to write default config file to '{}': {}",
                        config_file_path.display(),
                        e
                    );
                }
            }
            Err(e) => log::warn!("Failed to serialize default settings: {}", e),
        }
        default_settings.with_profile_log_near(&config_file_path)
    }
}
