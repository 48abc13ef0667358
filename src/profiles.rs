use crate::error::{BrowserError, BrowserResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of the profile log: `{"name": .., "ip": .., "port": .., "auth": ..}`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub ip: String,
    pub port: String,
    #[serde(default)]
    pub auth: String,
}

impl ConnectionProfile {
    pub fn new(name: &str, ip: &str, port: &str, auth: &str) -> Self {
        ConnectionProfile {
            name: name.to_string(),
            ip: ip.to_string(),
            port: port.to_string(),
            auth: auth.to_string(),
        }
    }

    /// Checks the fields needed before any connection attempt.
    pub fn validate(&self) -> BrowserResult<u16> {
        if self.ip.trim().is_empty() || self.port.trim().is_empty() {
            return Err(BrowserError::ValidationFailure(
                "host and port are required".to_string(),
            ));
        }
        self.port.trim().parse::<u16>().map_err(|_| {
            BrowserError::ValidationFailure(format!("'{}' is not a valid port", self.port))
        })
    }

    pub fn password(&self) -> Option<&str> {
        if self.auth.is_empty() {
            None
        } else {
            Some(self.auth.as_str())
        }
    }
}

/// Profiles keyed and ordered by name.
pub type ProfileTable = BTreeMap<String, ConnectionProfile>;

/// Append-only newline-delimited JSON log of connection profiles.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProfileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> BrowserResult<ProfileTable> {
        let mut table = ProfileTable::new();
        if !self.path.exists() {
            return Ok(table);
        }

        let contents = fs::read_to_string(&self.path)?;
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let profile: ConnectionProfile = serde_json::from_str(line).map_err(|e| {
                BrowserError::Profile(format!(
                    "{} line {}: {}",
                    self.path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            // Later records win.
            table.insert(profile.name.clone(), profile);
        }
        Ok(table)
    }

    pub fn append(&self, profile: &ConnectionProfile) -> BrowserResult<()> {
        profile.validate()?;
        if profile.name.trim().is_empty() {
            return Err(BrowserError::ValidationFailure(
                "profile name is required".to_string(),
            ));
        }

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let line = serde_json::to_string(profile).map_err(|e| BrowserError::Profile(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        log::info!("Saved profile '{}' to {}", profile.name, self.path.display());
        Ok(())
    }
}
