use crate::config::Settings;
use crate::error::{BrowserError, BrowserResult};
use crate::profiles::ConnectionProfile;
use redis::{aio::MultiplexedConnection, Client, FromRedisValue};
use std::time::Duration;
use url::Url;

/// Opens handles bound to one logical database of a profile's server.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    connect_timeout: Duration,
    response_timeout: Duration,
}

/// A pooled connection bound to a single (profile, database) pair.
///
/// Every command goes through [`Handle::query`], which applies the response
/// timeout. Nothing is retried.
#[derive(Clone)]
pub struct Handle {
    profile_name: String,
    db_index: u8,
    connection: MultiplexedConnection,
    response_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            response_timeout: settings.response_timeout(),
        }
    }

    pub async fn open(&self, profile: &ConnectionProfile, db_index: u8) -> BrowserResult<Handle> {
        let url = connection_url(profile, db_index)?;
        let client = Client::open(url.as_str())
            .map_err(|e| BrowserError::ConnectionFailure(e.to_string()))?;
        let connection = match tokio::time::timeout(
            self.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(BrowserError::ConnectionFailure(format!(
                    "{} ({}:{}): {}",
                    profile.name, profile.ip, profile.port, e
                )))
            }
            Err(_) => {
                return Err(BrowserError::ConnectionFailure(format!(
                    "{} ({}:{}): connect timed out after {:?}",
                    profile.name, profile.ip, profile.port, self.connect_timeout
                )))
            }
        };
        log::info!(
            "Connected to {} ({}:{}), DB {}",
            profile.name,
            profile.ip,
            profile.port,
            db_index
        );
        Ok(Handle {
            profile_name: profile.name.clone(),
            db_index,
            connection,
            response_timeout: self.response_timeout,
        })
    }

    /// Opens database 0 and pings it. Any failure is reported as `false`.
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> bool {
        match self.open(profile, 0).await {
            Ok(mut handle) => handle.ping().await,
            Err(e) => {
                log::warn!("Connection test for '{}' failed: {}", profile.name, e);
                false
            }
        }
    }
}

impl Handle {
    pub fn db_index(&self) -> u8 {
        self.db_index
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub async fn query<T: FromRedisValue>(&mut self, cmd: &redis::Cmd) -> BrowserResult<T> {
        match tokio::time::timeout(self.response_timeout, cmd.query_async::<T>(&mut self.connection))
            .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(BrowserError::Timeout),
        }
    }

    pub async fn ping(&mut self) -> bool {
        match self.query::<String>(&redis::cmd("PING")).await {
            Ok(reply) => reply == "PONG",
            Err(e) => {
                log::warn!("PING on {} DB {} failed: {}", self.profile_name, self.db_index, e);
                false
            }
        }
    }
}

fn connection_url(profile: &ConnectionProfile, db_index: u8) -> BrowserResult<Url> {
    let port = profile.validate()?;
    let host = profile.ip.trim();
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    let mut url = Url::parse(&format!("redis://{}:{}/{}", host, port, db_index))
        .map_err(|e| BrowserError::ValidationFailure(format!("invalid host '{}': {}", profile.ip, e)))?;
    if let Some(password) = profile.password() {
        url.set_password(Some(password))
            .map_err(|_| BrowserError::ValidationFailure("cannot encode password".to_string()))?;
    }
    Ok(url)
}
