//! Replication packet repository client.
//!
//! Packets live at `<base>/replication-<seq>.tar.bz2`. The base is either an
//! HTTP(S) URL or a local directory holding a mirror of the archives.

use std::path::PathBuf;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use livefeed_types::{ReplicationPacket, Settings};

use crate::archive::decode_packet;
use crate::error::PacketError;

/// Configuration for the packet repository client.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Base URL or directory
    pub base: String,

    /// Access token sent as the `token` query parameter
    pub access_token: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum attempts per packet
    pub max_retries: u32,

    /// First retry delay
    pub retry_initial_interval: Duration,
}

impl RepositoryConfig {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            access_token: None,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_initial_interval: Duration::from_millis(500),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base: settings.replication_repository.clone(),
            access_token: settings
                .access_token
                .clone()
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            timeout: Duration::from_secs(settings.fetch_timeout_secs),
            max_retries: settings.fetch_max_retries.max(1),
            retry_initial_interval: Duration::from_millis(500),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_initial_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upper bound on the time spent retrying one packet: every attempt
    /// may take the full request timeout.
    pub fn fetch_deadline(&self) -> Duration {
        self.timeout * self.max_retries
    }
}

enum Location {
    Http(Client),
    Directory(PathBuf),
}

/// Client for a packet repository.
pub struct PacketRepository {
    location: Location,
    config: RepositoryConfig,
}

impl PacketRepository {
    /// Create a repository client.
    pub fn new(config: RepositoryConfig) -> Result<Self, PacketError> {
        let base = config.base.trim();
        if base.is_empty() {
            return Err(PacketError::Config(
                "replication repository is empty".to_string(),
            ));
        }

        let location = if base.starts_with("http://") || base.starts_with("https://") {
            let client = Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| PacketError::Config(e.to_string()))?;
            Location::Http(client)
        } else {
            Location::Directory(PathBuf::from(base.trim_start_matches("file://")))
        };

        Ok(Self { location, config })
    }

    /// Location of packet `sequence`.
    pub fn packet_location(&self, sequence: i64) -> String {
        format!(
            "{}/replication-{}.tar.bz2",
            self.config.base.trim().trim_end_matches('/'),
            sequence
        )
    }

    /// Fetch and decode packet `sequence`, None when it does not exist yet.
    pub async fn load(&self, sequence: i64) -> Result<Option<ReplicationPacket>, PacketError> {
        let Some(bytes) = self.fetch(sequence).await? else {
            debug!(sequence, "Packet not available");
            return Ok(None);
        };
        let packet = decode_packet(bytes).await?;
        if packet.replication_sequence != sequence {
            warn!(
                requested = sequence,
                found = packet.replication_sequence,
                "Packet reports a different replication sequence"
            );
        }
        info!(
            sequence,
            schema_sequence = packet.schema_sequence,
            changes = packet.changes.len(),
            "Loaded packet"
        );
        Ok(Some(packet))
    }

    /// Fetch the raw archive for packet `sequence`.
    pub async fn fetch(&self, sequence: i64) -> Result<Option<Vec<u8>>, PacketError> {
        match &self.location {
            Location::Http(client) => self.fetch_http(client, sequence).await,
            Location::Directory(dir) => {
                let path = dir.join(format!("replication-{sequence}.tar.bz2"));
                match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(PacketError::Io(e)),
                }
            }
        }
    }

    /// Fetch over HTTP with retry on transient failures.
    async fn fetch_http(
        &self,
        client: &Client,
        sequence: i64,
    ) -> Result<Option<Vec<u8>>, PacketError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.retry_initial_interval,
            max_elapsed_time: Some(self.config.fetch_deadline()),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(sequence, attempt = attempts, "Fetching packet");

            match self.request(client, sequence).await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %e, sequence, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                sequence,
                                retry_in_ms = duration.as_millis(),
                                "Packet fetch failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, sequence, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Make a single request.
    async fn request(
        &self,
        client: &Client,
        sequence: i64,
    ) -> Result<Option<Vec<u8>>, PacketError> {
        let url = self.packet_location(sequence);
        let mut request = client.get(&url);
        if let Some(token) = &self.config.access_token {
            request = request.query(&[("token", token.expose_secret())]);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PacketError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }
}
