//! Fetch gateway: on-demand retrieval of the full member collection.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{DirectoryError, ErrorResponse};
use crate::models::Member;

/// Source of complete member snapshots.
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// Fetch every member, newest first.
    async fn fetch_all(&self) -> Result<Vec<Member>, DirectoryError>;
}

/// Envelope of the read endpoint, decoded loosely so that one bad record does
/// not sink the whole snapshot.
#[derive(Deserialize)]
struct RawMembers {
    members: Vec<serde_json::Value>,
}

/// HTTP implementation of [`MemberSource`] against `GET {base}/members`.
#[derive(Clone)]
pub struct HttpMemberGateway {
    client: Client,
    members_url: String,
}

impl HttpMemberGateway {
    pub fn new(client: Client, api_base_url: &str) -> Self {
        Self {
            client,
            members_url: format!("{}/members", api_base_url.trim_end_matches('/')),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DirectoryError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(client, &config.api_base_url))
    }

    pub fn members_url(&self) -> &str {
        &self.members_url
    }
}

#[async_trait]
impl MemberSource for HttpMemberGateway {
    async fn fetch_all(&self) -> Result<Vec<Member>, DirectoryError> {
        debug!(url = %self.members_url, "Fetching members");

        let response = self
            .client
            .get(&self.members_url)
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(DirectoryError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(DirectoryError::Transport)?;

        if !status.is_success() {
            return Err(DirectoryError::Server {
                status: status.as_u16(),
                message: server_message(status, &body),
            });
        }

        let raw: RawMembers = serde_json::from_slice(&body)?;
        Ok(decode_members(raw.members))
    }
}

/// Server-supplied message if there is one, else the status description.
fn server_message(status: StatusCode, body: &[u8]) -> String {
    let message = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    if !message.is_empty() {
        return message;
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Decode and validate each record, keeping the valid ones in order.
fn decode_members(values: Vec<serde_json::Value>) -> Vec<Member> {
    let total = values.len();
    let members: Vec<Member> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let member = serde_json::from_value::<Member>(value)
                .map_err(DirectoryError::from)
                .and_then(|member| member.validate().map(|_| member));
            match member {
                Ok(member) => Some(member),
                Err(e) => {
                    warn!(index, error = %e, "Skipping invalid member record");
                    None
                }
            }
        })
        .collect();
    debug!(received = total, kept = members.len(), "Decoded members");
    members
}
