//! Topic bootstrap against the Topic Authority.
//!
//! One `POST` per attempt, carrying the access token and device identity;
//! a success yields the session topic plus ephemeral broker credentials.
//! Failures are classified here so the session controller only has to ask
//! [`Error::is_retryable`](crate::Error::is_retryable).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use livetrack_protocol::{Role, TopicRequest, TopicResponse};

use crate::broker::Credentials;
use crate::config::{ServiceConfig, REQUEST_TIMEOUT};
use crate::error::{Error, Result};

/// Topic and credentials issued for one tracking identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicGrant {
    pub topic: String,
    pub credentials: Credentials,
}

/// Obtains a topic grant for a tracking identifier.
///
/// The production implementation is [`TopicBootstrapClient`]; tests plug in
/// [`testing::FakeBootstrap`](crate::testing::FakeBootstrap).
#[async_trait]
pub trait BootstrapClient: Send + Sync + 'static {
    async fn issue(&self, tracking_identifier: &str, role: Role) -> Result<TopicGrant>;
}

/// REST client for the Topic Authority.
#[derive(Debug, Clone)]
pub struct TopicBootstrapClient {
    http: reqwest::Client,
    config: Arc<ServiceConfig>,
}

impl TopicBootstrapClient {
    pub fn new(config: Arc<ServiceConfig>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Transient(e.to_string()))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl BootstrapClient for TopicBootstrapClient {
    async fn issue(&self, tracking_identifier: &str, role: Role) -> Result<TopicGrant> {
        let body = TopicRequest {
            role,
            track_id: tracking_identifier.to_string(),
            device_id: self.config.device_identifier.to_string(),
        };

        debug!(
            target = "livetrack.bootstrap",
            track_id = %tracking_identifier,
            %role,
            "requesting topic grant"
        );

        let response = self
            .http
            .post(self.config.base_url.clone())
            .header("x-api-key", &self.config.access_token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            return Err(Error::ServiceUnavailable(format!(
                "topic authority returned {status}"
            )));
        }

        let parsed: TopicResponse = response
            .json()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        debug!(
            target = "livetrack.bootstrap",
            topic = %parsed.data.topic,
            "received topic grant"
        );

        Ok(TopicGrant {
            topic: parsed.data.topic,
            credentials: Credentials {
                username: parsed.data.username,
                password: parsed.data.password,
            },
        })
    }
}
