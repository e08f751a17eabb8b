// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! New-record notifications.
//!
//! Publishing is best-effort: the pipeline logs a failed publish and keeps
//! the already-persisted snapshot.

use crate::error::{AppError, Result};
use crate::services::google_token::GoogleTokenSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_PUBSUB_BASE_URL: &str = "https://pubsub.googleapis.com";

/// Payload published after a snapshot is promoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub lineage: String,
    pub version_id: String,
    pub new_record_count: usize,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub source_key: String,
    pub total_incoming: usize,
    pub total_prior: usize,
    /// Identity keys of the first new records
    pub new_record_keys: Vec<String>,
    /// Whether `new_record_keys` was cut short
    pub keys_truncated: bool,
}

impl Notification {
    /// One-line summary, used as the message subject.
    pub fn subject(&self) -> String {
        format!(
            "{} new workout record{} for {}",
            self.new_record_count,
            if self.new_record_count == 1 { "" } else { "s" },
            self.lineage
        )
    }
}

/// Channel new-record notifications are published to.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;

    fn describe(&self) -> String;
}

/// Writes notifications to the log (local mode).
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            lineage = %notification.lineage,
            version_id = %notification.version_id,
            new_records = notification.new_record_count,
            keys = ?notification.new_record_keys,
            "{}",
            notification.subject()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        "log".to_string()
    }
}

#[derive(Serialize)]
struct PublishRequest {
    messages: Vec<PubsubMessage>,
}

#[derive(Serialize)]
struct PubsubMessage {
    data: String,
    attributes: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publishes to a Pub/Sub topic over the REST API.
pub struct PubSubNotifier {
    http: reqwest::Client,
    base_url: String,
    topic_path: String,
    /// `None` when talking to an emulator.
    auth: Option<Arc<GoogleTokenSource>>,
}

impl PubSubNotifier {
    pub fn new(
        http: reqwest::Client,
        project_id: &str,
        topic: &str,
        base_url: &str,
        auth: Option<Arc<GoogleTokenSource>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            topic_path: format!("projects/{}/topics/{}", project_id, topic),
            auth,
        }
    }

    fn publish_url(&self) -> String {
        format!("{}/v1/{}:publish", self.base_url, self.topic_path)
    }

    fn build_request(notification: &Notification) -> Result<PublishRequest> {
        let payload = serde_json::to_vec(notification)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;
        let attributes = HashMap::from([
            ("lineage".to_string(), notification.lineage.clone()),
            ("version_id".to_string(), notification.version_id.clone()),
            ("subject".to_string(), notification.subject()),
        ]);
        Ok(PublishRequest {
            messages: vec![PubsubMessage {
                data: BASE64.encode(payload),
                attributes,
            }],
        })
    }
}

#[async_trait]
impl Notifier for PubSubNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let body = Self::build_request(notification)?;

        let mut request = self.http.post(self.publish_url()).json(&body);
        if let Some(auth) = &self.auth {
            let token = auth
                .access_token()
                .await
                .map_err(|e| AppError::Notify(format!("No access token: {}", e)))?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!("HTTP {}: {}", status, body)));
        }

        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| AppError::Notify(format!("JSON parse error: {}", e)))?;

        tracing::info!(
            topic = %self.topic_path,
            message_ids = ?published.message_ids,
            lineage = %notification.lineage,
            "Notification published"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("pubsub:{}", self.topic_path)
    }
}
