// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access tokens for the Cloud Storage and Pub/Sub REST APIs.
//!
//! Credentials are resolved by `gcloud-sdk` the same way every Google
//! client library does it (Application Default Credentials):
//! `GOOGLE_APPLICATION_CREDENTIALS`, the `gcloud auth application-default`
//! login, then the metadata server on Cloud Run.

use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use gcloud_sdk::{Source, TokenSourceType, GCP_DEFAULT_SCOPES};
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// Token source shared by the storage and notifier clients.
pub struct GoogleTokenSource {
    source: Box<dyn Source + Send + Sync>,
    cache: Mutex<Option<CachedToken>>,
}

impl GoogleTokenSource {
    /// Application Default Credentials.
    pub async fn from_environment() -> Result<Self> {
        Self::new(TokenSourceType::Default).await
    }

    pub async fn new(source_type: TokenSourceType) -> Result<Self> {
        let source = gcloud_sdk::create_source(source_type, GCP_DEFAULT_SCOPES.clone())
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to load Google credentials: {}", e))
            })?;
        Ok(Self {
            source,
            cache: Mutex::new(None),
        })
    }

    /// Get a valid access token, refreshing it when close to expiry.
    pub async fn access_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Utc::now())) {
            return Ok(cached.access_token.clone());
        }

        tracing::debug!("Refreshing Google access token");
        let token = self.source.token().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to get Google access token: {}", e))
        })?;

        let fresh = CachedToken {
            access_token: token.token.as_sensitive_str().to_string(),
            expires_at: token.expiry,
        };
        let access_token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(access_token)
    }
}
