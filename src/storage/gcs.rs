// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Storage backend over the JSON API.
//!
//! Preconditions map onto `ifGenerationMatch` (`0` means "must not exist"),
//! which gives real compare-and-swap on the current pointer.

use super::{validate_path, Generation, ObjectStore, StoredObject, WriteCondition};
use crate::error::StorageError;
use crate::services::google_token::GoogleTokenSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

const GENERATION_HEADER: &str = "x-goog-generation";

pub struct GcsStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    /// `None` when talking to an emulator.
    auth: Option<Arc<GoogleTokenSource>>,
}

#[derive(Deserialize)]
struct ObjectResource {
    generation: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

impl GcsStore {
    pub fn new(
        http: reqwest::Client,
        bucket: &str,
        base_url: &str,
        auth: Option<Arc<GoogleTokenSource>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            auth,
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(path)
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket)
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, String> {
        match &self.auth {
            Some(auth) => {
                let token = auth.access_token().await.map_err(|e| e.to_string())?;
                Ok(request.bearer_auth(token))
            }
            None => Ok(request),
        }
    }
}

/// Query parameter for a write precondition, if any.
fn precondition_param(condition: WriteCondition) -> Option<(&'static str, String)> {
    match condition {
        WriteCondition::Overwrite => None,
        WriteCondition::IfAbsent => Some(("ifGenerationMatch", "0".to_string())),
        WriteCondition::IfGenerationMatch(g) => Some(("ifGenerationMatch", g.to_string())),
    }
}

fn parse_generation(value: Option<&str>) -> Option<Generation> {
    value.and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn read(&self, path: &str) -> Result<StoredObject, StorageError> {
        validate_path(path)?;
        let request = self
            .http
            .get(self.object_url(path))
            .query(&[("alt", "media")]);
        let response = self
            .authorize(request)
            .await
            .map_err(|e| StorageError::read(path, e))?
            .send()
            .await
            .map_err(|e| StorageError::read(path, e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(StorageError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::read(path, format!("HTTP {}: {}", status, body)));
        }

        let generation = parse_generation(
            response
                .headers()
                .get(GENERATION_HEADER)
                .and_then(|h| h.to_str().ok()),
        );
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::read(path, e))?;

        Ok(StoredObject {
            bytes: bytes.to_vec(),
            generation,
        })
    }

    async fn write(
        &self,
        path: &str,
        bytes: Vec<u8>,
        condition: WriteCondition,
    ) -> Result<Option<Generation>, StorageError> {
        validate_path(path)?;
        let mut query = vec![
            ("uploadType", "media".to_string()),
            ("name", path.to_string()),
        ];
        query.extend(precondition_param(condition));

        let request = self
            .http
            .post(self.upload_url())
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(bytes);
        let response = self
            .authorize(request)
            .await
            .map_err(|e| StorageError::write(path, e))?
            .send()
            .await
            .map_err(|e| StorageError::write(path, e))?;

        let status = response.status();
        if status.as_u16() == 412 {
            tracing::warn!(path, ?condition, "Cloud Storage precondition failed");
            return Err(StorageError::PreconditionFailed(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::write(path, format!("HTTP {}: {}", status, body)));
        }

        let resource: ObjectResource = response
            .json()
            .await
            .map_err(|e| StorageError::write(path, format!("JSON parse error: {}", e)))?;
        Ok(parse_generation(resource.generation.as_deref()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("prefix", prefix.to_string()),
                ("fields", "items(name),nextPageToken".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let request = self.http.get(self.list_url()).query(&query);
            let response = self
                .authorize(request)
                .await
                .map_err(|e| StorageError::read(prefix, e))?
                .send()
                .await
                .map_err(|e| StorageError::read(prefix, e))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::read(prefix, format!("HTTP {}: {}", status, body)));
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| StorageError::read(prefix, format!("JSON parse error: {}", e)))?;
            keys.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn supports_compare_and_swap(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}
