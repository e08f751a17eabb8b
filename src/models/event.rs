// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trigger events that start an ingestion.
//!
//! Accepted shapes:
//! - Cloud Storage object-finalized payload (`{"bucket", "name", ...}`), as
//!   delivered by Eventarc
//! - Pub/Sub push envelope wrapping that payload in base64
//! - S3-style notification records (`{"Records": [{"s3": ...}]}`)
//! - Local invocation (`{"file_key", "lineage"?}`)

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// A file-arrival notification, independent of how it was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestEvent {
    /// Bucket (cloud mode) or `None` for local invocations
    pub bucket: Option<String>,
    /// Object key / path relative to the storage root
    pub object_key: String,
    /// Explicit lineage; derived from the key when absent
    pub lineage: Option<String>,
}

impl IngestEvent {
    /// Local-mode event for a file under the storage root.
    pub fn local(file_key: impl Into<String>) -> Self {
        Self {
            bucket: None,
            object_key: file_key.into(),
            lineage: None,
        }
    }

    pub fn object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            object_key: key.into(),
            lineage: None,
        }
    }

    pub fn with_lineage(mut self, lineage: impl Into<String>) -> Self {
        self.lineage = Some(lineage.into());
        self
    }

    /// Parse any accepted event shape.
    pub fn from_json(value: serde_json::Value) -> Result<Self, AppError> {
        let raw: RawEvent = serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("Unrecognized event payload: {}", e)))?;

        let event = match raw {
            RawEvent::PubSubPush { message } => {
                let data = BASE64.decode(message.data.trim()).map_err(|e| {
                    AppError::BadRequest(format!("Invalid Pub/Sub message data: {}", e))
                })?;
                let inner: StorageObject = serde_json::from_slice(&data).map_err(|e| {
                    AppError::BadRequest(format!("Invalid storage object payload: {}", e))
                })?;
                Self::object(inner.bucket, inner.name)
            }
            RawEvent::S3 { records } => {
                let record = records
                    .into_iter()
                    .next()
                    .ok_or_else(|| AppError::BadRequest("Event has no records".to_string()))?;
                Self::object(record.s3.bucket.name, decode_s3_key(&record.s3.object.key)?)
            }
            RawEvent::Object(object) => Self::object(object.bucket, object.name),
            RawEvent::Local { file_key, lineage } => Self {
                bucket: None,
                object_key: file_key,
                lineage,
            },
        };

        if event.object_key.trim().is_empty() {
            return Err(AppError::BadRequest("Event has an empty object key".to_string()));
        }
        Ok(event)
    }
}

/// S3 notifications URL-encode keys, with `+` standing for a space.
fn decode_s3_key(key: &str) -> Result<String, AppError> {
    urlencoding::decode(&key.replace('+', " "))
        .map(|k| k.into_owned())
        .map_err(|e| AppError::BadRequest(format!("Invalid object key encoding: {}", e)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEvent {
    PubSubPush {
        message: PushMessage,
    },
    S3 {
        #[serde(rename = "Records")]
        records: Vec<S3Record>,
    },
    Object(StorageObject),
    Local {
        file_key: String,
        #[serde(default)]
        lineage: Option<String>,
    },
}

#[derive(Deserialize)]
struct PushMessage {
    data: String,
}

#[derive(Deserialize)]
struct StorageObject {
    bucket: String,
    name: String,
}

#[derive(Deserialize)]
struct S3Record {
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}
