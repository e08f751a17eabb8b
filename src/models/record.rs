// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Workout history rows and their identity keys.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

pub const DATE_SUBMITTED_COLUMN: &str = "Date Submitted";
pub const WORKOUT_DATE_COLUMN: &str = "Workout Date";
pub const ACTIVITY_TYPE_COLUMN: &str = "Activity Type";
pub const LINK_COLUMN: &str = "Link";

/// Columns every workout export must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    DATE_SUBMITTED_COLUMN,
    WORKOUT_DATE_COLUMN,
    ACTIVITY_TYPE_COLUMN,
    "Calories Burned (kcal)",
    "Distance (mi)",
    "Workout Time (seconds)",
    LINK_COLUMN,
];

/// Hex characters of the row digest kept in fallback keys.
const ROW_DIGEST_LEN: usize = 16;

/// Value deciding whether two rows describe the same workout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column layout of one file, validated against [`REQUIRED_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
    workout_date: usize,
    activity_type: usize,
    link: usize,
}

impl Schema {
    /// Build a schema from a header row.
    pub fn from_header<I, S>(header: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = header
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .collect();

        // Spreadsheet exports often end the header with unnamed columns.
        let mut seen = HashSet::new();
        if let Some(dup) = columns
            .iter()
            .filter(|c| !c.is_empty())
            .find(|c| !seen.insert(c.as_str()))
        {
            return Err(AppError::Parse(format!("Duplicate column: {}", dup)));
        }

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|required| !columns.iter().any(|c| c == required))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Parse(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }

        let position = |name: &str| columns.iter().position(|c| c == name).unwrap_or(0);
        let workout_date = position(WORKOUT_DATE_COLUMN);
        let activity_type = position(ACTIVITY_TYPE_COLUMN);
        let link = position(LINK_COLUMN);

        Ok(Self {
            columns,
            workout_date,
            activity_type,
            link,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// One parsed row. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutRecord {
    values: Vec<String>,
    workout_date: String,
    activity_type: String,
    workout_id: Option<String>,
    key: IdentityKey,
}

impl WorkoutRecord {
    /// Build a record from a row whose values line up with `schema`.
    pub fn from_values(schema: &Schema, values: Vec<String>) -> Result<Self, AppError> {
        if values.len() != schema.len() {
            return Err(AppError::Parse(format!(
                "Expected {} fields, found {}",
                schema.len(),
                values.len()
            )));
        }

        let workout_date = values[schema.workout_date].trim().to_string();
        let activity_type = values[schema.activity_type].trim().to_string();
        let workout_id = extract_workout_id(&values[schema.link]).map(str::to_string);

        let key = match &workout_id {
            Some(id) => IdentityKey(format!("workout:{}", id)),
            None => IdentityKey(format!(
                "row:{}|{}|{}",
                workout_date,
                activity_type,
                row_digest(&values)
            )),
        };

        Ok(Self {
            values,
            workout_date,
            activity_type,
            workout_id,
            key,
        })
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn workout_date(&self) -> &str {
        &self.workout_date
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    /// Numeric workout id from the `Link` column, if the link carries one.
    pub fn workout_id(&self) -> Option<&str> {
        self.workout_id.as_deref()
    }

    /// Look up a value by column name.
    pub fn get<'a>(&'a self, schema: &Schema, column: &str) -> Option<&'a str> {
        schema
            .index_of(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }
}

/// Extract the workout id from a link such as
/// `http://www.mapmyfitness.com/workout/7434147697`.
pub fn extract_workout_id(link: &str) -> Option<&str> {
    const MARKER: &str = "/workout/";
    link.match_indices(MARKER).find_map(|(start, _)| {
        let rest = &link[start + MARKER.len()..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })
}

fn row_digest(values: &[String]) -> String {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..ROW_DIGEST_LEN].to_string()
}
