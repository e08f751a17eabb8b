// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CSV parsing and encoding of workout snapshots.

use crate::error::{AppError, Result};
use crate::models::{Lineage, Schema, Snapshot, WorkoutRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parse a workout history export into an unversioned snapshot.
///
/// A header-only file is a valid snapshot with no records.
pub fn parse_snapshot(lineage: Lineage, bytes: &[u8]) -> Result<Snapshot> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map_err(|e| AppError::Parse(format!("File is not valid UTF-8: {}", e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let header = reader
        .headers()
        .map_err(|e| AppError::Parse(format!("Unreadable header row: {}", e)))?
        .clone();
    if header.is_empty() {
        return Err(AppError::Parse("File has no header row".to_string()));
    }
    let schema = Schema::from_header(header.iter())?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| AppError::Parse(describe_csv_error(&e)))?;
        let values = row.iter().map(str::to_string).collect();
        records.push(WorkoutRecord::from_values(&schema, values)?);
    }

    let without_workout_id = records.iter().filter(|r| r.workout_id().is_none()).count();
    if without_workout_id > 0 {
        tracing::warn!(
            lineage = %lineage,
            rows = without_workout_id,
            "Rows without a workout link; identity falls back to row contents"
        );
    }

    Ok(Snapshot::new(lineage, schema, records))
}

/// Encode a snapshot as CSV in its original column order.
///
/// Encoding is deterministic: equal snapshots produce equal bytes.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(snapshot.schema.columns())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CSV encode error: {}", e)))?;
    for record in &snapshot.records {
        writer
            .write_record(record.values())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("CSV encode error: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CSV encode error: {}", e)))
}

fn describe_csv_error(err: &csv::Error) -> String {
    match err.position() {
        Some(pos) => format!("Malformed row at line {}: {}", pos.line(), err),
        None => format!("Malformed row: {}", err),
    }
}
