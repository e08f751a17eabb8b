// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Snapshot version identifiers.
//!
//! Format: `YYYYMMDDHHMMSS-NNNN` (UTC seconds plus a four-digit counter).
//! Every id has the same width, so string order equals creation order.

use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_LEN: usize = 14;
const SEQUENCE_LEN: usize = 4;

/// Largest counter value before the id rolls into the next second.
pub const MAX_SEQUENCE: u16 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId {
    at: DateTime<Utc>,
    seq: u16,
}

impl VersionId {
    /// First id for the second containing `at`.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at: at.trunc_subsecs(0),
            seq: 0,
        }
    }

    /// Smallest id strictly greater than `self`.
    pub fn successor(&self) -> Self {
        if self.seq < MAX_SEQUENCE {
            Self {
                at: self.at,
                seq: self.seq + 1,
            }
        } else {
            Self {
                at: self.at + Duration::seconds(1),
                seq: 0,
            }
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn sequence(&self) -> u16 {
        self.seq
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            self.at.format(TIMESTAMP_FORMAT),
            self.seq,
            width = SEQUENCE_LEN
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid version id: {0}")]
pub struct InvalidVersionId(String);

impl FromStr for VersionId {
    type Err = InvalidVersionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersionId(s.to_string());

        let (stamp, seq) = s.split_once('-').ok_or_else(invalid)?;
        if stamp.len() != TIMESTAMP_LEN
            || seq.len() != SEQUENCE_LEN
            || !stamp.bytes().all(|b| b.is_ascii_digit())
            || !seq.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|_| invalid())?
            .and_utc();
        let seq = seq.parse().map_err(|_| invalid())?;

        Ok(Self { at, seq })
    }
}

impl TryFrom<String> for VersionId {
    type Error = InvalidVersionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionId> for String {
    fn from(value: VersionId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_format_is_fixed_width() {
        let id = VersionId::at(t(9, 5, 7));
        assert_eq!(id.to_string(), "20240210090507-0000");
        assert_eq!(id.successor().to_string(), "20240210090507-0001");
    }

    #[test]
    fn test_subsecond_precision_dropped() {
        let at = t(9, 5, 7) + Duration::milliseconds(750);
        assert_eq!(VersionId::at(at), VersionId::at(t(9, 5, 7)));
    }

    #[test]
    fn test_parse_display_agree() {
        let id: VersionId = "20240210090507-0042".parse().unwrap();
        assert_eq!(id.sequence(), 42);
        assert_eq!(id.timestamp(), t(9, 5, 7));
        assert_eq!(id.to_string(), "20240210090507-0042");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "20240210090507",
            "20240210090507-42",
            "2024021009050-0042",
            "20241310090507-0000",
            "20240210090507-00a1",
            "../20240210090507-0000",
        ] {
            assert!(bad.parse::<VersionId>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_successor_rolls_over_second() {
        let id: VersionId = "20240210090507-9999".parse().unwrap();
        assert_eq!(id.successor().to_string(), "20240210090508-0000");
        assert!(id.successor() > id);
    }

    #[test]
    fn test_ordering_matches_string_ordering() {
        let ids = [
            "20240210090507-0000",
            "20240210090507-0001",
            "20240210090508-0000",
            "20250101000000-0000",
        ];
        for pair in ids.windows(2) {
            let a: VersionId = pair[0].parse().unwrap();
            let b: VersionId = pair[1].parse().unwrap();
            assert!(a < b);
            assert!(a.to_string() < b.to_string());
        }
    }

    #[test]
    fn test_serde_as_string() {
        let id: VersionId = "20240210090507-0003".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"20240210090507-0003\"");
        let back: VersionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
