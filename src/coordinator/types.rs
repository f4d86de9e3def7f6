// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public result types for the flow orchestrator.

use serde::{Serialize, Serializer};

use crate::record::Record;
use crate::storage::traits::UpdateCounts;

/// Tri-state result of one store step.
///
/// Serializes as `null` / `false` / `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// An error occurred (store unreachable, malformed input, unknown model)
    Failed,
    /// Ran successfully but found or affected nothing
    NotFound,
    /// Ran successfully and did something
    Done,
}

impl Outcome {
    #[must_use]
    pub fn as_option(&self) -> Option<bool> {
        match self {
            Self::Failed => None,
            Self::NotFound => Some(false),
            Self::Done => Some(true),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Failed => "error",
            Self::NotFound => "not_found",
            Self::Done => "ok",
        }
    }
}

impl From<Option<bool>> for Outcome {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Failed,
            Some(false) => Self::NotFound,
            Some(true) => Self::Done,
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed => write!(f, "null"),
            Self::NotFound => write!(f, "false"),
            Self::Done => write!(f, "true"),
        }
    }
}

/// Attribute projection for [`Flow::get`](super::Flow::get).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Attributes {
    #[default]
    All,
    /// Keep these attributes (embedded relations are always kept)
    Only(Vec<String>),
}

impl Attributes {
    pub fn only<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::Only(names.into_iter().map(Into::into).collect())
    }
}

/// Result of [`Flow::save`](super::Flow::save).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    pub primary: Outcome,
    pub cache: Outcome,
    /// Rows as stored by the primary store (generated keys included);
    /// `None` when the primary write failed
    pub records: Option<Vec<Record>>,
}

impl SaveReport {
    pub(crate) fn failed() -> Self {
        Self {
            primary: Outcome::Failed,
            cache: Outcome::Failed,
            records: None,
        }
    }
}

/// Result of [`Flow::update`](super::Flow::update). `None` marks a failed side;
/// the two sides are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub primary: Option<UpdateCounts>,
    pub cache: Option<UpdateCounts>,
}

/// Result of [`Flow::delete`](super::Flow::delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub primary: Outcome,
    pub cache: Outcome,
}

impl DeleteReport {
    pub(crate) fn failed() -> Self {
        Self {
            primary: Outcome::Failed,
            cache: Outcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serializes_as_tri_state() {
        let report = DeleteReport {
            primary: Outcome::NotFound,
            cache: Outcome::Failed,
        };
        assert_eq!(serde_json::to_value(report).unwrap(), json!({"primary": false, "cache": null}));
        assert_eq!(serde_json::to_value(Outcome::Done).unwrap(), json!(true));
    }

    #[test]
    fn test_outcome_round_trips_option() {
        for outcome in [Outcome::Failed, Outcome::NotFound, Outcome::Done] {
            assert_eq!(Outcome::from(outcome.as_option()), outcome);
        }
    }

    #[test]
    fn test_update_report_serialization() {
        let report = UpdateReport {
            primary: Some(UpdateCounts::new(2, 2)),
            cache: None,
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"primary": {"found": 2, "updated": 2}, "cache": null})
        );

        let degraded = UpdateCounts {
            degraded: true,
            ..UpdateCounts::new(1, 1)
        };
        assert_eq!(
            serde_json::to_value(degraded).unwrap(),
            json!({"found": 1, "updated": 1, "degraded": true})
        );
    }

    #[test]
    fn test_save_report_failed() {
        let report = SaveReport::failed();
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"primary": null, "cache": null, "records": null})
        );
    }
}
