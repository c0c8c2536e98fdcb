//! Knowledge-delta records flowing through the reflect → curate → apply
//! pipeline.

use serde::{Deserialize, Serialize};

/// Kind of edit a delta proposes against its target.
///
/// Delegated reflectors can name change types we do not support; those
/// deserialize to `Unsupported` and are skipped by the store instead of
/// failing the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Update,
    Retire,
    #[serde(other)]
    Unsupported,
}

/// A proposed knowledge edit, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookDelta {
    /// Logical section name; mapped to a file under `current/`.
    pub target: String,
    pub change_type: ChangeType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    pub priority: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Store-side outcome of one delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Applied,
    Skipped,
    Deferred,
}

/// Outcome of applying one delta to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDelta {
    pub delta: PlaybookDelta,
    pub status: ApplyStatus,
    /// Required whenever `status` is not `Applied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AppliedDelta {
    pub fn applied(delta: PlaybookDelta) -> Self {
        Self {
            delta,
            status: ApplyStatus::Applied,
            reason: None,
        }
    }

    pub fn skipped(delta: PlaybookDelta, reason: &str) -> Self {
        Self {
            delta,
            status: ApplyStatus::Skipped,
            reason: Some(reason.to_string()),
        }
    }
}

/// Where a delta ended up, store outcomes and curation rejections unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaDisposition {
    Applied,
    Skipped,
    Deferred,
    Rejected,
}

impl From<ApplyStatus> for DeltaDisposition {
    fn from(status: ApplyStatus) -> Self {
        match status {
            ApplyStatus::Applied => Self::Applied,
            ApplyStatus::Skipped => Self::Skipped,
            ApplyStatus::Deferred => Self::Deferred,
        }
    }
}

/// Flat delta-application record as it appears in a `LoopSnapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub target: String,
    pub change_type: ChangeType,
    pub status: DeltaDisposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub content: String,
    pub priority: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl DeltaRecord {
    pub fn rejected(delta: &PlaybookDelta, reason: &str) -> Self {
        Self {
            target: delta.target.clone(),
            change_type: delta.change_type,
            status: DeltaDisposition::Rejected,
            reason: Some(reason.to_string()),
            content: delta.content.clone(),
            priority: delta.priority,
            tags: delta.tags.clone(),
        }
    }
}

impl From<&AppliedDelta> for DeltaRecord {
    fn from(applied: &AppliedDelta) -> Self {
        Self {
            target: applied.delta.target.clone(),
            change_type: applied.delta.change_type,
            status: applied.status.into(),
            reason: applied.reason.clone(),
            content: applied.delta.content.clone(),
            priority: applied.delta.priority,
            tags: applied.delta.tags.clone(),
        }
    }
}

/// One rejected delta with the curator's reason code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedDelta {
    pub delta: PlaybookDelta,
    pub reason: String,
}

/// Outcome of curating one delta batch; transient, consumed by the loop.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurationResult {
    pub accepted: Vec<PlaybookDelta>,
    pub rejected: Vec<RejectedDelta>,
}
