use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RecordId, UserId};
use crate::utils::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationKind {
    Channel,
    Video,
}

impl ModerationKind {
    /// Table holding the moderated content
    pub fn target_table(&self) -> &'static str {
        match self {
            ModerationKind::Channel => crate::constants::tables::CHANNELS,
            ModerationKind::Video => crate::constants::tables::VIDEOS,
        }
    }

    /// Column the moderation item's `target_id` refers to
    pub fn target_column(&self) -> &'static str {
        match self {
            ModerationKind::Channel => "channel_id",
            ModerationKind::Video => "video_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve,
    Reject,
}

impl ModerationDecision {
    pub fn target_status(&self) -> ModerationStatus {
        match self {
            ModerationDecision::Approve => ModerationStatus::Approved,
            ModerationDecision::Reject => ModerationStatus::Rejected,
        }
    }

    /// Whether the decision soft-deletes (true) or restores (false) the target
    pub fn soft_deletes_target(&self) -> bool {
        matches!(self, ModerationDecision::Reject)
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            ModerationDecision::Approve => "approve",
            ModerationDecision::Reject => "reject",
        }
    }
}

impl ModerationStatus {
    /// Apply a decision. Re-applying the decision an item already carries is a
    /// no-op; flipping a decided item is refused.
    pub fn transition(self, decision: ModerationDecision) -> Result<ModerationStatus, AppError> {
        let target = decision.target_status();
        match self {
            ModerationStatus::Pending => Ok(target),
            current if current == target => Ok(current),
            current => Err(AppError::Validation(format!(
                "cannot {} an item that is already {:?}",
                decision.operation_name(),
                current
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationItem {
    pub id: RecordId,
    pub kind: ModerationKind,
    pub target_id: String,
    pub status: ModerationStatus,
    #[serde(default)]
    pub requested_by: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        assert_eq!(
            ModerationStatus::Pending
                .transition(ModerationDecision::Approve)
                .unwrap(),
            ModerationStatus::Approved
        );
        assert_eq!(
            ModerationStatus::Pending
                .transition(ModerationDecision::Reject)
                .unwrap(),
            ModerationStatus::Rejected
        );
    }

    #[test]
    fn test_repeated_decision_is_noop() {
        assert_eq!(
            ModerationStatus::Rejected
                .transition(ModerationDecision::Reject)
                .unwrap(),
            ModerationStatus::Rejected
        );
    }

    #[test]
    fn test_flipping_a_decision_is_refused() {
        let err = ModerationStatus::Approved
            .transition(ModerationDecision::Reject)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&ModerationStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
