//! Job lifecycle states and pipeline phases.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Storyboard,
    Chunks,
    Refine,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 4] = [Phase::Plan, Phase::Storyboard, Phase::Chunks, Phase::Refine];

    /// 1-based phase number.
    pub fn number(&self) -> u8 {
        match self {
            Phase::Plan => 1,
            Phase::Storyboard => 2,
            Phase::Chunks => 3,
            Phase::Refine => 4,
        }
    }

    /// Phase from its 1-based number.
    pub fn from_number(n: u8) -> Option<Phase> {
        match n {
            1 => Some(Phase::Plan),
            2 => Some(Phase::Storyboard),
            3 => Some(Phase::Chunks),
            4 => Some(Phase::Refine),
            _ => None,
        }
    }

    /// The phase dispatched after this one, if any.
    pub fn next(&self) -> Option<Phase> {
        Phase::from_number(self.number() + 1)
    }

    /// Human-facing label used in status envelopes and error records.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Plan => "phase1_plan",
            Phase::Storyboard => "phase2_storyboard",
            Phase::Chunks => "phase3_chunks",
            Phase::Refine => "phase4_refine",
        }
    }

    /// Percent-progress anchor reached when this phase completes.
    pub fn completion_percent(&self) -> u8 {
        match self {
            Phase::Plan => 10,
            Phase::Storyboard => 35,
            Phase::Chunks => 80,
            Phase::Refine => 100,
        }
    }

    /// Percent-progress anchor at which this phase starts.
    pub fn start_percent(&self) -> u8 {
        match self {
            Phase::Plan => 0,
            other => {
                Phase::from_number(other.number() - 1)
                    .map(|p| p.completion_percent())
                    .unwrap_or(0)
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Job lifecycle state.
///
/// A job is `PausedAt(k)` iff a `pending` checkpoint exists for the job's
/// current branch at phase k; `Complete` iff an approved phase-4 checkpoint
/// exists and the final video URL is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum JobStatus {
    Queued,
    Running(Phase),
    PausedAt(Phase),
    Complete,
    Failed,
    Canceled,
}

impl JobStatus {
    /// True for `Complete`, `Failed` and `Canceled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Canceled)
    }

    /// The phase embedded in a running/paused state.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            JobStatus::Running(p) | JobStatus::PausedAt(p) => Some(*p),
            _ => None,
        }
    }

    /// Validate a state transition, rejecting movement out of terminal
    /// states. `Canceled` is reachable from anywhere and idempotent.
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        if matches!(next, JobStatus::Canceled) {
            return !matches!(self, JobStatus::Complete | JobStatus::Failed);
        }
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
            JobStatus::Running(p) => write!(f, "running_phase_{}", p.number()),
            JobStatus::PausedAt(p) => write!(f, "paused_at_phase_{}", p.number()),
            JobStatus::Complete => f.write_str("complete"),
            JobStatus::Failed => f.write_str("failed"),
            JobStatus::Canceled => f.write_str("canceled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidValue {
            kind: "job status",
            value: s.to_string(),
        };
        match s {
            "queued" => Ok(JobStatus::Queued),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            other => {
                if let Some(n) = other.strip_prefix("running_phase_") {
                    let n: u8 = n.parse().map_err(|_| invalid())?;
                    return Phase::from_number(n).map(JobStatus::Running).ok_or_else(invalid);
                }
                if let Some(n) = other.strip_prefix("paused_at_phase_") {
                    let n: u8 = n.parse().map_err(|_| invalid())?;
                    return Phase::from_number(n).map(JobStatus::PausedAt).ok_or_else(invalid);
                }
                Err(invalid())
            }
        }
    }
}

impl From<JobStatus> for String {
    fn from(s: JobStatus) -> Self {
        s.to_string()
    }
}

impl TryFrom<String> for JobStatus {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_numbering() {
        assert_eq!(Phase::Plan.number(), 1);
        assert_eq!(Phase::Refine.number(), 4);
        assert_eq!(Phase::from_number(3), Some(Phase::Chunks));
        assert_eq!(Phase::from_number(5), None);
        assert_eq!(Phase::Chunks.next(), Some(Phase::Refine));
        assert_eq!(Phase::Refine.next(), None);
    }

    #[test]
    fn test_percent_anchors_are_monotone() {
        let mut prev = 0;
        for phase in Phase::ALL {
            assert_eq!(phase.start_percent(), prev);
            assert!(phase.completion_percent() > prev);
            prev = phase.completion_percent();
        }
        assert_eq!(prev, 100);
    }

    #[test]
    fn test_status_string_roundtrip() {
        let all = [
            JobStatus::Queued,
            JobStatus::Running(Phase::Plan),
            JobStatus::Running(Phase::Refine),
            JobStatus::PausedAt(Phase::Storyboard),
            JobStatus::Complete,
            JobStatus::Failed,
            JobStatus::Canceled,
        ];
        for status in all {
            let s = status.to_string();
            assert_eq!(s.parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!("running_phase_9".parse::<JobStatus>().is_err());
        assert!("exploded".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_transitions() {
        assert!(!JobStatus::Complete.can_transition_to(&JobStatus::Running(Phase::Plan)));
        assert!(!JobStatus::Failed.can_transition_to(&JobStatus::Canceled));
        assert!(JobStatus::Running(Phase::Chunks).can_transition_to(&JobStatus::Canceled));
        assert!(JobStatus::Canceled.can_transition_to(&JobStatus::Canceled));
    }

    #[test]
    fn test_status_serde_uses_wire_strings() {
        let json = serde_json::to_string(&JobStatus::PausedAt(Phase::Chunks)).unwrap();
        assert_eq!(json, "\"paused_at_phase_3\"");
    }
}
