//! Outcome holder stored inside a run snapshot.
//!
//! This is deliberately a plain sum type rather than a live future/promise:
//! the "not yet available" case is its own variant, distinct from both
//! success and failure, so a snapshot read by another process is always
//! unambiguous.

use serde::{Deserialize, Serialize};

/// Result holder for one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// The run has not terminated yet.
    Pending,

    /// Terminated successfully; carries the value the callable produced.
    Success(serde_json::Value),

    /// Terminated in failure; carries the error message.
    Failure(String),
}

impl RunOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, RunOutcome::Pending)
    }

    /// The success value, if the run succeeded.
    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            RunOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The error message, if the run failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            RunOutcome::Failure(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        let pending = RunOutcome::Pending;
        assert!(pending.is_pending());
        assert!(pending.result().is_none());
        assert!(pending.error().is_none());

        let ok = RunOutcome::Success(serde_json::json!(42));
        assert_eq!(ok.result(), Some(&serde_json::json!(42)));
        assert!(ok.error().is_none());

        let err = RunOutcome::Failure("boom".to_string());
        assert_eq!(err.error(), Some("boom"));
        assert!(err.result().is_none());
    }

    #[test]
    fn outcome_is_tagged_enum() {
        let o = RunOutcome::Success(serde_json::json!({"n": 1}));
        let v: serde_json::Value = serde_json::to_value(&o).unwrap();
        // Example shape: {"kind":"SUCCESS","value":{"n":1}}
        assert_eq!(v["kind"], "SUCCESS");
        assert_eq!(v["value"]["n"], 1);
    }

    #[test]
    fn outcome_roundtrip_json() {
        for o in [
            RunOutcome::Pending,
            RunOutcome::Success(serde_json::json!(["a", "b"])),
            RunOutcome::Failure("nope".to_string()),
        ] {
            let s = serde_json::to_string(&o).unwrap();
            let back: RunOutcome = serde_json::from_str(&s).unwrap();
            assert_eq!(o, back);
        }
    }
}
