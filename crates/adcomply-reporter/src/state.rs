//! Verdict lifecycle as seen by the reporter
//!
//! ```text
//! Pending → Evaluated → Passed ──────────────────────→ Archived
//!                     → Violated → Alerted? → Reported → Archived
//! ```

use adcomply_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictState {
    Pending,
    Evaluated,
    Passed,
    Violated,
    Alerted,
    Reported,
    Archived,
}

impl VerdictState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Evaluated => "evaluated",
            Self::Passed => "passed",
            Self::Violated => "violated",
            Self::Alerted => "alerted",
            Self::Reported => "reported",
            Self::Archived => "archived",
        }
    }

    pub fn can_transition_to(&self, next: VerdictState) -> bool {
        use VerdictState::*;
        matches!(
            (self, next),
            (Pending, Evaluated)
                | (Evaluated, Passed)
                | (Evaluated, Violated)
                | (Violated, Alerted)
                | (Violated, Reported)
                | (Alerted, Reported)
                | (Passed, Archived)
                | (Reported, Archived)
        )
    }

    /// Move to `next`, rejecting edges outside the lifecycle
    pub fn transition(self, next: VerdictState) -> Result<VerdictState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::internal(format!("invalid verdict transition {self} -> {next}")))
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Archived
    }
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::VerdictState::*;
    use super::*;

    #[test]
    fn test_happy_paths() {
        let passed = Pending.transition(Evaluated).and_then(|s| s.transition(Passed)).unwrap();
        assert_eq!(passed.transition(Archived).unwrap(), Archived);

        let reported = Pending
            .transition(Evaluated)
            .and_then(|s| s.transition(Violated))
            .and_then(|s| s.transition(Alerted))
            .and_then(|s| s.transition(Reported))
            .unwrap();
        assert!(reported.transition(Archived).unwrap().is_terminal());

        // Violations below the alert threshold skip Alerted
        assert!(Violated.can_transition_to(Reported));
    }

    #[test]
    fn test_no_way_back_to_pending() {
        for state in [Evaluated, Passed, Violated, Alerted, Reported, Archived] {
            assert!(state.transition(Pending).is_err());
        }
        assert!(Passed.transition(Reported).is_err());
        assert!(Archived.transition(Reported).is_err());
    }
}
