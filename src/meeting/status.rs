//! Meeting phase type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a meeting. Ordered: phases only move forward, and any phase may
/// jump straight to `Conclusion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingPhase {
    Setup,
    Introductions,
    Discussion,
    Conclusion,
}

impl MeetingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Introductions => "introductions",
            Self::Discussion => "discussion",
            Self::Conclusion => "conclusion",
        }
    }

    /// The phase that normally follows this one.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Setup => Some(Self::Introductions),
            Self::Introductions => Some(Self::Discussion),
            Self::Discussion => Some(Self::Conclusion),
            Self::Conclusion => None,
        }
    }

    pub fn can_transition_to(&self, target: Self) -> bool {
        (target == Self::Conclusion && *self != Self::Conclusion) || self.next() == Some(target)
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Conclusion
    }
}

impl fmt::Display for MeetingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
