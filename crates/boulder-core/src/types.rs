//! Core type definitions for Boulder orchestration

use serde::{Deserialize, Serialize};

/// Hook priority levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl std::fmt::Display for HookPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for HookPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "0" => Ok(Self::Critical),
            "high" | "1" => Ok(Self::High),
            "normal" | "2" => Ok(Self::Normal),
            "low" | "3" => Ok(Self::Low),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// One stage of the fixed workflow sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Intent,
    Assessment,
    Exploration,
    Implementation,
    Recovery,
    Verification,
    Completion,
}

impl Phase {
    /// The fixed phase order. Recovery is only entered by explicit routing
    /// from a failed implementation, never by natural succession.
    pub const SEQUENCE: [Phase; 7] = [
        Phase::Intent,
        Phase::Assessment,
        Phase::Exploration,
        Phase::Implementation,
        Phase::Recovery,
        Phase::Verification,
        Phase::Completion,
    ];

    /// Natural successor when a phase handler does not route explicitly
    pub fn next(&self) -> Option<Phase> {
        match self {
            Self::Intent => Some(Self::Assessment),
            Self::Assessment => Some(Self::Exploration),
            Self::Exploration => Some(Self::Implementation),
            Self::Implementation => Some(Self::Verification),
            Self::Recovery => Some(Self::Verification),
            Self::Verification => Some(Self::Completion),
            Self::Completion => None,
        }
    }

    /// Long phases use stability polling instead of a flat timeout
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            Self::Assessment | Self::Exploration | Self::Implementation | Self::Verification
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::Assessment => write!(f, "assessment"),
            Self::Exploration => write!(f, "exploration"),
            Self::Implementation => write!(f, "implementation"),
            Self::Recovery => write!(f, "recovery"),
            Self::Verification => write!(f, "verification"),
            Self::Completion => write!(f, "completion"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intent" => Ok(Self::Intent),
            "assessment" => Ok(Self::Assessment),
            "exploration" => Ok(Self::Exploration),
            "implementation" => Ok(Self::Implementation),
            "recovery" => Ok(Self::Recovery),
            "verification" => Ok(Self::Verification),
            "completion" => Ok(Self::Completion),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// Lifecycle status of a boulder (one persisted workflow run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoulderStatus {
    Active,
    Paused,
    Crashed,
    Completed,
    Failed,
    Cancelled,
}

impl BoulderStatus {
    /// Terminal statuses archive the record and free the working directory
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for BoulderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Crashed => write!(f, "crashed"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for BoulderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "crashed" => Ok(Self::Crashed),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Truncate captured output to a character budget
pub fn truncate_capture(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...[truncated]", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(HookPriority::Critical < HookPriority::High);
        assert!(HookPriority::High < HookPriority::Normal);
        assert!(HookPriority::Normal < HookPriority::Low);
    }

    #[test]
    fn test_priority_parsing() {
        let p: HookPriority = "critical".parse().unwrap();
        assert_eq!(p, HookPriority::Critical);
        assert!("urgent".parse::<HookPriority>().is_err());
    }

    #[test]
    fn test_phase_sequence() {
        assert_eq!(Phase::Intent.next(), Some(Phase::Assessment));
        assert_eq!(Phase::Implementation.next(), Some(Phase::Verification));
        assert_eq!(Phase::Recovery.next(), Some(Phase::Verification));
        assert_eq!(Phase::Completion.next(), None);

        // Recovery is never a natural successor
        for phase in Phase::SEQUENCE {
            assert_ne!(phase.next(), Some(Phase::Recovery));
        }
    }

    #[test]
    fn test_long_running_phases() {
        assert!(Phase::Implementation.is_long_running());
        assert!(Phase::Assessment.is_long_running());
        assert!(!Phase::Intent.is_long_running());
        assert!(!Phase::Completion.is_long_running());
    }

    #[test]
    fn test_status_terminal() {
        assert!(BoulderStatus::Completed.is_terminal());
        assert!(BoulderStatus::Failed.is_terminal());
        assert!(BoulderStatus::Cancelled.is_terminal());
        assert!(!BoulderStatus::Active.is_terminal());
        assert!(!BoulderStatus::Crashed.is_terminal());
    }

    #[test]
    fn test_phase_roundtrip() {
        for phase in Phase::SEQUENCE {
            let parsed: Phase = phase.to_string().parse().unwrap();
            assert_eq!(parsed, phase);
        }
    }

    #[test]
    fn test_truncate_capture() {
        assert_eq!(truncate_capture("short", 10), "short");
        let long = "a".repeat(20);
        let truncated = truncate_capture(&long, 10);
        assert!(truncated.starts_with("aaaaaaaaaa"));
        assert!(truncated.ends_with("[truncated]"));
    }
}
