//! # Automation Sessions
//!
//! A session puts a zone under automatic control of one scene for a fixed
//! number of minutes. When the time runs out the session completes and the
//! zone goes back to manual.

use crate::{Result, SceneId, SerraError, SessionId, Timestamp, ZoneId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default session length in minutes.
pub const DEFAULT_DURATION_MINUTES: u32 = 15;

/// Longest allowed session: one day.
pub const MAX_DURATION_MINUTES: u32 = 1440;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    /// Ran for its full duration.
    Completed,
    /// Stopped by the user or replaced by a newer session.
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// A period of automatic control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSession {
    pub id: SessionId,
    pub zone: ZoneId,
    pub scene: SceneId,
    pub started_at: Timestamp,
    pub duration_minutes: u32,
    pub last_evaluation_at: Option<Timestamp>,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

impl AutomationSession {
    /// Whether the session is still in control of its zone.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// When the session runs out.
    #[must_use]
    pub fn ends_at(&self) -> Timestamp {
        self.started_at
            .plus_secs(u64::from(self.duration_minutes).saturating_mul(60))
    }

    /// Seconds left at `now`; 0 once finished or no longer running.
    #[must_use]
    pub fn time_remaining_secs(&self, now: Timestamp) -> u64 {
        if self.is_running() {
            self.ends_at().saturating_secs_since(now)
        } else {
            0
        }
    }

    /// A running session whose time is up.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.is_running() && now >= self.ends_at()
    }

    /// Presentation view at `now`.
    #[must_use]
    pub fn view(&self, now: Timestamp, scene_name: impl Into<String>) -> SessionView {
        SessionView {
            id: self.id,
            zone_id: self.zone,
            scene_id: self.scene,
            scene_name: scene_name.into(),
            is_active: self.is_running(),
            started_at: self.started_at,
            duration_minutes: self.duration_minutes,
            last_evaluation_at: self.last_evaluation_at,
            status: self.status,
            time_remaining_seconds: self.time_remaining_secs(now),
            notes: self.notes.clone(),
        }
    }
}

/// Validate a requested session length.
pub fn validate_duration(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes > MAX_DURATION_MINUTES {
        return Err(SerraError::Validation(format!(
            "duration must be between 1 and {MAX_DURATION_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(())
}

/// Session as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub zone_id: ZoneId,
    pub scene_id: SceneId,
    pub scene_name: String,
    pub is_active: bool,
    pub started_at: Timestamp,
    pub duration_minutes: u32,
    pub last_evaluation_at: Option<Timestamp>,
    pub status: SessionStatus,
    pub time_remaining_seconds: u64,
    pub notes: Option<String>,
}

// =============================================================================
// TESTS
// =============================================================================
