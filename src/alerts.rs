//! User-facing side effects raised by the attendance rules.
//!
//! The browser showed these as `alert()` popups and console lines; here they
//! go through an [`AlertSink`] so a CLI, a service or a test can decide what
//! "showing" means.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// First recorded absence.
    FirstWarning { user_id: String },
    /// More than one absence, still under the suspension threshold.
    StrictWarning { user_id: String, absences: usize },
    /// The account was suspended; managers and instructors are told.
    Suspended { user_id: String },
}

impl Alert {
    pub fn user_id(&self) -> &str {
        match self {
            Alert::FirstWarning { user_id }
            | Alert::StrictWarning { user_id, .. }
            | Alert::Suspended { user_id } => user_id,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::FirstWarning { user_id } => {
                write!(f, "Warning for {user_id}: missed a class/test today")
            }
            Alert::StrictWarning { user_id, absences } => write!(
                f,
                "Strict warning for {user_id}: {absences} days absent, continued absence may lead to suspension"
            ),
            Alert::Suspended { user_id } => write!(
                f,
                "Student {user_id} suspended due to excessive absences; managers and instructors notified"
            ),
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: Alert);
}

/// Default sink: alerts become log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn emit(&self, alert: Alert) {
        match &alert {
            Alert::Suspended { user_id } => {
                tracing::warn!(user_id = %user_id, alert = %alert, "Account suspended");
            }
            Alert::StrictWarning { user_id, absences } => {
                tracing::warn!(user_id = %user_id, absences, alert = %alert, "Attendance warning");
            }
            Alert::FirstWarning { user_id } => {
                tracing::info!(user_id = %user_id, alert = %alert, "Attendance warning");
            }
        }
    }
}
