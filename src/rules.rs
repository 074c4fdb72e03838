use std::fmt;

use crate::alerts::Alert;
use crate::attendance::AttendanceStore;
use crate::models::{AttendanceRecord, AttendanceStatus};

/// Cumulative absences that trigger automatic suspension.
pub const SUSPENSION_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Standing {
    Clear,
    Warning,
    StrictWarning,
    Suspended,
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Standing::Clear => "clear",
            Standing::Warning => "warning",
            Standing::StrictWarning => "strict warning",
            Standing::Suspended => "suspension threshold reached",
        };
        f.write_str(label)
    }
}

/// Absences are lifetime-cumulative: no window, no decay.
pub fn count_absences(records: &[AttendanceRecord], user_id: &str) -> usize {
    records
        .iter()
        .filter(|record| record.user_id == user_id && record.status == AttendanceStatus::Absent)
        .count()
}

pub fn classify(absences: usize) -> Standing {
    match absences {
        0 => Standing::Clear,
        1 => Standing::Warning,
        n if n >= SUSPENSION_THRESHOLD => Standing::Suspended,
        _ => Standing::StrictWarning,
    }
}

/// Recounts `user_id`'s absences and acts on the result: suspension at the
/// threshold, otherwise a warning alert. Returns the absence count.
///
/// Re-running over the same records always lands in the same branch, and
/// suspension itself is idempotent.
pub async fn check_absences_and_suspend(store: &AttendanceStore, user_id: &str) -> usize {
    let records = store.fetch_all_attendance().await;
    enforce(store, user_id, &records).await
}

/// Applies the suspension rules to an already loaded record set.
pub async fn enforce(store: &AttendanceStore, user_id: &str, records: &[AttendanceRecord]) -> usize {
    let missing_days = count_absences(records, user_id);

    match classify(missing_days) {
        Standing::Suspended => {
            store.suspend_user(user_id).await;
        }
        Standing::StrictWarning => store.alerts().emit(Alert::StrictWarning {
            user_id: user_id.to_string(),
            absences: missing_days,
        }),
        Standing::Warning => store.alerts().emit(Alert::FirstWarning {
            user_id: user_id.to_string(),
        }),
        Standing::Clear => {}
    }

    tracing::debug!(user_id, missing_days, "Absence check complete");
    missing_days
}

/// Side-effect-free standing for a single user, as the student dashboard
/// shows it.
pub async fn standing_for(store: &AttendanceStore, user_id: &str) -> (usize, Standing) {
    let records = store.fetch_all_attendance().await;
    let absences = count_absences(&records, user_id);
    (absences, classify(absences))
}
