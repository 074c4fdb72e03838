use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{AttendanceRecord, AttendanceStatus, SuspensionEntry};
use crate::rules::{self, Standing};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAttendanceSummary {
    pub user_id: String,
    pub role: String,
    pub present: usize,
    pub absent: usize,
    /// Latest `present` write, if any.
    pub last_seen: Option<DateTime<Utc>>,
}

impl UserAttendanceSummary {
    pub fn standing(&self) -> Standing {
        rules::classify(self.absent)
    }
}

/// Per-user tallies, most absences first, ties broken by user id.
pub fn summarize_by_user(records: &[AttendanceRecord]) -> Vec<UserAttendanceSummary> {
    let mut map: HashMap<&str, UserAttendanceSummary> = HashMap::new();

    for record in records {
        let entry = map
            .entry(record.user_id.as_str())
            .or_insert_with(|| UserAttendanceSummary {
                user_id: record.user_id.clone(),
                role: record.role.clone(),
                present: 0,
                absent: 0,
                last_seen: None,
            });

        match record.status {
            AttendanceStatus::Present => {
                entry.present += 1;
                if entry.last_seen.map_or(true, |seen| record.timestamp > seen) {
                    entry.last_seen = Some(record.timestamp);
                }
            }
            AttendanceStatus::Absent => entry.absent += 1,
        }
    }

    let mut summaries: Vec<UserAttendanceSummary> = map.into_values().collect();
    summaries.sort_by(|a, b| b.absent.cmp(&a.absent).then_with(|| a.user_id.cmp(&b.user_id)));
    summaries
}

fn matches_search(user_id: &str, search: Option<&str>) -> bool {
    match search {
        Some(term) if !term.is_empty() => user_id.to_lowercase().contains(&term.to_lowercase()),
        _ => true,
    }
}

pub fn build_report(
    records: &[AttendanceRecord],
    suspended: &[SuspensionEntry],
    search: Option<&str>,
) -> String {
    let records: Vec<AttendanceRecord> = records
        .iter()
        .filter(|record| matches_search(&record.user_id, search))
        .cloned()
        .collect();
    let summaries = summarize_by_user(&records);

    let mut output = String::new();
    let scope = search.filter(|term| !term.is_empty()).unwrap_or("all users");

    let _ = writeln!(output, "# Attendance Register");
    let _ = writeln!(output, "Generated for {} at {}", scope, Utc::now().format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Users");

    if summaries.is_empty() {
        let _ = writeln!(output, "No attendance recorded.");
    } else {
        for summary in &summaries {
            let last_seen = summary
                .last_seen
                .map(|seen| seen.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                output,
                "- {} ({}): {} present, {} absent, last seen {} [{}]",
                summary.user_id,
                summary.role,
                summary.present,
                summary.absent,
                last_seen,
                summary.standing()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Suspended Accounts");

    let suspended: Vec<&SuspensionEntry> = suspended
        .iter()
        .filter(|entry| matches_search(&entry.user_id, search))
        .collect();
    if suspended.is_empty() {
        let _ = writeln!(output, "No suspended accounts.");
    } else {
        for entry in suspended {
            let _ = writeln!(
                output,
                "- {} since {}",
                entry.user_id,
                entry.suspended_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    let mut absences: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|record| record.status == AttendanceStatus::Absent)
        .collect();
    absences.sort_by(|a, b| b.date.cmp(&a.date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Absences");

    if absences.is_empty() {
        let _ = writeln!(output, "No absences recorded.");
    } else {
        for record in absences.iter().take(5) {
            let _ = writeln!(output, "- {} ({}) on {}", record.user_id, record.role, record.date);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn record(user_id: &str, day: u32, status: AttendanceStatus, hours_ago: i64) -> AttendanceRecord {
        AttendanceRecord::new(
            user_id,
            "student",
            NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
            status,
            Utc::now() - Duration::hours(hours_ago),
        )
    }

    #[test]
    fn summaries_tally_and_order_by_absences() {
        let records = vec![
            record("amy", 1, AttendanceStatus::Present, 48),
            record("amy", 2, AttendanceStatus::Present, 2),
            record("bob", 1, AttendanceStatus::Absent, 48),
            record("bob", 2, AttendanceStatus::Absent, 24),
            record("cat", 1, AttendanceStatus::Absent, 48),
        ];

        let summaries = summarize_by_user(&records);
        let order: Vec<&str> = summaries.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(order, vec!["bob", "cat", "amy"]);

        let amy = &summaries[2];
        assert_eq!(amy.present, 2);
        assert_eq!(amy.last_seen, Some(records[1].timestamp));
        assert_eq!(summaries[0].standing(), Standing::StrictWarning);
        assert_eq!(summaries[1].standing(), Standing::Warning);
        assert_eq!(summaries[0].last_seen, None);
    }

    #[test]
    fn report_lists_sections() {
        let records = vec![
            record("bob", 1, AttendanceStatus::Absent, 48),
            record("amy", 2, AttendanceStatus::Present, 2),
        ];
        let suspended = vec![SuspensionEntry {
            user_id: "bob".to_string(),
            suspended_at: Utc::now(),
        }];

        let report = build_report(&records, &suspended, None);
        assert!(report.contains("# Attendance Register"));
        assert!(report.contains("- bob (student): 0 present, 1 absent, last seen never [warning]"));
        assert!(report.contains("## Suspended Accounts\n- bob since"));
        assert!(report.contains("- bob (student) on 2024-04-01"));
    }

    #[test]
    fn search_is_case_insensitive() {
        let records = vec![
            record("Bob-1", 1, AttendanceStatus::Absent, 48),
            record("amy", 2, AttendanceStatus::Present, 2),
        ];
        let report = build_report(&records, &[], Some("bob"));
        assert!(report.contains("Bob-1"));
        assert!(!report.contains("amy"));
        assert!(report.contains("No suspended accounts."));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(&[], &[], None);
        assert!(report.contains("No attendance recorded."));
        assert!(report.contains("No absences recorded."));
    }
}
