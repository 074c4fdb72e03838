use std::io::Read;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::attendance::AttendanceStore;
use crate::error::ImportError;
use crate::models::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceRow {
    pub user_id: String,
    pub role: String,
    pub date: NaiveDate,
}

/// Parses `user_id,role,date` rows. `role` may be blank (defaults to
/// student). Every row is validated before any is applied.
pub fn parse_absences<R: Read>(reader: R) -> Result<Vec<AbsenceRow>, ImportError> {
    #[derive(Deserialize)]
    struct CsvRow {
        user_id: String,
        #[serde(default)]
        role: Option<String>,
        date: String,
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        // Header is line 1.
        let line = rows.len() as u64 + 2;

        if row.user_id.is_empty() {
            return Err(ImportError::InvalidRow {
                line,
                message: "missing user_id".to_string(),
            });
        }

        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| {
            ImportError::InvalidRow {
                line,
                message: format!("invalid date `{}`: {e}", row.date),
            }
        })?;

        rows.push(AbsenceRow {
            user_id: row.user_id,
            role: row
                .role
                .filter(|role| !role.is_empty())
                .unwrap_or_else(|| Role::Student.to_string()),
            date,
        });
    }

    Ok(rows)
}

/// Applies each row through [`AttendanceStore::mark_absent`], so warnings
/// and suspensions fire exactly as for manual entries. Returns the number of
/// rows applied.
pub async fn import_absences<R: Read>(
    store: &AttendanceStore,
    reader: R,
) -> Result<usize, ImportError> {
    let rows = parse_absences(reader)?;

    for row in &rows {
        store.mark_absent(&row.user_id, &row.role, row.date).await;
    }

    tracing::info!(rows = rows.len(), "Imported absences");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::offline_harness;

    #[test]
    fn blank_role_defaults_to_student() {
        let csv = "user_id,role,date\nu1,,2024-05-01\nu2,instructor,2024-05-02\n";
        let rows = parse_absences(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].role, "student");
        assert_eq!(rows[1].role, "instructor");
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn bad_date_names_the_line() {
        let csv = "user_id,role,date\nu1,student,2024-05-01\nu2,student,05/02/2024\n";
        let err = parse_absences(csv.as_bytes()).unwrap_err();
        match err {
            ImportError::InvalidRow { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("05/02/2024"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn import_applies_rows_through_mark_absent() {
        let h = offline_harness();
        let csv = "user_id,role,date\n\
                   u1,student,2024-05-01\n\
                   u1,student,2024-05-02\n\
                   u1,student,2024-05-03\n\
                   u1,student,2024-05-04\n\
                   u1,student,2024-05-05\n\
                   u2,student,2024-05-01\n";

        let applied = import_absences(&h.store, csv.as_bytes()).await.unwrap();

        assert_eq!(applied, 6);
        assert_eq!(h.store.cached_attendance().await.len(), 6);
        let suspended = h.store.cached_suspended_users().await;
        assert_eq!(suspended.len(), 1);
        assert_eq!(suspended[0].user_id, "u1");
    }

    #[tokio::test]
    async fn invalid_file_applies_nothing() {
        let h = offline_harness();
        let csv = "user_id,role,date\nu1,student,2024-05-01\n,student,2024-05-02\n";
        assert!(import_absences(&h.store, csv.as_bytes()).await.is_err());
        assert!(h.store.cached_attendance().await.is_empty());
    }
}
