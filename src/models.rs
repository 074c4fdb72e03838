use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Builds the composite `<user>-<YYYY-MM-DD>` key shared by local and remote
/// attendance rows.
pub fn record_id(user_id: &str, date: NaiveDate) -> String {
    format!("{}-{}", user_id, date.format("%Y-%m-%d"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's attendance for one calendar day, as kept in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    #[serde(alias = "user_id")]
    pub user_id: String,
    pub role: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(
        user_id: &str,
        role: &str,
        date: NaiveDate,
        status: AttendanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: record_id(user_id, date),
            user_id: user_id.to_string(),
            role: role.to_string(),
            date,
            status,
            timestamp,
        }
    }

    /// Body for `POST /data/attendance`, in the backend's column names.
    pub fn to_remote_row(&self) -> serde_json::Value {
        serde_json::json!({
            "user_id": self.user_id,
            "role": self.role,
            "date": self.date,
            "status": self.status,
        })
    }
}

/// Row shape of the backend `attendance` table. Ids and timestamps are
/// optional there, so rows are normalized before they reach the cache.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAttendanceRow {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteAttendanceRow {
    pub fn into_record(self, fetched_at: DateTime<Utc>) -> AttendanceRecord {
        AttendanceRecord {
            id: self
                .id
                .unwrap_or_else(|| record_id(&self.user_id, self.date)),
            role: self.role.unwrap_or_else(|| Role::Student.to_string()),
            timestamp: self.timestamp.or(self.created_at).unwrap_or(fetched_at),
            user_id: self.user_id,
            date: self.date,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspensionEntry {
    #[serde(alias = "user_id")]
    pub user_id: String,
    #[serde(alias = "suspended_at")]
    pub suspended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSuspensionRow {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default, alias = "suspendedAt")]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteSuspensionRow {
    pub fn into_entry(self, fetched_at: DateTime<Utc>) -> SuspensionEntry {
        SuspensionEntry {
            user_id: self.user_id,
            suspended_at: self.suspended_at.or(self.created_at).unwrap_or(fetched_at),
        }
    }
}

/// Value written to `profiles.status` when an account changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Manager,
    Admin,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => f.write_str("student"),
            Role::Instructor => f.write_str("instructor"),
            Role::Manager => f.write_str("manager"),
            Role::Admin => f.write_str("admin"),
            Role::Other(other) => f.write_str(other),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        match value {
            "student" => Role::Student,
            "instructor" => Role::Instructor,
            "manager" => Role::Manager,
            "admin" => Role::Admin,
            other => Role::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Announcement,
    Exam,
    Grade,
    Course,
    System,
}

impl NotificationKind {
    /// Unknown or missing kinds are shown as plain announcements.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("exam") => NotificationKind::Exam,
            Some("grade") => NotificationKind::Grade,
            Some("course") => NotificationKind::Course,
            Some("system") => NotificationKind::System,
            _ => NotificationKind::Announcement,
        }
    }
}

/// Read-only projection of a backend announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructor_id: String,
    #[serde(default)]
    pub instructor_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub total_lessons: Option<u32>,
    #[serde(default)]
    pub level: Option<CourseLevel>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub is_free: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub enrollment_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub course_id: String,
    pub user_id: String,
    pub enrolled_at: String,
    #[serde(default)]
    pub progress_percent: Option<f64>,
    #[serde(default)]
    pub course: Option<Course>,
}

/// The signed-in user as returned by the auth endpoints. Fields the client
/// does not use are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionUser {
    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata
            .as_ref()
            .and_then(|meta| meta.get("full_name"))
            .and_then(|name| name.as_str())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => Some(text),
        Some(Raw::Number(number)) => Some(number.to_string()),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_joins_user_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(record_id("u1", date), "u1-2024-05-01");
    }

    #[test]
    fn local_records_use_camel_case_keys() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let record = AttendanceRecord::new("u1", "student", date, AttendanceStatus::Absent, Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["date"], "2024-05-01");
        assert_eq!(value["status"], "absent");
    }

    #[test]
    fn remote_row_without_id_or_timestamp_is_normalized() {
        let row: RemoteAttendanceRow = serde_json::from_value(serde_json::json!({
            "id": 42,
            "user_id": "u9",
            "date": "2024-05-02",
            "status": "present",
            "created_at": "2024-05-02T08:30:00+00:00"
        }))
        .unwrap();
        let fetched_at = Utc::now();
        let record = row.into_record(fetched_at);
        assert_eq!(record.id, "42");
        assert_eq!(record.role, "student");
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-02T08:30:00+00:00");

        let bare: RemoteAttendanceRow = serde_json::from_value(serde_json::json!({
            "user_id": "u9",
            "role": "manager",
            "date": "2024-05-03",
            "status": "absent"
        }))
        .unwrap();
        let record = bare.into_record(fetched_at);
        assert_eq!(record.id, "u9-2024-05-03");
        assert_eq!(record.timestamp, fetched_at);
    }

    #[test]
    fn unknown_roles_are_preserved() {
        let role: Role = serde_json::from_str("\"mentor\"").unwrap();
        assert_eq!(role, Role::Other("mentor".to_string()));
        assert_eq!(Role::from("admin"), Role::Admin);
        assert_eq!(Role::Manager.to_string(), "manager");
    }

    #[test]
    fn notification_kind_falls_back_to_announcement() {
        assert_eq!(NotificationKind::parse_lenient(Some("grade")), NotificationKind::Grade);
        assert_eq!(NotificationKind::parse_lenient(Some("weird")), NotificationKind::Announcement);
        assert_eq!(NotificationKind::parse_lenient(None), NotificationKind::Announcement);
    }
}
