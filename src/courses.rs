//! Course browsing and enrollment.

use std::sync::Arc;

use chrono::Utc;

use crate::api::{CourseBackend, NewEnrollment};
use crate::error::ApiError;
use crate::models::{Course, Enrollment, SessionUser};
use crate::storage::{load_json, KeyValueStore, ACCESS_TOKEN_KEY, USER_KEY};

/// Courses with no status, or an approved/published one, are browsable.
pub fn is_visible(course: &Course) -> bool {
    matches!(
        course.status.as_deref(),
        None | Some("approved") | Some("published")
    )
}

pub fn is_enrolled(enrollments: &[Enrollment], course_id: &str) -> bool {
    enrollments
        .iter()
        .any(|enrollment| enrollment.course_id == course_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled,
    Failed(String),
}

impl EnrollOutcome {
    pub fn message(&self) -> &str {
        match self {
            EnrollOutcome::Enrolled => "Successfully enrolled!",
            EnrollOutcome::Failed(message) => message,
        }
    }
}

pub struct CourseCatalog {
    backend: Arc<dyn CourseBackend>,
    store: Arc<dyn KeyValueStore>,
}

impl CourseCatalog {
    pub fn new(backend: Arc<dyn CourseBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { backend, store }
    }

    pub async fn fetch_courses(&self) -> Result<Vec<Course>, ApiError> {
        let courses = self.backend.fetch_courses().await?;
        Ok(courses.into_iter().filter(is_visible).collect())
    }

    pub async fn fetch_enrollments(&self) -> Result<Vec<Enrollment>, ApiError> {
        self.backend.fetch_enrollments().await
    }

    /// Enrolls the stored user in `course_id`. Failures come back as an
    /// outcome message rather than an error.
    pub async fn enroll(&self, course_id: &str) -> EnrollOutcome {
        let has_token = matches!(
            self.store.get(ACCESS_TOKEN_KEY).await,
            Ok(Some(token)) if !token.is_empty()
        );
        if !has_token {
            return EnrollOutcome::Failed("Not logged in".to_string());
        }

        let Some(user) = load_json::<Option<SessionUser>>(self.store.as_ref(), USER_KEY).await
        else {
            return EnrollOutcome::Failed("User not found".to_string());
        };

        let enrollment = NewEnrollment {
            course_id: course_id.to_string(),
            user_id: user.id,
            enrolled_at: Utc::now().to_rfc3339(),
            progress_percent: 0.0,
        };

        match self.backend.create_enrollment(&enrollment).await {
            Ok(()) => {
                tracing::info!(course_id, user_id = %enrollment.user_id, "Enrolled in course");
                EnrollOutcome::Enrolled
            }
            Err(ApiError::Status { body, .. }) => EnrollOutcome::Failed(body),
            Err(e) => {
                tracing::warn!(course_id, error = %e, "Enrollment failed");
                EnrollOutcome::Failed("Enrollment failed".to_string())
            }
        }
    }
}
