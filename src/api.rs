//! REST client for the LMS backend.
//!
//! Each concern the client depends on is a trait ([`AttendanceBackend`],
//! [`AnnouncementSource`], [`AuthBackend`], [`CourseBackend`]) so the
//! stores can run against scripted doubles in tests. [`HttpBackend`]
//! implements all of them with [`reqwest`], reading the bearer token from
//! the local [`KeyValueStore`] on every call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{
    AccountStatus, AttendanceRecord, Course, Enrollment, RemoteAttendanceRow, RemoteSuspensionRow,
    Role, SessionUser, SuspensionEntry,
};
use crate::storage::{KeyValueStore, ACCESS_TOKEN_KEY};

/// Number of announcements the feed asks for.
pub const ANNOUNCEMENT_LIMIT: usize = 20;

#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    /// `GET /data/attendance`
    async fn fetch_attendance(&self) -> Result<Vec<AttendanceRecord>, ApiError>;

    /// `POST /data/attendance`
    async fn record_attendance(&self, record: &AttendanceRecord) -> Result<(), ApiError>;

    /// `GET /data/suspended_users`
    async fn fetch_suspended_users(&self) -> Result<Vec<SuspensionEntry>, ApiError>;

    /// `POST /attendance/log`; the backend resolves the user from the token.
    async fn log_attendance(&self, role: &str) -> Result<(), ApiError>;

    /// `GET /attendance/check-suspension/{user_id}`
    async fn check_suspension(&self, user_id: &str) -> Result<bool, ApiError>;

    /// `PUT /data/profiles/{user_id}` with the new account status.
    async fn update_profile_status(
        &self,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<(), ApiError>;
}

#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// Newest-first announcement rows, untyped; the feed maps them leniently.
    async fn fetch_announcements(&self, limit: usize) -> Result<serde_json::Value, ApiError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
}

/// Body returned by `/auth/login` and `/auth/signup`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub session: Option<SessionTokens>,
    #[serde(default)]
    pub user: Option<SessionUser>,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn signup(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthResponse, ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;

    async fn profile(&self) -> Result<SessionUser, ApiError>;

    async fn role(&self) -> Result<Role, ApiError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEnrollment {
    pub course_id: String,
    pub user_id: String,
    pub enrolled_at: String,
    pub progress_percent: f64,
}

#[async_trait]
pub trait CourseBackend: Send + Sync {
    async fn fetch_courses(&self) -> Result<Vec<Course>, ApiError>;

    async fn fetch_enrollments(&self) -> Result<Vec<Enrollment>, ApiError>;

    async fn create_enrollment(&self, enrollment: &NewEnrollment) -> Result<(), ApiError>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    store: Arc<dyn KeyValueStore>,
}

impl HttpBackend {
    /// * `api_url` - Base URL, e.g. `http://localhost:5000/api`.
    pub fn new(
        api_url: &str,
        timeout: Duration,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(client, api_url, store)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: &str,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(api_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{api_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(api_url.to_string()));
        }
        Ok(Self {
            client,
            base,
            store,
        })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn token(&self) -> Result<String, ApiError> {
        match self.store.get(ACCESS_TOKEN_KEY).await {
            Ok(Some(token)) if !token.is_empty() => Ok(token),
            Ok(_) => Err(ApiError::Unauthenticated),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read access token");
                Err(ApiError::Unauthenticated)
            }
        }
    }

    async fn authorized(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let token = self.token().await?;
        Ok(self
            .client
            .request(method, self.endpoint(segments)?)
            .bearer_auth(token))
    }

    // ---- private helpers ----

    /// Returns the response unchanged on a 2xx status. Otherwise returns
    /// [`ApiError::Status`] carrying the backend's `error` message when the
    /// body has one, or the raw body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        Err(ApiError::Status {
            status: status.as_u16(),
            body: error_message(raw),
        })
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// The backend's `{"error": "..."}` message, or the raw body when it has none.
fn error_message(raw: String) -> String {
    serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(raw)
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn fetch_attendance(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        let response = self
            .authorized(Method::GET, &["data", "attendance"])
            .await?
            .send()
            .await?;
        let rows: Vec<RemoteAttendanceRow> = Self::parse_response(response).await?;
        let fetched_at = Utc::now();
        Ok(rows.into_iter().map(|row| row.into_record(fetched_at)).collect())
    }

    async fn record_attendance(&self, record: &AttendanceRecord) -> Result<(), ApiError> {
        let response = self
            .authorized(Method::POST, &["data", "attendance"])
            .await?
            .json(&record.to_remote_row())
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn fetch_suspended_users(&self) -> Result<Vec<SuspensionEntry>, ApiError> {
        let response = self
            .authorized(Method::GET, &["data", "suspended_users"])
            .await?
            .send()
            .await?;
        let rows: Vec<RemoteSuspensionRow> = Self::parse_response(response).await?;
        let fetched_at = Utc::now();
        Ok(rows.into_iter().map(|row| row.into_entry(fetched_at)).collect())
    }

    async fn log_attendance(&self, role: &str) -> Result<(), ApiError> {
        let response = self
            .authorized(Method::POST, &["attendance", "log"])
            .await?
            .json(&serde_json::json!({ "role": role }))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn check_suspension(&self, user_id: &str) -> Result<bool, ApiError> {
        #[derive(Deserialize)]
        struct SuspensionCheck {
            #[serde(default)]
            suspended: bool,
        }

        // The check endpoint is public on the backend; no token needed.
        let response = self
            .client
            .get(self.endpoint(&["attendance", "check-suspension", user_id])?)
            .send()
            .await?;
        let check: SuspensionCheck = Self::parse_response(response).await?;
        Ok(check.suspended)
    }

    async fn update_profile_status(
        &self,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<(), ApiError> {
        let response = self
            .authorized(Method::PUT, &["data", "profiles", user_id])
            .await?
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        Self::check_status(response).await
    }
}

#[async_trait]
impl AnnouncementSource for HttpBackend {
    async fn fetch_announcements(&self, limit: usize) -> Result<serde_json::Value, ApiError> {
        let limit = limit.to_string();
        let response = self
            .authorized(Method::GET, &["data", "announcements"])
            .await?
            .query(&[
                ("sort", "created_at"),
                ("order", "desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let response = self
            .client
            .post(self.endpoint(&["auth", "login"])?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn signup(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthResponse, ApiError> {
        let response = self
            .client
            .post(self.endpoint(&["auth", "signup"])?)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "fullName": full_name,
            }))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let response = self
            .authorized(Method::POST, &["auth", "logout"])
            .await?
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn profile(&self) -> Result<SessionUser, ApiError> {
        #[derive(Deserialize)]
        struct ProfileResponse {
            user: SessionUser,
        }

        let response = self
            .authorized(Method::GET, &["user", "profile"])
            .await?
            .send()
            .await?;
        let profile: ProfileResponse = Self::parse_response(response).await?;
        Ok(profile.user)
    }

    async fn role(&self) -> Result<Role, ApiError> {
        #[derive(Deserialize)]
        struct RoleResponse {
            role: Role,
        }

        let response = self
            .authorized(Method::GET, &["user", "role"])
            .await?
            .send()
            .await?;
        let role: RoleResponse = Self::parse_response(response).await?;
        Ok(role.role)
    }
}

#[async_trait]
impl CourseBackend for HttpBackend {
    async fn fetch_courses(&self) -> Result<Vec<Course>, ApiError> {
        let response = self
            .authorized(Method::GET, &["data", "courses"])
            .await?
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn fetch_enrollments(&self) -> Result<Vec<Enrollment>, ApiError> {
        let response = self
            .authorized(Method::GET, &["data", "course_enrollments"])
            .await?
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn create_enrollment(&self, enrollment: &NewEnrollment) -> Result<(), ApiError> {
        let response = self
            .authorized(Method::POST, &["data", "course_enrollments"])
            .await?
            .json(enrollment)
            .send()
            .await?;
        Self::check_status(response).await
    }
}
