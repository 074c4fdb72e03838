//! Bearer-token session kept in the local store.
//!
//! Signing in is also how daily attendance is recorded: a successful login
//! logs a `present` record for the user.

use std::sync::Arc;

use crate::api::{AuthBackend, AuthResponse};
use crate::attendance::AttendanceStore;
use crate::error::{ApiError, SessionError};
use crate::models::{Role, SessionUser};
use crate::storage::{load_json, save_json, KeyValueStore, ACCESS_TOKEN_KEY, USER_KEY, USER_ROLE_KEY};

#[derive(Debug, Clone, PartialEq)]
pub struct SignedIn {
    pub user: SessionUser,
    pub role: Role,
    /// Whether the account is currently suspended.
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCheck {
    /// No token stored.
    NoSession,
    /// Backend confirmed the token; stored user and role were refreshed.
    Refreshed { user: SessionUser, role: Role },
    /// Backend could not confirm either way; local state kept.
    KeptLocal,
}

pub struct Session {
    auth: Arc<dyn AuthBackend>,
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn new(auth: Arc<dyn AuthBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { auth, store }
    }

    pub async fn current_user(&self) -> Option<SessionUser> {
        load_json(self.store.as_ref(), USER_KEY).await
    }

    pub async fn current_role(&self) -> Option<Role> {
        match self.store.get(USER_ROLE_KEY).await {
            Ok(Some(role)) if !role.is_empty() => Some(Role::from(role.as_str())),
            _ => None,
        }
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        attendance: &AttendanceStore,
    ) -> Result<SignedIn, SessionError> {
        let response = self
            .auth
            .login(email, password)
            .await
            .map_err(|e| rejection(e, "Login failed"))?;

        let AuthResponse {
            session: Some(tokens),
            user: Some(user),
        } = response
        else {
            return Err(SessionError::Rejected("Login failed".to_string()));
        };

        self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        save_json(self.store.as_ref(), USER_KEY, &user).await?;

        let role = match self.auth.role().await {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(error = %e, "Role lookup failed, defaulting to student");
                Role::Student
            }
        };
        self.store.set(USER_ROLE_KEY, &role.to_string()).await?;

        tracing::info!(user_id = %user.id, role = %role, "Signed in");

        attendance
            .log_daily_attendance(&user.id, &role.to_string())
            .await;
        let suspended = attendance.is_user_suspended(&user.id).await;
        if suspended {
            tracing::warn!(user_id = %user.id, "Signed-in account is suspended");
        }

        Ok(SignedIn {
            user,
            role,
            suspended,
        })
    }

    /// Creates an account. Returns the new user when the backend started a
    /// session straight away (no email confirmation step).
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<Option<SessionUser>, SessionError> {
        let response = self
            .auth
            .signup(email, password, full_name)
            .await
            .map_err(|e| rejection(e, "Signup failed"))?;

        let (Some(tokens), Some(user)) = (response.session, response.user) else {
            tracing::info!(email, "Signed up, no session issued");
            return Ok(None);
        };

        self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        save_json(self.store.as_ref(), USER_KEY, &user).await?;
        self.store
            .set(USER_ROLE_KEY, &Role::Student.to_string())
            .await?;

        tracing::info!(user_id = %user.id, "Signed up");
        Ok(Some(user))
    }

    /// Tells the backend (best effort) and always clears local session
    /// state.
    pub async fn sign_out(&self) {
        let has_token = matches!(
            self.store.get(ACCESS_TOKEN_KEY).await,
            Ok(Some(token)) if !token.is_empty()
        );
        if has_token {
            if let Err(e) = self.auth.logout().await {
                tracing::warn!(error = %e, "Logout request failed");
            }
        }

        for key in [ACCESS_TOKEN_KEY, USER_KEY, USER_ROLE_KEY] {
            if let Err(e) = self.store.remove(key).await {
                tracing::error!(key, error = %e, "Failed to clear session key");
            }
        }
        tracing::info!("Signed out");
    }

    /// Validates the stored token. A 401 signs out and reports
    /// [`SessionError::Expired`]; any other failure keeps local state.
    pub async fn check_session(&self) -> Result<SessionCheck, SessionError> {
        match self.store.get(ACCESS_TOKEN_KEY).await? {
            Some(token) if !token.is_empty() => {}
            _ => return Ok(SessionCheck::NoSession),
        }

        let user = match self.auth.profile().await {
            Ok(user) => user,
            Err(e) if e.is_unauthorized() => {
                tracing::warn!("Session expired");
                self.sign_out().await;
                return Err(SessionError::Expired);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile check failed, relying on local state");
                return Ok(SessionCheck::KeptLocal);
            }
        };
        save_json(self.store.as_ref(), USER_KEY, &user).await?;

        let role = match self.auth.role().await {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(error = %e, "Role lookup failed");
                self.current_role().await.unwrap_or(Role::Student)
            }
        };
        self.store.set(USER_ROLE_KEY, &role.to_string()).await?;

        Ok(SessionCheck::Refreshed { user, role })
    }
}

fn rejection(error: ApiError, fallback: &str) -> SessionError {
    match error {
        ApiError::Status { body, .. } if !body.trim().is_empty() => SessionError::Rejected(body),
        ApiError::Status { .. } => SessionError::Rejected(fallback.to_string()),
        other => SessionError::Api(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::api::SessionTokens;
    use crate::testing::{harness, unavailable};

    #[derive(Default)]
    struct ScriptedAuth {
        login_error: Option<(u16, String)>,
        role: Option<Role>,
        profile: Mutex<Option<Result<SessionUser, u16>>>,
        logout_calls: AtomicUsize,
        offline_logout: bool,
    }

    fn user(id: &str) -> SessionUser {
        serde_json::from_value(json!({
            "id": id,
            "email": format!("{id}@example.com"),
            "user_metadata": { "full_name": "Avery Lee" }
        }))
        .unwrap()
    }

    #[async_trait]
    impl AuthBackend for ScriptedAuth {
        async fn login(&self, _email: &str, _password: &str) -> Result<AuthResponse, ApiError> {
            if let Some((status, body)) = &self.login_error {
                return Err(ApiError::Status {
                    status: *status,
                    body: body.clone(),
                });
            }
            Ok(AuthResponse {
                session: Some(SessionTokens {
                    access_token: "tok-1".to_string(),
                }),
                user: Some(user("u1")),
            })
        }

        async fn signup(
            &self,
            _email: &str,
            _password: &str,
            _full_name: &str,
        ) -> Result<AuthResponse, ApiError> {
            Ok(AuthResponse {
                session: None,
                user: Some(user("u2")),
            })
        }

        async fn logout(&self) -> Result<(), ApiError> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            if self.offline_logout {
                return Err(unavailable());
            }
            Ok(())
        }

        async fn profile(&self) -> Result<SessionUser, ApiError> {
            match self.profile.lock().unwrap().clone() {
                Some(Ok(user)) => Ok(user),
                Some(Err(status)) => Err(ApiError::Status {
                    status,
                    body: "profile failed".to_string(),
                }),
                None => Err(unavailable()),
            }
        }

        async fn role(&self) -> Result<Role, ApiError> {
            self.role.clone().ok_or_else(unavailable)
        }
    }

    #[tokio::test]
    async fn sign_in_stores_session_and_logs_attendance() {
        let h = harness();
        let auth = Arc::new(ScriptedAuth {
            role: Some(Role::Manager),
            ..Default::default()
        });
        let session = Session::new(auth, h.cache.clone());

        let signed_in = session.sign_in("u1@example.com", "pw", &h.store).await.unwrap();
        assert_eq!(signed_in.role, Role::Manager);
        assert!(!signed_in.suspended);
        assert_eq!(signed_in.user.full_name(), Some("Avery Lee"));

        assert_eq!(h.cache.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("tok-1"));
        assert_eq!(session.current_role().await, Some(Role::Manager));
        assert_eq!(session.current_user().await.map(|u| u.id), Some("u1".to_string()));

        let records = h.store.cached_attendance().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, "u1");
        assert_eq!(records[0].role, "manager");
    }

    #[tokio::test]
    async fn missing_role_defaults_to_student() {
        let h = harness();
        let session = Session::new(Arc::new(ScriptedAuth::default()), h.cache.clone());
        let signed_in = session.sign_in("u1@example.com", "pw", &h.store).await.unwrap();
        assert_eq!(signed_in.role, Role::Student);
    }

    #[tokio::test]
    async fn rejected_login_surfaces_backend_message() {
        let h = harness();
        let auth = Arc::new(ScriptedAuth {
            login_error: Some((400, "Invalid login credentials".to_string())),
            ..Default::default()
        });
        let session = Session::new(auth, h.cache.clone());

        let err = session.sign_in("x@example.com", "bad", &h.store).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(h.cache.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        assert!(h.store.cached_attendance().await.is_empty());
    }

    #[tokio::test]
    async fn sign_up_without_session_stores_nothing() {
        let h = harness();
        let session = Session::new(Arc::new(ScriptedAuth::default()), h.cache.clone());
        assert_eq!(session.sign_up("u2@example.com", "pw", "Jules").await.unwrap(), None);
        assert_eq!(h.cache.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_keys_even_when_backend_is_down() {
        let h = harness();
        let auth = Arc::new(ScriptedAuth {
            offline_logout: true,
            ..Default::default()
        });
        let session = Session::new(auth.clone(), h.cache.clone());
        session.sign_in("u1@example.com", "pw", &h.store).await.unwrap();

        session.sign_out().await;

        assert_eq!(auth.logout_calls.load(Ordering::SeqCst), 1);
        for key in [ACCESS_TOKEN_KEY, USER_KEY, USER_ROLE_KEY] {
            assert_eq!(h.cache.get(key).await.unwrap(), None, "{key} not cleared");
        }
    }

    #[tokio::test]
    async fn expired_token_signs_out() {
        let h = harness();
        let auth = Arc::new(ScriptedAuth::default());
        *auth.profile.lock().unwrap() = Some(Err(401));
        let session = Session::new(auth, h.cache.clone());
        h.cache.set(ACCESS_TOKEN_KEY, "stale").await.unwrap();

        let err = session.check_session().await.unwrap_err();
        assert!(matches!(err, SessionError::Expired));
        assert_eq!(h.cache.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_errors_keep_local_session() {
        let h = harness();
        let auth = Arc::new(ScriptedAuth::default());
        *auth.profile.lock().unwrap() = Some(Err(500));
        let session = Session::new(auth, h.cache.clone());
        h.cache.set(ACCESS_TOKEN_KEY, "tok").await.unwrap();

        assert_eq!(session.check_session().await.unwrap(), SessionCheck::KeptLocal);
        assert_eq!(h.cache.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn valid_session_refreshes_user_and_role() {
        let h = harness();
        let auth = Arc::new(ScriptedAuth {
            role: Some(Role::Instructor),
            ..Default::default()
        });
        *auth.profile.lock().unwrap() = Some(Ok(user("u5")));
        let session = Session::new(auth, h.cache.clone());
        h.cache.set(ACCESS_TOKEN_KEY, "tok").await.unwrap();

        assert_eq!(
            session.check_session().await.unwrap(),
            SessionCheck::Refreshed {
                user: user("u5"),
                role: Role::Instructor
            }
        );
        assert_eq!(session.current_role().await, Some(Role::Instructor));
    }

    #[tokio::test]
    async fn no_token_means_no_session() {
        let h = harness();
        let session = Session::new(Arc::new(ScriptedAuth::default()), h.cache.clone());
        assert_eq!(session.check_session().await.unwrap(), SessionCheck::NoSession);
    }
}
