//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::alerts::{Alert, AlertSink};
use crate::api::AttendanceBackend;
use crate::attendance::AttendanceStore;
use crate::error::ApiError;
use crate::models::{AccountStatus, AttendanceRecord, SuspensionEntry};
use crate::storage::MemoryStore;

pub fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "backend unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock().unwrap())
    }
}

impl AlertSink for RecordingAlerts {
    fn emit(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// In-process backend whose reachability can be toggled. Writes are
/// recorded but do not feed back into what the fetch endpoints return.
#[derive(Default)]
pub struct ScriptedBackend {
    offline: AtomicBool,
    attendance: Mutex<Vec<AttendanceRecord>>,
    suspended: Mutex<Vec<SuspensionEntry>>,
    remote_suspended: Mutex<HashSet<String>>,
    posted: Mutex<Vec<AttendanceRecord>>,
    logged_roles: Mutex<Vec<String>>,
    status_updates: Mutex<Vec<(String, AccountStatus)>>,
}

impl ScriptedBackend {
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn set_attendance(&self, records: Vec<AttendanceRecord>) {
        *self.attendance.lock().unwrap() = records;
    }

    pub fn set_suspended(&self, entries: Vec<SuspensionEntry>) {
        *self.suspended.lock().unwrap() = entries;
    }

    pub fn mark_remote_suspended(&self, user_id: &str) {
        self.remote_suspended.lock().unwrap().insert(user_id.to_string());
    }

    pub fn posted(&self) -> Vec<AttendanceRecord> {
        self.posted.lock().unwrap().clone()
    }

    pub fn logged_roles(&self) -> Vec<String> {
        self.logged_roles.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<(String, AccountStatus)> {
        self.status_updates.lock().unwrap().clone()
    }

    fn reachable(&self) -> Result<(), ApiError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AttendanceBackend for ScriptedBackend {
    async fn fetch_attendance(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        self.reachable()?;
        Ok(self.attendance.lock().unwrap().clone())
    }

    async fn record_attendance(&self, record: &AttendanceRecord) -> Result<(), ApiError> {
        self.reachable()?;
        self.posted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn fetch_suspended_users(&self) -> Result<Vec<SuspensionEntry>, ApiError> {
        self.reachable()?;
        Ok(self.suspended.lock().unwrap().clone())
    }

    async fn log_attendance(&self, role: &str) -> Result<(), ApiError> {
        self.reachable()?;
        self.logged_roles.lock().unwrap().push(role.to_string());
        Ok(())
    }

    async fn check_suspension(&self, user_id: &str) -> Result<bool, ApiError> {
        self.reachable()?;
        Ok(self.remote_suspended.lock().unwrap().contains(user_id))
    }

    async fn update_profile_status(
        &self,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<(), ApiError> {
        self.reachable()?;
        self.status_updates
            .lock()
            .unwrap()
            .push((user_id.to_string(), status));
        Ok(())
    }
}

pub struct Harness {
    pub cache: Arc<MemoryStore>,
    pub backend: Arc<ScriptedBackend>,
    pub alerts: Arc<RecordingAlerts>,
    pub store: AttendanceStore,
}

/// Store wired to a reachable backend.
pub fn harness() -> Harness {
    let cache = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::default());
    let alerts = Arc::new(RecordingAlerts::default());
    let store = AttendanceStore::new(cache.clone(), backend.clone(), alerts.clone());
    Harness {
        cache,
        backend,
        alerts,
        store,
    }
}

/// Store wired to a backend that fails every call.
pub fn offline_harness() -> Harness {
    let h = harness();
    h.backend.set_online(false);
    h
}
