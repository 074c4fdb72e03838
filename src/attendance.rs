//! Attendance and suspension persistence.
//!
//! The backend is the source of truth whenever it answers; the local cache
//! is a mirror of the last successful fetch plus any optimistic writes made
//! since. Nothing here returns an error to the caller: a remote failure
//! degrades to cache-only behaviour and is logged. Local and remote may
//! diverge until the next successful fetch, which overwrites the cache
//! wholesale.

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::alerts::{Alert, AlertSink};
use crate::api::AttendanceBackend;
use crate::models::{AccountStatus, AttendanceRecord, AttendanceStatus, SuspensionEntry};
use crate::rules;
use crate::storage::{load_json, save_json, KeyValueStore, ATTENDANCE_KEY, SUSPENDED_KEY};
use crate::sync::BackgroundSync;

pub struct AttendanceStore {
    cache: Arc<dyn KeyValueStore>,
    remote: Arc<dyn AttendanceBackend>,
    alerts: Arc<dyn AlertSink>,
    sync: BackgroundSync,
    // Serializes read-modify-write of the cached lists within this process.
    cache_lock: Mutex<()>,
}

impl AttendanceStore {
    pub fn new(
        cache: Arc<dyn KeyValueStore>,
        remote: Arc<dyn AttendanceBackend>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            cache,
            remote,
            alerts,
            sync: BackgroundSync::new(),
            cache_lock: Mutex::new(()),
        }
    }

    pub fn alerts(&self) -> &dyn AlertSink {
        self.alerts.as_ref()
    }

    pub fn background(&self) -> &BackgroundSync {
        &self.sync
    }

    /// Waits for outstanding fire-and-forget writes.
    pub async fn drain(&self) {
        self.sync.drain().await;
    }

    pub async fn cached_attendance(&self) -> Vec<AttendanceRecord> {
        load_json(self.cache.as_ref(), ATTENDANCE_KEY).await
    }

    pub async fn cached_suspended_users(&self) -> Vec<SuspensionEntry> {
        load_json(self.cache.as_ref(), SUSPENDED_KEY).await
    }

    /// Remote records when the backend answers (mirrored into the cache),
    /// otherwise the cache as it stands.
    pub async fn fetch_all_attendance(&self) -> Vec<AttendanceRecord> {
        match self.remote.fetch_attendance().await {
            Ok(records) => {
                let _guard = self.cache_lock.lock().await;
                self.persist(ATTENDANCE_KEY, &records).await;
                records
            }
            Err(e) => {
                tracing::warn!(error = %e, "Attendance fetch failed, using local cache");
                self.cached_attendance().await
            }
        }
    }

    pub async fn fetch_suspended_users(&self) -> Vec<SuspensionEntry> {
        match self.remote.fetch_suspended_users().await {
            Ok(entries) => {
                let _guard = self.cache_lock.lock().await;
                self.persist(SUSPENDED_KEY, &entries).await;
                entries
            }
            Err(e) => {
                tracing::warn!(error = %e, "Suspension fetch failed, using local cache");
                self.cached_suspended_users().await
            }
        }
    }

    /// Records `user_id` as present today (local calendar date). A second
    /// call on the same day changes nothing. Returns whether a record was
    /// written.
    pub async fn log_daily_attendance(&self, user_id: &str, role: &str) -> bool {
        let today = Local::now().date_naive();

        {
            let _guard = self.cache_lock.lock().await;
            let mut records = self.cached_attendance().await;
            if records
                .iter()
                .any(|record| record.user_id == user_id && record.date == today)
            {
                tracing::debug!(user_id, %today, "Attendance already logged today");
                return false;
            }

            records.push(AttendanceRecord::new(
                user_id,
                role,
                today,
                AttendanceStatus::Present,
                Utc::now(),
            ));
            self.persist(ATTENDANCE_KEY, &records).await;
        }

        tracing::info!(user_id, role, %today, "Logged daily attendance");

        let remote = self.remote.clone();
        let role = role.to_string();
        self.sync.spawn("attendance.log", async move {
            remote.log_attendance(&role).await
        });
        true
    }

    /// Upserts an absent record for (`user_id`, `date`), pushes it to the
    /// backend in the background and re-evaluates suspension. Returns the
    /// user's absence count after the write.
    pub async fn mark_absent(&self, user_id: &str, role: &str, date: NaiveDate) -> usize {
        let record = {
            let _guard = self.cache_lock.lock().await;
            let mut records = self.cached_attendance().await;
            let record = upsert(
                &mut records,
                AttendanceRecord::new(user_id, role, date, AttendanceStatus::Absent, Utc::now()),
            );
            self.persist(ATTENDANCE_KEY, &records).await;
            record
        };

        tracing::info!(user_id, %date, "Marked absent");

        let remote = self.remote.clone();
        let pending = record.clone();
        self.sync.spawn("attendance.record", async move {
            remote.record_attendance(&pending).await
        });

        let records = self.fetch_attendance_keeping(&record).await;
        rules::enforce(self, user_id, &records).await
    }

    /// Like [`fetch_all_attendance`](Self::fetch_all_attendance), with
    /// `record` upserted into the remote list before it is mirrored.
    async fn fetch_attendance_keeping(&self, record: &AttendanceRecord) -> Vec<AttendanceRecord> {
        match self.remote.fetch_attendance().await {
            Ok(mut records) => {
                upsert(&mut records, record.clone());
                let _guard = self.cache_lock.lock().await;
                self.persist(ATTENDANCE_KEY, &records).await;
                records
            }
            Err(e) => {
                tracing::warn!(error = %e, "Attendance fetch failed, using local cache");
                self.cached_attendance().await
            }
        }
    }

    pub async fn check_absences_and_suspend(&self, user_id: &str) -> usize {
        rules::check_absences_and_suspend(self, user_id).await
    }

    /// Adds `user_id` to the suspended set. Returns `false` without side
    /// effects when the user is already suspended.
    pub async fn suspend_user(&self, user_id: &str) -> bool {
        {
            let _guard = self.cache_lock.lock().await;
            let mut suspended = self.cached_suspended_users().await;
            if suspended.iter().any(|entry| entry.user_id == user_id) {
                return false;
            }

            suspended.push(SuspensionEntry {
                user_id: user_id.to_string(),
                suspended_at: Utc::now(),
            });
            self.persist(SUSPENDED_KEY, &suspended).await;
        }

        self.push_profile_status(user_id, AccountStatus::Suspended);
        self.alerts.emit(Alert::Suspended {
            user_id: user_id.to_string(),
        });
        true
    }

    /// Removes `user_id` from the suspended set. Returns whether an entry
    /// was removed; the backend profile is set to active either way.
    pub async fn reactivate_user(&self, user_id: &str) -> bool {
        let removed = {
            let _guard = self.cache_lock.lock().await;
            let mut suspended = self.cached_suspended_users().await;
            let before = suspended.len();
            suspended.retain(|entry| entry.user_id != user_id);
            self.persist(SUSPENDED_KEY, &suspended).await;
            suspended.len() != before
        };

        tracing::info!(user_id, removed, "Reactivated user");
        self.push_profile_status(user_id, AccountStatus::Active);
        removed
    }

    /// Asks the backend first; falls back to the local suspended set.
    pub async fn is_user_suspended(&self, user_id: &str) -> bool {
        match self.remote.check_suspension(user_id).await {
            Ok(suspended) => suspended,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Suspension check failed, using local cache");
                self.cached_suspended_users()
                    .await
                    .iter()
                    .any(|entry| entry.user_id == user_id)
            }
        }
    }

    fn push_profile_status(&self, user_id: &str, status: AccountStatus) {
        let remote = self.remote.clone();
        let user_id = user_id.to_string();
        self.sync.spawn("profile.status", async move {
            remote.update_profile_status(&user_id, status).await
        });
    }

    async fn persist<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = save_json(self.cache.as_ref(), key, value).await {
            tracing::error!(key, error = %e, "Failed to write local cache");
        }
    }
}

/// Replaces the record for the same (user, date), or appends. An existing
/// record keeps its id and role. Returns the stored record.
fn upsert(records: &mut Vec<AttendanceRecord>, record: AttendanceRecord) -> AttendanceRecord {
    match records
        .iter_mut()
        .find(|existing| existing.user_id == record.user_id && existing.date == record.date)
    {
        Some(existing) => {
            existing.status = record.status;
            existing.timestamp = record.timestamp;
            existing.clone()
        }
        None => {
            records.push(record.clone());
            record
        }
    }
}
