//! Client-side attendance, suspension and notification logic for the AOTMS
//! learning platform.
//!
//! Everything here talks to the LMS REST backend and mirrors state into a
//! local [`storage::KeyValueStore`], degrading to the cached copy whenever
//! the backend is unreachable. The `aotms` binary in `main.rs` is a thin CLI
//! over these modules.

pub mod alerts;
pub mod api;
pub mod attendance;
pub mod config;
pub mod courses;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod notifications;
pub mod preferences;
pub mod report;
pub mod rules;
pub mod session;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;
