// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Single-host elector backed by an `flock(2)`-style exclusive lock.
//!
//! Intended for a standalone Docker deployment with one agent-runtime
//! process per host: the OS releases the lock the instant the process dies,
//! so there is no lease to renew and no false-positive holder after a crash.

use crate::{ElectError, ElectionCallbacks, LeaderElector, LeaseConfig};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct FileLockElector {
    lock_path: PathBuf,
    retry_period: std::time::Duration,
    is_leader: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    held_file: Arc<Mutex<Option<File>>>,
}

impl FileLockElector {
    pub fn new(lock_path: impl Into<PathBuf>, lease: LeaseConfig) -> Self {
        Self {
            lock_path: lock_path.into(),
            retry_period: lease.retry_period,
            is_leader: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            held_file: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl LeaderElector for FileLockElector {
    async fn start(
        &self,
        identity: String,
        callbacks: ElectionCallbacks,
    ) -> Result<(), ElectError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = self.lock_path.clone();
        let retry_period = self.retry_period;
        let is_leader = Arc::clone(&self.is_leader);
        let stopped = Arc::clone(&self.stopped);
        let held_file = Arc::clone(&self.held_file);

        tokio::spawn(async move {
            loop {
                if stopped.load(Ordering::Acquire) {
                    return;
                }
                if !is_leader.load(Ordering::Acquire) {
                    let path = lock_path.clone();
                    let acquired: std::io::Result<Option<std::fs::File>> =
                        tokio::task::spawn_blocking(move || {
                            let file = std::fs::OpenOptions::new()
                                .write(true)
                                .create(true)
                                .truncate(false)
                                .open(&path)?;
                            match file.try_lock_exclusive() {
                                Ok(()) => Ok(Some(file)),
                                Err(_) => Ok(None),
                            }
                        })
                        .await
                        .unwrap_or(Ok(None));

                    match acquired {
                        Ok(Some(file)) => {
                            *held_file.lock() = Some(file);
                            is_leader.store(true, Ordering::Release);
                            info!(identity = %identity, "acquired file-lock leadership");
                            (callbacks.on_elected)();
                        }
                        Ok(None) => {}
                        Err(e) => warn!("file-lock acquire attempt failed: {e}"),
                    }
                }
                tokio::time::sleep(retry_period).await;
            }
        });

        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if self.is_leader.swap(false, Ordering::AcqRel) {
            // Dropping the file releases the OS lock.
            *self.held_file.lock() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    #[serial]
    async fn single_process_acquires_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let elector = FileLockElector::new(dir.path().join("leader.lock"), LeaseConfig::default());

        let elected = Arc::new(AtomicUsize::new(0));
        let elected_clone = Arc::clone(&elected);
        elector
            .start(
                "r1".into(),
                ElectionCallbacks::new(move || { elected_clone.fetch_add(1, Ordering::SeqCst); }, || {}, || {}),
            )
            .await
            .expect("start");

        for _ in 0..50 {
            if elector.is_leader() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert!(elector.is_leader());
        assert_eq!(elected.load(Ordering::SeqCst), 1);
        elector.stop().await;
        assert!(!elector.is_leader());
    }

    #[tokio::test]
    #[serial]
    async fn second_elector_stays_follower_while_first_holds_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock_path = dir.path().join("leader.lock");

        let first = FileLockElector::new(&lock_path, LeaseConfig::default());
        first.start("r1".into(), ElectionCallbacks::new(|| {}, || {}, || {})).await.expect("start");
        for _ in 0..50 {
            if first.is_leader() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(first.is_leader());

        let second = FileLockElector::new(
            &lock_path,
            LeaseConfig { retry_period: std::time::Duration::from_millis(20), ..Default::default() },
        );
        second.start("r2".into(), ElectionCallbacks::new(|| {}, || {}, || {})).await.expect("start");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!second.is_leader());

        first.stop().await;
        second.stop().await;
    }
}
