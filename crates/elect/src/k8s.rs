// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Elector backed by a `coordination.k8s.io/v1` `Lease` object, mirroring
//! client-go's leader-election algorithm: acquire an absent/expired lease by
//! writing `holderIdentity`, then keep `renewTime` fresh well inside
//! `leaseDurationSeconds`.

use crate::{ElectError, ElectionCallbacks, LeaderElector, LeaseConfig};
use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct ClusterLeaseElector {
    client: Client,
    namespace: String,
    lease_name: String,
    lease: LeaseConfig,
    is_leader: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl ClusterLeaseElector {
    pub fn new(client: Client, namespace: impl Into<String>, lease_name: impl Into<String>, lease: LeaseConfig) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            lease_name: lease_name.into(),
            lease,
            is_leader: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_expired(held: &Lease, lease_duration_secs: i64, now: chrono::DateTime<chrono::Utc>) -> bool {
        let Some(spec) = &held.spec else { return true };
        let Some(renew) = &spec.renew_time else { return true };
        let age = now.signed_duration_since(renew.0);
        age.num_seconds() >= lease_duration_secs
    }
}

#[async_trait]
impl LeaderElector for ClusterLeaseElector {
    async fn start(
        &self,
        identity: String,
        callbacks: ElectionCallbacks,
    ) -> Result<(), ElectError> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let lease_name = self.lease_name.clone();
        let lease_duration_secs = self.lease.lease_duration.as_secs() as i64;
        let renew_deadline = self.lease.renew_deadline;
        let retry_period = self.lease.retry_period;
        let is_leader = Arc::clone(&self.is_leader);
        let stopped = Arc::clone(&self.stopped);

        tokio::spawn(async move {
            let mut last_renewed_at: Option<Instant> = None;

            loop {
                if stopped.load(Ordering::Acquire) {
                    return;
                }

                let now = chrono::Utc::now();
                let current = api.get_opt(&lease_name).await;

                match current {
                    Ok(None) => {
                        let lease = Lease {
                            metadata: ObjectMeta { name: Some(lease_name.clone()), ..Default::default() },
                            spec: Some(LeaseSpec {
                                holder_identity: Some(identity.clone()),
                                lease_duration_seconds: Some(lease_duration_secs as i32),
                                renew_time: Some(MicroTime(now)),
                                acquire_time: Some(MicroTime(now)),
                                lease_transitions: Some(0),
                                ..Default::default()
                            }),
                        };
                        match api.create(&PostParams::default(), &lease).await {
                            Ok(_) => {
                                is_leader.store(true, Ordering::Release);
                                last_renewed_at = Some(Instant::now());
                                info!(identity = %identity, "created and acquired cluster lease");
                                (callbacks.on_elected)();
                            }
                            Err(e) => warn!("lease create failed (likely lost the race): {e}"),
                        }
                    }
                    Ok(Some(held)) => {
                        let held_by_me =
                            held.spec.as_ref().and_then(|s| s.holder_identity.as_deref()) == Some(identity.as_str());

                        if held_by_me {
                            let patch = serde_json::json!({
                                "spec": { "renewTime": MicroTime(now), "holderIdentity": identity }
                            });
                            match api
                                .patch(&lease_name, &PatchParams::apply("kh-agentrt"), &Patch::Apply(&patch))
                                .await
                            {
                                Ok(_) => {
                                    last_renewed_at = Some(Instant::now());
                                    (callbacks.on_renew)();
                                }
                                Err(e) => {
                                    warn!("lease renew failed: {e}");
                                    let expired = last_renewed_at.is_some_and(|t| t.elapsed() >= renew_deadline);
                                    if expired && is_leader.swap(false, Ordering::AcqRel) {
                                        last_renewed_at = None;
                                        warn!(identity = %identity, "renew deadline exceeded, self-demoting");
                                        (callbacks.on_lost)();
                                    }
                                }
                            }
                        } else if Self::is_expired(&held, lease_duration_secs, now) {
                            let transitions =
                                held.spec.as_ref().and_then(|s| s.lease_transitions).unwrap_or(0) + 1;
                            let patch = serde_json::json!({
                                "spec": {
                                    "holderIdentity": identity,
                                    "renewTime": MicroTime(now),
                                    "acquireTime": MicroTime(now),
                                    "leaseDurationSeconds": lease_duration_secs as i32,
                                    "leaseTransitions": transitions,
                                }
                            });
                            match api
                                .patch(&lease_name, &PatchParams::apply("kh-agentrt"), &Patch::Apply(&patch))
                                .await
                            {
                                Ok(_) => {
                                    is_leader.store(true, Ordering::Release);
                                    last_renewed_at = Some(Instant::now());
                                    info!(identity = %identity, "acquired expired cluster lease");
                                    (callbacks.on_elected)();
                                }
                                Err(e) => warn!("lease takeover failed (likely lost the race): {e}"),
                            }
                        } else if is_leader.swap(false, Ordering::AcqRel) {
                            last_renewed_at = None;
                            warn!(identity = %identity, "lost cluster lease leadership");
                            (callbacks.on_lost)();
                        }
                    }
                    Err(e) => warn!("lease get failed: {e}"),
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
        self.is_leader.store(false, Ordering::Release);
    }
}
