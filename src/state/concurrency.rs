//! Single-slot guard around deployment execution
//!
//! At most one deployment script runs at a time. What happens to a delivery
//! that arrives while the slot is taken depends on the [`OverlapPolicy`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::OverlapPolicy;

/// Tracks and serializes deployments
#[derive(Clone)]
pub struct DeploymentSlot {
    lock: Arc<Mutex<()>>,
    /// Deployments currently holding the slot (0 or 1)
    active: Arc<AtomicU32>,
    /// Deliveries parked behind the running deployment
    waiting: Arc<AtomicU32>,
    policy: OverlapPolicy,
}

impl DeploymentSlot {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            active: Arc::new(AtomicU32::new(0)),
            waiting: Arc::new(AtomicU32::new(0)),
            policy,
        }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Take the slot according to the overlap policy
    ///
    /// Returns `None` when another deployment holds the slot and either the
    /// policy is [`OverlapPolicy::Reject`] or the slot did not free up
    /// within `max_wait`.
    pub async fn acquire(&self, delivery_id: &str, max_wait: Duration) -> Option<DeploymentGuard> {
        let permit = match self.policy {
            OverlapPolicy::Reject => match self.lock.clone().try_lock_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(delivery_id = %delivery_id, "Deployment slot busy, rejecting");
                    return None;
                }
            },
            OverlapPolicy::Queue => match self.lock.clone().try_lock_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    self.waiting.fetch_add(1, Ordering::SeqCst);
                    debug!(delivery_id = %delivery_id, "Deployment slot busy, queueing");
                    let waited = tokio::time::timeout(max_wait, self.lock.clone().lock_owned()).await;
                    self.waiting.fetch_sub(1, Ordering::SeqCst);
                    match waited {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!(
                                delivery_id = %delivery_id,
                                max_wait_ms = max_wait.as_millis() as u64,
                                "Gave up waiting for the running deployment"
                            );
                            return None;
                        }
                    }
                }
            },
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(delivery_id = %delivery_id, "Deployment slot acquired");

        Some(DeploymentGuard {
            _permit: permit,
            active: self.active.clone(),
            delivery_id: delivery_id.to_string(),
        })
    }

    pub fn in_progress(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    pub fn waiting(&self) -> u32 {
        self.waiting.load(Ordering::SeqCst)
    }
}

/// RAII guard that releases the deployment slot when dropped
pub struct DeploymentGuard {
    _permit: OwnedMutexGuard<()>,
    active: Arc<AtomicU32>,
    delivery_id: String,
}

impl Drop for DeploymentGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!(delivery_id = %self.delivery_id, "Deployment slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let slot = DeploymentSlot::new(OverlapPolicy::Reject);
        assert!(!slot.in_progress());

        {
            let _guard = slot.acquire("d-1", WAIT).await.unwrap();
            assert!(slot.in_progress());
        } // guard dropped here

        assert!(!slot.in_progress());
        assert!(slot.acquire("d-2", WAIT).await.is_some());
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_overlap() {
        let slot = DeploymentSlot::new(OverlapPolicy::Reject);
        let guard = slot.acquire("d-1", WAIT).await.unwrap();

        assert!(slot.acquire("d-2", WAIT).await.is_none());
        assert!(slot.in_progress());

        drop(guard);
        assert!(slot.acquire("d-3", WAIT).await.is_some());
    }

    #[tokio::test]
    async fn test_queue_policy_waits_for_running_deployment() {
        let slot = DeploymentSlot::new(OverlapPolicy::Queue);
        let guard = slot.acquire("d-1", WAIT).await.unwrap();

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.acquire("d-2", WAIT).await.is_some() })
        };

        // Give the waiter time to park on the lock
        for _ in 0..50 {
            if slot.waiting() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(slot.waiting(), 1);
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.unwrap());
        assert_eq!(slot.waiting(), 0);
        assert!(!slot.in_progress());
    }

    #[tokio::test]
    async fn test_queue_wait_is_bounded() {
        let slot = DeploymentSlot::new(OverlapPolicy::Queue);
        let _guard = slot.acquire("d-1", WAIT).await.unwrap();

        let started = std::time::Instant::now();
        assert!(slot.acquire("d-2", Duration::from_millis(200)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(slot.waiting(), 0);
        assert!(slot.in_progress());
    }

    #[tokio::test]
    async fn test_clones_share_the_slot() {
        let slot = DeploymentSlot::new(OverlapPolicy::Reject);
        let other = slot.clone();

        let _guard = slot.acquire("d-1", WAIT).await.unwrap();
        assert!(other.in_progress());
        assert!(other.acquire("d-2", WAIT).await.is_none());
    }
}
