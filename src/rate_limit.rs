//! Per-subscription sliding-window rate limiting.
//!
//! Admissions are timestamped and expire individually as they fall out of the
//! trailing window; there is no bulk reset. Each subscription's window lives
//! behind its own lock, so exhausting one quota never blocks another.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::types::RateLimit;

struct Window {
    admissions: VecDeque<Instant>,
}

impl Window {
    fn allow(&mut self, limit: RateLimit, now: Instant) -> bool {
        let span = Duration::from_secs(limit.window_secs);
        while let Some(&oldest) = self.admissions.front() {
            if now.duration_since(oldest) >= span {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
        if self.admissions.len() < limit.max_requests as usize {
            self.admissions.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Registry of sliding windows keyed by subscription id.
pub struct RateLimiterRegistry {
    default_limit: RateLimit,
    windows: RwLock<HashMap<Uuid, Arc<Mutex<Window>>>>,
}

impl RateLimiterRegistry {
    pub fn new(default_limit: RateLimit) -> Self {
        Self {
            default_limit,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_limit(&self) -> RateLimit {
        self.default_limit
    }

    /// Record an admission attempt and return whether it is within quota.
    ///
    /// `override_limit` is the subscription-level limit, if any; otherwise the
    /// registry default applies.
    pub async fn allow(&self, subscription_id: Uuid, override_limit: Option<RateLimit>) -> bool {
        let limit = override_limit.unwrap_or(self.default_limit);
        let window = self.window_for(subscription_id).await;
        let mut window = window.lock().await;
        window.allow(limit, Instant::now())
    }

    /// Drop all state for a subscription (on delete).
    pub async fn remove(&self, subscription_id: Uuid) {
        self.windows.write().await.remove(&subscription_id);
    }

    /// Number of subscriptions with window state.
    pub async fn tracked(&self) -> usize {
        self.windows.read().await.len()
    }

    async fn window_for(&self, subscription_id: Uuid) -> Arc<Mutex<Window>> {
        {
            let windows = self.windows.read().await;
            if let Some(window) = windows.get(&subscription_id) {
                return window.clone();
            }
        }
        let mut windows = self.windows.write().await;
        windows
            .entry(subscription_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Window {
                    admissions: VecDeque::new(),
                }))
            })
            .clone()
    }
}
