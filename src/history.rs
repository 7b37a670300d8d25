//! Bounded per-subscription delivery history.
//!
//! Attempts are append-only and immutable once recorded; retention evicts the
//! oldest first. Appends for one subscription are serialized behind that
//! subscription's lock so attempt ordering stays monotonic.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::types::{DeliveryAttempt, DeliveryOutcome, DeliveryStats, HealthStatus, SubscriptionHealth};

/// Attempts considered when deriving health status.
const HEALTH_WINDOW: usize = 20;

pub struct DeliveryLog {
    max_per_subscription: usize,
    entries: RwLock<HashMap<Uuid, Arc<Mutex<VecDeque<DeliveryAttempt>>>>>,
}

impl DeliveryLog {
    pub fn new(max_per_subscription: usize) -> Self {
        Self {
            max_per_subscription,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Append an attempt, evicting the oldest entry at capacity.
    pub async fn record(&self, attempt: DeliveryAttempt) {
        let ring = self.ring_for(attempt.subscription_id).await;
        let mut ring = ring.lock().await;
        if ring.len() >= self.max_per_subscription {
            ring.pop_front();
        }
        ring.push_back(attempt);
    }

    /// Most-recent-first attempts, at most `limit`.
    pub async fn recent(&self, subscription_id: Uuid, limit: usize) -> Vec<DeliveryAttempt> {
        let entries = self.entries.read().await;
        let Some(ring) = entries.get(&subscription_id) else {
            return Vec::new();
        };
        let ring = ring.lock().await;
        ring.iter().rev().take(limit).cloned().collect()
    }

    /// Aggregate counters over retained history.
    pub async fn stats(&self, subscription_id: Uuid) -> DeliveryStats {
        let entries = self.entries.read().await;
        let Some(ring) = entries.get(&subscription_id) else {
            return DeliveryStats::default();
        };
        let ring = ring.lock().await;
        let mut stats = DeliveryStats::default();
        for attempt in ring.iter() {
            stats.total_attempts += 1;
            match attempt.outcome {
                DeliveryOutcome::Success => stats.successes += 1,
                DeliveryOutcome::Failure => stats.failures += 1,
            }
        }
        stats
    }

    /// Health derived purely from recorded history; no separate state.
    pub async fn health(&self, subscription_id: Uuid) -> SubscriptionHealth {
        let recent = self.recent(subscription_id, HEALTH_WINDOW).await;
        if recent.is_empty() {
            return SubscriptionHealth {
                status: HealthStatus::Unknown,
                last_delivery: None,
                success_rate: 0.0,
            };
        }

        let successes = recent
            .iter()
            .filter(|a| a.outcome == DeliveryOutcome::Success)
            .count();
        let success_rate = successes as f64 / recent.len() as f64;
        let last_delivery: Option<DateTime<Utc>> = recent
            .iter()
            .find(|a| a.outcome == DeliveryOutcome::Success)
            .map(|a| a.timestamp);

        let status = if success_rate >= 0.9 {
            HealthStatus::Healthy
        } else if success_rate >= 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Failing
        };

        SubscriptionHealth {
            status,
            last_delivery,
            success_rate,
        }
    }

    /// Drop all history for a subscription (on delete).
    pub async fn remove(&self, subscription_id: Uuid) {
        self.entries.write().await.remove(&subscription_id);
    }

    async fn ring_for(&self, subscription_id: Uuid) -> Arc<Mutex<VecDeque<DeliveryAttempt>>> {
        {
            let entries = self.entries.read().await;
            if let Some(ring) = entries.get(&subscription_id) {
                return ring.clone();
            }
        }
        let mut entries = self.entries.write().await;
        entries
            .entry(subscription_id)
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }
}
