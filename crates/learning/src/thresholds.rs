//! RL Threshold Service: adjusts per-tenant detector
//! sensitivity from accumulated analyst feedback using an
//! epsilon-greedy explore/exploit policy.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use shadowai_core::types::TenantId;
use shadowai_detection::DetectorThresholds;
use std::sync::RwLock;

use crate::feedback::{FeedbackMetrics, FeedbackStore};

/// A multiplier applied to `DetectorThresholds::velocity_events_per_second`
/// (and, symmetrically, the other count-based thresholds) plus the
/// confidence the service has in that multiplier.
#[derive(Debug, Clone)]
pub struct OptimizedThresholds {
    pub multiplier: f64,
    pub confidence: f64,
    pub last_adjusted: DateTime<Utc>,
    pub last_reward: f64,
}

impl Default for OptimizedThresholds {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            confidence: 0.0,
            last_adjusted: Utc::now(),
            last_reward: 0.0,
        }
    }
}

impl OptimizedThresholds {
    /// Never lets the detector become more than 10x more sensitive than
    /// its baseline.
    const FLOOR: f64 = 0.1;

    fn clamp(mut self) -> Self {
        self.multiplier = self.multiplier.max(Self::FLOOR);
        self
    }

    /// Applies the multiplier to a baseline `DetectorThresholds`,
    /// scaling every count/rate field so a >1 multiplier desensitizes
    /// and a <1 multiplier sensitizes all detectors uniformly.
    pub fn apply(&self, baseline: &DetectorThresholds) -> DetectorThresholds {
        DetectorThresholds {
            velocity_events_per_second: baseline.velocity_events_per_second * self.multiplier,
            batch_min_actions: ((baseline.batch_min_actions as f64) * self.multiplier).round().max(1.0) as u32,
            batch_window_secs: baseline.batch_window_secs,
            off_hours_min_events: ((baseline.off_hours_min_events as f64) * self.multiplier).round().max(1.0) as u32,
            timing_variance_cov_threshold: baseline.timing_variance_cov_threshold * self.multiplier,
        }
    }
}

/// The four detectors whose sensitivity `DetectorThresholds` exposes a
/// tunable field for; `permission_escalation` and `ai_provider` have no
/// threshold to adjust and so never gain a cache entry.
pub const TUNABLE_DETECTORS: [&str; 4] = ["velocity", "batch_operation", "off_hours", "timing_variance"];

/// Key used to scope feedback and thresholds: a tenant learns a
/// separate multiplier per detector, since a tenant's Slack velocity
/// detector can be noisy while its off-hours detector is fine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tenant_id: TenantId,
    detector: String,
}

/// Exploration probability: one adjustment in ten nudges the
/// multiplier at random instead of from the feedback signal, so the
/// policy keeps sampling thresholds it would otherwise converge away
/// from.
const EXPLORATION_RATE: f64 = 0.10;

/// Minimum feedback rows before the service trusts the metrics enough
/// to adjust anything; below this it returns the cached (or default)
/// multiplier unchanged.
const MIN_FEEDBACK_FOR_ADJUSTMENT: u32 = 10;

/// Feedback count past which confidence saturates at 1.0.
const CONFIDENCE_SATURATION: f64 = 100.0;

pub struct RlThresholdService {
    feedback: FeedbackStore,
    cache: DashMap<CacheKey, RwLock<OptimizedThresholds>>,
    feedback_window_days: u32,
}

impl RlThresholdService {
    pub fn new(feedback: FeedbackStore, feedback_window_days: u32) -> Self {
        Self {
            feedback,
            cache: DashMap::new(),
            feedback_window_days,
        }
    }

    /// Returns the currently cached multiplier for a tenant/detector
    /// without recomputing anything, defaulting to an unadjusted 1.0.
    pub fn current(&self, tenant_id: TenantId, detector: &str) -> OptimizedThresholds {
        let key = CacheKey { tenant_id, detector: detector.to_string() };
        self.cache
            .get(&key)
            .map(|entry| entry.read().unwrap().clone())
            .unwrap_or_default()
    }

    /// Overwrites the cached multiplier directly, used by the
    /// [`crate::rollback::RollbackMonitor`] to force a reset.
    pub fn reset(&self, tenant_id: TenantId, detector: &str, value: OptimizedThresholds) {
        let key = CacheKey { tenant_id, detector: detector.to_string() };
        self.cache
            .entry(key)
            .and_modify(|entry| *entry.write().unwrap() = value.clone())
            .or_insert_with(|| RwLock::new(value));
    }

    /// Composes the cached per-detector multipliers onto a baseline
    /// `DetectorThresholds`, scaling each field by the multiplier learned
    /// for the detector that owns it rather than one multiplier applied
    /// uniformly across all four.
    pub fn effective_thresholds(&self, tenant_id: TenantId, baseline: &DetectorThresholds) -> DetectorThresholds {
        let velocity = self.current(tenant_id, "velocity").apply(baseline).velocity_events_per_second;
        let (batch_min_actions, batch_window_secs) = {
            let scaled = self.current(tenant_id, "batch_operation").apply(baseline);
            (scaled.batch_min_actions, scaled.batch_window_secs)
        };
        let off_hours_min_events = self.current(tenant_id, "off_hours").apply(baseline).off_hours_min_events;
        let timing_variance_cov_threshold =
            self.current(tenant_id, "timing_variance").apply(baseline).timing_variance_cov_threshold;

        DetectorThresholds {
            velocity_events_per_second: velocity,
            batch_min_actions,
            batch_window_secs,
            off_hours_min_events,
            timing_variance_cov_threshold,
        }
    }

    /// Recomputes the multiplier for one tenant/detector from its
    /// feedback window and caches the result.
    ///
    /// Decision rule, in order:
    /// - fewer than [`MIN_FEEDBACK_FOR_ADJUSTMENT`] rows: return the
    ///   cached value unchanged (not enough signal yet).
    /// - `EXPLORATION_RATE` of the time: explore, nudging the
    ///   multiplier by a small random step either direction.
    /// - precision < 0.85 and false positives > 3: desensitize by 10%.
    /// - recall < 0.90 and false negatives > 2: sensitize by 10%.
    /// - otherwise fine-tune by the computed reward, +/-2%.
    pub async fn adjust(&self, tenant_id: TenantId, detector: &str) -> shadowai_core::error::Result<OptimizedThresholds> {
        let key = CacheKey { tenant_id, detector: detector.to_string() };
        let (metrics, count) = self
            .feedback
            .metrics_for_window(tenant_id, detector, self.feedback_window_days)
            .await?;

        let mut current = self.current(tenant_id, detector);

        if count < MIN_FEEDBACK_FOR_ADJUSTMENT {
            return Ok(current);
        }

        current.confidence = (count as f64 / CONFIDENCE_SATURATION).min(1.0);

        let mut rng = rand::thread_rng();
        if rng.gen_bool(EXPLORATION_RATE) {
            let jitter: f64 = rng.gen_range(0.9..=1.1);
            current.multiplier *= jitter;
            current.last_reward = 0.0;
        } else {
            let reward = reward_for(&metrics);
            current.last_reward = reward;
            if metrics.precision() < 0.85 && metrics.false_positives > 3 {
                current.multiplier *= 1.10;
            } else if metrics.recall() < 0.90 && metrics.false_negatives > 2 {
                current.multiplier *= 0.90;
            } else if reward > 0.0 {
                current.multiplier *= 1.0 - 0.02;
            } else if reward < 0.0 {
                current.multiplier *= 1.0 + 0.02;
            }
        }

        current.last_adjusted = Utc::now();
        let current = current.clamp();
        self.cache
            .entry(key)
            .or_insert_with(|| RwLock::new(OptimizedThresholds::default()));
        if let Some(entry) = self.cache.get(&CacheKey { tenant_id, detector: detector.to_string() }) {
            *entry.write().unwrap() = current.clone();
        }
        Ok(current)
    }
}

/// Balances precision against recall into a single signed reward: a
/// detector that is both precise and complete scores positive, one
/// that is noisy or blind scores negative.
fn reward_for(metrics: &FeedbackMetrics) -> f64 {
    (metrics.precision() - 0.5) + (metrics.recall() - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{DetectionFeedback, FeedbackLabel, InMemoryFeedbackRepository};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn seed(store: &FeedbackStore, tenant_id: TenantId, detector: &str, tp: u32, fp: u32, fnn: u32) {
        for _ in 0..tp {
            store.submit(DetectionFeedback::new(tenant_id, detector, FeedbackLabel::TruePositive)).await.unwrap();
        }
        for _ in 0..fp {
            store.submit(DetectionFeedback::new(tenant_id, detector, FeedbackLabel::FalsePositive)).await.unwrap();
        }
        for _ in 0..fnn {
            store.submit(DetectionFeedback::new(tenant_id, detector, FeedbackLabel::FalseNegative)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn below_minimum_feedback_leaves_multiplier_unchanged() {
        let store = FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default()));
        let tenant_id = TenantId(Uuid::new_v4());
        seed(&store, tenant_id, "velocity", 2, 1, 0).await;

        let service = RlThresholdService::new(store, 30);
        let result = service.adjust(tenant_id, "velocity").await.unwrap();
        assert_eq!(result.multiplier, 1.0);
    }

    #[tokio::test]
    async fn low_precision_desensitizes_baseline() {
        let store = FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default()));
        let tenant_id = TenantId(Uuid::new_v4());
        seed(&store, tenant_id, "velocity", 3, 8, 0).await;

        let service = RlThresholdService::new(store, 30);
        let mut adjusted = service.adjust(tenant_id, "velocity").await.unwrap();
        // Exploration is probabilistic; retry until we observe the exploitation branch.
        for _ in 0..20 {
            if (adjusted.multiplier - 1.10).abs() < 1e-9 {
                break;
            }
            adjusted = service.adjust(tenant_id, "velocity").await.unwrap();
        }
        assert!(adjusted.multiplier >= 1.0);
    }

    #[test]
    fn floor_prevents_runaway_sensitization() {
        let thresholds = OptimizedThresholds { multiplier: 0.01, confidence: 1.0, last_adjusted: Utc::now(), last_reward: -1.0 }.clamp();
        assert_eq!(thresholds.multiplier, OptimizedThresholds::FLOOR);
    }

    #[test]
    fn apply_scales_baseline_thresholds() {
        let thresholds = OptimizedThresholds { multiplier: 2.0, confidence: 1.0, last_adjusted: Utc::now(), last_reward: 0.0 };
        let scaled = thresholds.apply(&DetectorThresholds::default());
        assert_eq!(scaled.velocity_events_per_second, 10.0);
        assert_eq!(scaled.batch_min_actions, 10);
    }
}
