//! Safety rollback monitor: compares a detector's recent
//! feedback quality against its trailing baseline and neutralizes its
//! learned multiplier when quality has regressed.

use chrono::{Duration, Utc};
use shadowai_core::types::TenantId;
use tracing::warn;

use crate::feedback::{FeedbackMetrics, FeedbackStore};
use crate::thresholds::{OptimizedThresholds, RlThresholdService};

/// Short lookback used to catch a recent regression.
const SHORT_WINDOW_DAYS: u32 = 7;
/// Long lookback used as the trusted baseline to compare against.
const LONG_WINDOW_DAYS: u32 = 30;

/// Precision drop (long-window baseline minus short-window recent), in
/// percentage points, past which a rollback fires.
const PRECISION_DROP_THRESHOLD_PP: f64 = 5.0;
/// Minimum feedback rows in both windows before the precision comparison
/// is trusted.
const MIN_SAMPLES_FOR_PRECISION_CHECK: u32 = 5;

/// Summed short-window reward below which a rollback fires.
const REWARD_THRESHOLD: f64 = -5.0;
/// Minimum short-window feedback rows before the reward aggregate is
/// trusted.
const MIN_SAMPLES_FOR_REWARD_CHECK: u32 = 10;

#[derive(Debug, Clone)]
pub struct RollbackDecision {
    pub tenant_id: TenantId,
    pub detector: String,
    pub rolled_back: bool,
    pub precision_drop_pp: f64,
    pub reward: f64,
}

/// Periodically evaluates a detector's trailing-7-day feedback against
/// its trailing-30-day baseline for every tenant/detector the RL service
/// has adjusted, and resets the cached multiplier to neutral (1.0) when
/// either precision has dropped more than [`PRECISION_DROP_THRESHOLD_PP`]
/// points or the summed 7-day reward has fallen below
/// [`REWARD_THRESHOLD`].
pub struct RollbackMonitor {
    feedback: FeedbackStore,
}

impl RollbackMonitor {
    pub fn new(feedback: FeedbackStore) -> Self {
        Self { feedback }
    }

    /// Evaluates one tenant/detector pair and, if warranted, resets its
    /// cached multiplier in `service` back to neutral (1.0) while
    /// preserving accumulated confidence.
    pub async fn check(
        &self,
        service: &RlThresholdService,
        tenant_id: TenantId,
        detector: &str,
    ) -> shadowai_core::error::Result<RollbackDecision> {
        let (short_metrics, short_count) = self
            .feedback
            .metrics_for_window(tenant_id, detector, SHORT_WINDOW_DAYS)
            .await?;
        let (long_metrics, long_count) = self
            .feedback
            .metrics_for_window(tenant_id, detector, LONG_WINDOW_DAYS)
            .await?;

        let precision_drop_pp = (long_metrics.precision() - short_metrics.precision()) * 100.0;
        let precision_regressed = short_count >= MIN_SAMPLES_FOR_PRECISION_CHECK
            && long_count >= MIN_SAMPLES_FOR_PRECISION_CHECK
            && precision_drop_pp > PRECISION_DROP_THRESHOLD_PP;

        let reward = reward_sum(&short_metrics);
        let reward_collapsed = short_count >= MIN_SAMPLES_FOR_REWARD_CHECK && reward < REWARD_THRESHOLD;

        let rolled_back = precision_regressed || reward_collapsed;

        if rolled_back {
            warn!(
                tenant_id = %tenant_id.0,
                detector,
                precision_drop_pp,
                reward,
                precision_regressed,
                reward_collapsed,
                "detector quality regressed, rolling back threshold multiplier"
            );
            let mut current = service.current(tenant_id, detector);
            current.multiplier = 1.0;
            current.last_adjusted = Utc::now();
            current.last_reward = 0.0;
            service.reset(tenant_id, detector, current);
        }

        Ok(RollbackDecision {
            tenant_id,
            detector: detector.to_string(),
            rolled_back,
            precision_drop_pp,
            reward,
        })
    }
}

/// +1 per true positive, -1 per false positive or false negative; the
/// same signed-error signal the RL service's exploitation branch reads,
/// summed instead of averaged so it scales with sample volume.
fn reward_sum(metrics: &FeedbackMetrics) -> f64 {
    metrics.true_positives as f64 - metrics.false_positives as f64 - metrics.false_negatives as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{DetectionFeedback, FeedbackLabel, InMemoryFeedbackRepository};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn seed_at(store: &FeedbackStore, tenant_id: TenantId, detector: &str, label: FeedbackLabel, days_ago: i64) {
        let feedback = DetectionFeedback {
            feedback_id: Uuid::new_v4(),
            tenant_id,
            automation_id: None,
            detector: detector.to_string(),
            label,
            submitted_by: None,
            notes: None,
            submitted_at: Utc::now() - Duration::days(days_ago),
        };
        store.submit(feedback).await.unwrap();
    }

    #[tokio::test]
    async fn stable_quality_does_not_roll_back() {
        let repo = Arc::new(InMemoryFeedbackRepository::default());
        let store = FeedbackStore::new(repo);
        let tenant_id = TenantId(Uuid::new_v4());

        for _ in 0..10 {
            store.submit(DetectionFeedback::new(tenant_id, "velocity", FeedbackLabel::TruePositive)).await.unwrap();
        }

        let rl = RlThresholdService::new(FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default())), 30);
        let monitor = RollbackMonitor::new(store);
        let decision = monitor.check(&rl, tenant_id, "velocity").await.unwrap();
        assert!(!decision.rolled_back);
    }

    #[tokio::test]
    async fn precision_drop_past_five_points_rolls_back() {
        let repo = Arc::new(InMemoryFeedbackRepository::default());
        let store = FeedbackStore::new(repo);
        let tenant_id = TenantId(Uuid::new_v4());

        // Outside the 7-day short window but inside the 30-day long window:
        // a clean history that sets a high-precision baseline.
        for _ in 0..20 {
            seed_at(&store, tenant_id, "velocity", FeedbackLabel::TruePositive, 20).await;
        }
        // Inside the short window: precision collapses to 50% recently.
        for _ in 0..5 {
            seed_at(&store, tenant_id, "velocity", FeedbackLabel::TruePositive, 1).await;
        }
        for _ in 0..5 {
            seed_at(&store, tenant_id, "velocity", FeedbackLabel::FalsePositive, 1).await;
        }

        let rl = RlThresholdService::new(FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default())), 30);
        let monitor = RollbackMonitor::new(store);
        let decision = monitor.check(&rl, tenant_id, "velocity").await.unwrap();
        assert!(decision.rolled_back);
        assert!(decision.precision_drop_pp > 5.0);

        let reset = rl.current(tenant_id, "velocity");
        assert_eq!(reset.multiplier, 1.0);
    }

    #[tokio::test]
    async fn collapsed_reward_with_enough_samples_rolls_back() {
        let repo = Arc::new(InMemoryFeedbackRepository::default());
        let store = FeedbackStore::new(repo);
        let tenant_id = TenantId(Uuid::new_v4());

        for _ in 0..10 {
            store.submit(DetectionFeedback::new(tenant_id, "off_hours", FeedbackLabel::FalsePositive)).await.unwrap();
        }

        let rl = RlThresholdService::new(FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default())), 30);
        let monitor = RollbackMonitor::new(store);
        let decision = monitor.check(&rl, tenant_id, "off_hours").await.unwrap();
        assert!(decision.rolled_back);
        assert!(decision.reward < REWARD_THRESHOLD);
    }
}
