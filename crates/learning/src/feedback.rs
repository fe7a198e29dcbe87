//! Append-only analyst feedback on detector output, the
//! input the RL Threshold Service (§4.5) learns from.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shadowai_core::error::Result;
use shadowai_core::types::TenantId;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// An analyst's verdict on one detector firing. `FalseNegative` is
/// reported out-of-band (an automation the analyst believes the
/// detector should have, but did not, flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    TruePositive,
    FalsePositive,
    FalseNegative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFeedback {
    pub feedback_id: Uuid,
    pub tenant_id: TenantId,
    pub automation_id: Option<Uuid>,
    /// Which detector this feedback concerns, e.g. `"velocity"`,
    /// `"batch_operation"` — matches `detection_pattern_type_for`.
    pub detector: String,
    pub label: FeedbackLabel,
    pub submitted_by: Option<Uuid>,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl DetectionFeedback {
    pub fn new(
        tenant_id: TenantId,
        detector: impl Into<String>,
        label: FeedbackLabel,
    ) -> Self {
        Self {
            feedback_id: Uuid::new_v4(),
            tenant_id,
            automation_id: None,
            detector: detector.into(),
            label,
            submitted_by: None,
            notes: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_automation(mut self, automation_id: Uuid) -> Self {
        self.automation_id = Some(automation_id);
        self
    }

    pub fn with_submitter(mut self, user_id: Uuid) -> Self {
        self.submitted_by = Some(user_id);
        self
    }
}

/// Precision/recall/F1 computed from a feedback window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeedbackMetrics {
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
}

impl FeedbackMetrics {
    pub fn total(&self) -> u32 {
        self.true_positives + self.false_positives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positives + self.false_positives;
        if denom == 0 {
            1.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom == 0 {
            1.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn append(&self, feedback: DetectionFeedback) -> Result<()>;
    async fn list_since(
        &self,
        tenant_id: TenantId,
        detector: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DetectionFeedback>>;
}

/// In-memory fake used by the RL service's unit tests.
#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    rows: Mutex<Vec<DetectionFeedback>>,
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn append(&self, feedback: DetectionFeedback) -> Result<()> {
        self.rows.lock().unwrap().push(feedback);
        Ok(())
    }

    async fn list_since(
        &self,
        tenant_id: TenantId,
        detector: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DetectionFeedback>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.tenant_id == tenant_id && f.detector == detector && f.submitted_at >= since)
            .cloned()
            .collect())
    }
}

pub struct PostgresFeedbackRepository {
    db: shadowai_core::database::DatabasePool,
}

impl PostgresFeedbackRepository {
    pub fn new(db: shadowai_core::database::DatabasePool) -> Self {
        Self { db }
    }

    fn label_str(label: FeedbackLabel) -> &'static str {
        match label {
            FeedbackLabel::TruePositive => "true_positive",
            FeedbackLabel::FalsePositive => "false_positive",
            FeedbackLabel::FalseNegative => "false_negative",
        }
    }

    fn label_from_str(s: &str) -> FeedbackLabel {
        match s {
            "false_positive" => FeedbackLabel::FalsePositive,
            "false_negative" => FeedbackLabel::FalseNegative,
            _ => FeedbackLabel::TruePositive,
        }
    }
}

#[async_trait]
impl FeedbackRepository for PostgresFeedbackRepository {
    async fn append(&self, feedback: DetectionFeedback) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO detection_feedback
                (feedback_id, tenant_id, automation_id, detector, label, submitted_by, notes, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(feedback.feedback_id)
        .bind(feedback.tenant_id.0)
        .bind(feedback.automation_id)
        .bind(&feedback.detector)
        .bind(Self::label_str(feedback.label))
        .bind(feedback.submitted_by)
        .bind(&feedback.notes)
        .bind(feedback.submitted_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn list_since(
        &self,
        tenant_id: TenantId,
        detector: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DetectionFeedback>> {
        let rows: Vec<(Uuid, Uuid, Option<Uuid>, String, String, Option<Uuid>, Option<String>, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT feedback_id, tenant_id, automation_id, detector, label, submitted_by, notes, submitted_at
                FROM detection_feedback
                WHERE tenant_id = $1 AND detector = $2 AND submitted_at >= $3
                ORDER BY submitted_at ASC
                "#,
            )
            .bind(tenant_id.0)
            .bind(detector)
            .bind(since)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(feedback_id, tenant_id, automation_id, detector, label, submitted_by, notes, submitted_at)| {
                DetectionFeedback {
                    feedback_id,
                    tenant_id: TenantId(tenant_id),
                    automation_id,
                    detector,
                    label: Self::label_from_str(&label),
                    submitted_by,
                    notes,
                    submitted_at,
                }
            })
            .collect())
    }
}

/// Records feedback and summarizes it into the metrics the RL service
/// reads.
pub struct FeedbackStore {
    repository: std::sync::Arc<dyn FeedbackRepository>,
}

impl FeedbackStore {
    pub fn new(repository: std::sync::Arc<dyn FeedbackRepository>) -> Self {
        Self { repository }
    }

    pub async fn submit(&self, feedback: DetectionFeedback) -> Result<()> {
        self.repository.append(feedback).await
    }

    /// Computes precision/recall/F1 over the trailing `window_days` for
    /// one tenant/detector pair.
    pub async fn metrics_for_window(
        &self,
        tenant_id: TenantId,
        detector: &str,
        window_days: u32,
    ) -> Result<(FeedbackMetrics, u32)> {
        let since = Utc::now() - Duration::days(window_days as i64);
        let rows = self.repository.list_since(tenant_id, detector, since).await?;
        Ok((summarize(&rows), rows.len() as u32))
    }
}

fn summarize(rows: &[DetectionFeedback]) -> FeedbackMetrics {
    let mut counts: HashMap<FeedbackLabel, u32> = HashMap::new();
    for row in rows {
        *counts.entry(row.label).or_insert(0) += 1;
    }
    FeedbackMetrics {
        true_positives: *counts.get(&FeedbackLabel::TruePositive).unwrap_or(&0),
        false_positives: *counts.get(&FeedbackLabel::FalsePositive).unwrap_or(&0),
        false_negatives: *counts.get(&FeedbackLabel::FalseNegative).unwrap_or(&0),
    }
}

impl std::hash::Hash for FeedbackLabel {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u8).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId(Uuid::new_v4())
    }

    #[tokio::test]
    async fn metrics_window_computes_precision_recall_f1() {
        let repo = std::sync::Arc::new(InMemoryFeedbackRepository::default());
        let store = FeedbackStore::new(repo);
        let tenant_id = tenant();

        store.submit(DetectionFeedback::new(tenant_id, "velocity", FeedbackLabel::TruePositive)).await.unwrap();
        store.submit(DetectionFeedback::new(tenant_id, "velocity", FeedbackLabel::TruePositive)).await.unwrap();
        store.submit(DetectionFeedback::new(tenant_id, "velocity", FeedbackLabel::FalsePositive)).await.unwrap();
        store.submit(DetectionFeedback::new(tenant_id, "velocity", FeedbackLabel::FalseNegative)).await.unwrap();

        let (metrics, count) = store.metrics_for_window(tenant_id, "velocity", 30).await.unwrap();
        assert_eq!(count, 4);
        assert!((metrics.precision() - (2.0 / 3.0)).abs() < 1e-9);
        assert!((metrics.recall() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn different_detectors_are_isolated() {
        let repo = std::sync::Arc::new(InMemoryFeedbackRepository::default());
        let store = FeedbackStore::new(repo);
        let tenant_id = tenant();

        store.submit(DetectionFeedback::new(tenant_id, "velocity", FeedbackLabel::TruePositive)).await.unwrap();
        store.submit(DetectionFeedback::new(tenant_id, "batch_operation", FeedbackLabel::FalsePositive)).await.unwrap();

        let (velocity, _) = store.metrics_for_window(tenant_id, "velocity", 30).await.unwrap();
        assert_eq!(velocity.true_positives, 1);
        assert_eq!(velocity.false_positives, 0);
    }
}
