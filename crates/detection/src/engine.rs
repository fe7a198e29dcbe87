use crate::types::{
    detection_pattern_type_for, AiProviderDetection, BusinessHours, DetectionMetadata, DetectionPattern,
    DetectorThresholds, PatternType,
};
use crate::{ai_provider, batch, data_volume, off_hours, permission_escalation, timing_variance, velocity};
use chrono::Utc;
use shadowai_connectors::types::PlatformEvent;
use tracing::warn;

use crate::types::ActivityPattern;

/// Output of one `DetectionEngine::analyze` call.
pub struct DetectionOutput {
    pub patterns: Vec<ActivityPattern>,
    /// The subset of patterns that feed the Risk Assessor's `permissionRisk`
    /// component: permission-escalation observations.
    pub indicators: Vec<ActivityPattern>,
    pub detection_metadata: DetectionMetadata,
}

/// C6 Detection Engine: fans the seven detectors of the Detector Suite
/// (C4) out over one event batch and folds their output into
/// `DetectionMetadata`.
pub struct DetectionEngine;

impl DetectionEngine {
    /// Runs every detector concurrently via `spawn_blocking` (detectors are
    /// pure, CPU-bound, synchronous functions); a detector that panics or
    /// errors contributes an empty result rather than failing the whole
    /// pipeline.
    pub async fn analyze(
        events: Vec<PlatformEvent>,
        business_hours: BusinessHours,
        thresholds: DetectorThresholds,
    ) -> DetectionOutput {
        let (velocity_res, batch_res, off_hours_res, timing_res, permission_res, data_volume_res, ai_res) = tokio::join!(
            run_isolated("velocity", {
                let events = events.clone();
                let thresholds = thresholds.clone();
                move || velocity::detect(&events, &thresholds)
            }),
            run_isolated("batch", {
                let events = events.clone();
                let thresholds = thresholds.clone();
                move || batch::detect(&events, &thresholds)
            }),
            run_isolated("off_hours", {
                let events = events.clone();
                let thresholds = thresholds.clone();
                let business_hours = business_hours.clone();
                move || off_hours::detect(&events, &thresholds, &business_hours)
            }),
            run_isolated("timing_variance", {
                let events = events.clone();
                let thresholds = thresholds.clone();
                move || timing_variance::detect(&events, &thresholds)
            }),
            run_isolated("permission_escalation", {
                let events = events.clone();
                move || permission_escalation::detect(&events)
            }),
            run_isolated("data_volume", {
                let events = events.clone();
                move || data_volume::detect(&events)
            }),
            run_isolated("ai_provider", {
                let events = events.clone();
                move || ai_provider::detect(&events)
            }),
        );

        let mut patterns = Vec::new();
        patterns.extend(velocity_res);
        patterns.extend(batch_res);
        patterns.extend(off_hours_res);
        patterns.extend(timing_res);
        patterns.extend(permission_res.clone());
        patterns.extend(data_volume_res);
        patterns.extend(ai_res);

        let indicators = permission_res;
        let detection_metadata = Self::fold_metadata(&patterns);

        DetectionOutput { patterns, indicators, detection_metadata }
    }

    /// Builds `DetectionMetadata` by picking the single highest-confidence
    /// AI-provider detection (if any) and mapping every pattern into a
    /// `DetectionPattern` via the confidence-to-severity mapping table.
    fn fold_metadata(patterns: &[ActivityPattern]) -> DetectionMetadata {
        let ai_provider = patterns
            .iter()
            .filter(|p| p.pattern_type == PatternType::ApiUsage)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
            .map(|p| AiProviderDetection {
                provider: p
                    .evidence
                    .data_points
                    .get("provider")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                confidence: p.confidence,
                detection_methods: vec!["fingerprint_match".to_string()],
                evidence: p.evidence.description.clone(),
                model: None,
                detected_at: p.detected_at,
            });

        let detection_patterns = patterns
            .iter()
            .map(|pattern| DetectionPattern {
                pattern_type: detection_pattern_type_for(pattern.pattern_type).to_string(),
                confidence: pattern.confidence,
                severity: pattern.severity(),
                evidence: pattern.evidence.clone(),
                detected_at: pattern.detected_at,
                metadata: pattern.metadata.clone(),
            })
            .collect();

        DetectionMetadata {
            ai_provider,
            detection_patterns,
            last_updated: Utc::now(),
        }
    }
}

async fn run_isolated<F>(name: &'static str, f: F) -> Vec<ActivityPattern>
where
    F: FnOnce() -> Vec<ActivityPattern> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(patterns) => patterns,
        Err(error) => {
            warn!(detector = name, %error, "detector panicked, returning empty result");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};

    fn velocity_events() -> Vec<PlatformEvent> {
        (0..30)
            .map(|i| PlatformEvent {
                event_id: format!("e-{i}"),
                platform: Platform::Slack,
                timestamp: Utc::now() + chrono::Duration::milliseconds(i * 100),
                user_id: "u1".to_string(),
                user_email: None,
                event_type: "file_create".to_string(),
                resource_id: Some("r".to_string()),
                resource_type: Some("file".to_string()),
                action_details: ActionDetails {
                    action: "create".to_string(),
                    resource_name: None,
                    additional_metadata: Default::default(),
                },
                ip_address: None,
                correlation_metadata: CorrelationMetadata::default(),
            })
            .collect()
    }

    #[tokio::test]
    async fn analyze_maps_velocity_pattern_to_high_severity_detection_pattern() {
        let output = DetectionEngine::analyze(
            velocity_events(),
            BusinessHours::default(),
            DetectorThresholds::default(),
        )
        .await;

        assert!(!output.patterns.is_empty());
        let mapped = output
            .detection_metadata
            .detection_patterns
            .iter()
            .find(|p| p.pattern_type == "velocity")
            .expect("velocity pattern should be mapped");
        assert_eq!(mapped.severity, crate::types::Severity::High);
    }

    #[tokio::test]
    async fn analyze_on_empty_events_yields_empty_output() {
        let output = DetectionEngine::analyze(Vec::new(), BusinessHours::default(), DetectorThresholds::default()).await;
        assert!(output.patterns.is_empty());
        assert!(output.detection_metadata.ai_provider.is_none());
    }
}
