use crate::types::{ActivityPattern, DetectorThresholds, Evidence, PatternMetadata, PatternType};
use chrono::Utc;
use shadowai_connectors::types::PlatformEvent;
use std::collections::HashMap;
use uuid::Uuid;

/// Computes inter-arrival times per actor and flags a low
/// coefficient-of-variation (regular, scheduled/throttled behavior) as a
/// `regular_interval` pattern.
pub fn detect(events: &[PlatformEvent], thresholds: &DetectorThresholds) -> Vec<ActivityPattern> {
    let mut by_actor: HashMap<&str, Vec<&PlatformEvent>> = HashMap::new();
    for event in events {
        by_actor.entry(event.user_id.as_str()).or_default().push(event);
    }

    let mut patterns = Vec::new();
    for (actor, mut actor_events) in by_actor {
        actor_events.sort_by_key(|e| e.timestamp);
        if actor_events.len() < 4 {
            continue;
        }

        let intervals: Vec<f64> = actor_events
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0)
            .filter(|secs| *secs > 0.0)
            .collect();
        if intervals.len() < 3 {
            continue;
        }

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance = intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        let std_dev = variance.sqrt();
        let cov = if mean > 0.0 { std_dev / mean } else { 0.0 };

        if cov < thresholds.timing_variance_cov_threshold {
            let confidence = ((1.0 - cov / thresholds.timing_variance_cov_threshold) * 100.0).clamp(0.0, 100.0);

            let mut data_points = std::collections::HashMap::new();
            data_points.insert("coefficient_of_variation".to_string(), serde_json::json!(cov));
            data_points.insert("mean_interval_secs".to_string(), serde_json::json!(mean));

            let last = actor_events.last().unwrap();
            patterns.push(ActivityPattern {
                pattern_id: Uuid::new_v4(),
                pattern_type: PatternType::RegularInterval,
                detected_at: Utc::now(),
                confidence,
                metadata: PatternMetadata {
                    actor: actor.to_string(),
                    resource_type: last.resource_type.clone(),
                    action_type: Some(last.action_details.action.clone()),
                    timestamp: last.timestamp,
                },
                evidence: Evidence {
                    description: format!(
                        "actor {actor} has a coefficient of variation of {cov:.3}, below the {:.2} scheduled-behavior threshold",
                        thresholds.timing_variance_cov_threshold
                    ),
                    data_points,
                    supporting_events: actor_events.iter().map(|e| e.event_id.clone()).collect(),
                },
            });
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};

    fn event(offset_secs: i64) -> PlatformEvent {
        PlatformEvent {
            event_id: format!("e-{offset_secs}"),
            platform: Platform::Slack,
            timestamp: Utc::now() + chrono::Duration::seconds(offset_secs),
            user_id: "bot1".to_string(),
            user_email: None,
            event_type: "message".to_string(),
            resource_id: None,
            resource_type: None,
            action_details: ActionDetails {
                action: "post".to_string(),
                resource_name: None,
                additional_metadata: Default::default(),
            },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn perfectly_regular_intervals_trigger_high_confidence() {
        let events: Vec<PlatformEvent> = (0..10).map(|i| event(i * 60)).collect();
        let patterns = detect(&events, &DetectorThresholds::default());
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].confidence > 90.0);
    }

    #[test]
    fn irregular_intervals_do_not_trigger() {
        let offsets = [0, 5, 47, 52, 310, 900, 905];
        let events: Vec<PlatformEvent> = offsets.iter().map(|o| event(*o)).collect();
        assert!(detect(&events, &DetectorThresholds::default()).is_empty());
    }
}
