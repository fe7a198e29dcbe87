use crate::types::{ActivityPattern, DetectorThresholds, Evidence, PatternMetadata, PatternType};
use chrono::Utc;
use shadowai_connectors::types::PlatformEvent;
use std::collections::HashMap;
use uuid::Uuid;

/// Groups events per-actor, computes the highest events/sec rate over a
/// sliding 10-event window, and flags actors whose rate exceeds
/// `velocity_events_per_second`.
pub fn detect(events: &[PlatformEvent], thresholds: &DetectorThresholds) -> Vec<ActivityPattern> {
    const WINDOW: usize = 10;
    let mut by_actor: HashMap<&str, Vec<&PlatformEvent>> = HashMap::new();
    for event in events {
        by_actor.entry(event.user_id.as_str()).or_default().push(event);
    }

    let mut patterns = Vec::new();
    for (actor, mut actor_events) in by_actor {
        actor_events.sort_by_key(|e| e.timestamp);
        if actor_events.len() < 2 {
            continue;
        }

        let mut best_rate = 0.0_f64;
        let mut best_window: Option<(&PlatformEvent, &PlatformEvent, usize)> = None;

        for window in actor_events.windows(WINDOW.min(actor_events.len()).max(2)) {
            let first = window.first().unwrap();
            let last = window.last().unwrap();
            let duration_secs = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
            if duration_secs <= 0.0 {
                continue;
            }
            let rate = (window.len() - 1) as f64 / duration_secs;
            if rate > best_rate {
                best_rate = rate;
                best_window = Some((first, last, window.len()));
            }
        }

        if best_rate > thresholds.velocity_events_per_second {
            let (first, last, count) = best_window.unwrap();
            let ratio = best_rate / thresholds.velocity_events_per_second;
            let confidence = (50.0 + (ratio - 1.0) * 50.0).min(100.0).max(0.0);

            let mut data_points = std::collections::HashMap::new();
            data_points.insert("events_per_second".to_string(), serde_json::json!(best_rate));
            data_points.insert("threshold".to_string(), serde_json::json!(thresholds.velocity_events_per_second));
            data_points.insert("window_size".to_string(), serde_json::json!(count));

            patterns.push(ActivityPattern {
                pattern_id: Uuid::new_v4(),
                pattern_type: PatternType::Velocity,
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
                        "actor {actor} produced {best_rate:.2} events/sec, exceeding threshold {:.2}",
                        thresholds.velocity_events_per_second
                    ),
                    data_points,
                    supporting_events: vec![first.event_id.clone(), last.event_id.clone()],
                },
            });
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};

    fn event(user: &str, offset_ms: i64) -> PlatformEvent {
        PlatformEvent {
            event_id: format!("e-{offset_ms}"),
            platform: Platform::Slack,
            timestamp: Utc::now() + Duration::milliseconds(offset_ms),
            user_id: user.to_string(),
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
        }
    }

    #[test]
    fn thirty_events_at_100ms_triggers_high_confidence_velocity() {
        let events: Vec<PlatformEvent> = (0..30).map(|i| event("u1", i * 100)).collect();
        let patterns = detect(&events, &DetectorThresholds::default());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::Velocity);
        assert!(patterns[0].confidence >= 75.0, "confidence was {}", patterns[0].confidence);
    }

    #[test]
    fn sparse_events_do_not_trigger() {
        let events: Vec<PlatformEvent> = (0..5).map(|i| event("u1", i * 60_000)).collect();
        assert!(detect(&events, &DetectorThresholds::default()).is_empty());
    }
}
