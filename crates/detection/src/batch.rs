use crate::types::{ActivityPattern, DetectorThresholds, Evidence, PatternMetadata, PatternType};
use chrono::Utc;
use shadowai_connectors::types::PlatformEvent;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Flags >= K identical actions on distinct resources by the same actor
/// within a T-second sliding window.
pub fn detect(events: &[PlatformEvent], thresholds: &DetectorThresholds) -> Vec<ActivityPattern> {
    let mut by_actor_action: HashMap<(&str, &str), Vec<&PlatformEvent>> = HashMap::new();
    for event in events {
        by_actor_action
            .entry((event.user_id.as_str(), event.action_details.action.as_str()))
            .or_default()
            .push(event);
    }

    let window = chrono::Duration::seconds(thresholds.batch_window_secs);
    let mut patterns = Vec::new();

    for ((actor, action), mut group) in by_actor_action {
        group.sort_by_key(|e| e.timestamp);
        let mut start = 0usize;
        for end in 0..group.len() {
            while group[end].timestamp - group[start].timestamp > window {
                start += 1;
            }
            let slice = &group[start..=end];
            let distinct_resources: HashSet<&str> = slice
                .iter()
                .filter_map(|e| e.resource_id.as_deref())
                .collect();

            if distinct_resources.len() as u32 >= thresholds.batch_min_actions {
                let ratio = distinct_resources.len() as f64 / thresholds.batch_min_actions as f64;
                let confidence = (50.0 + (ratio - 1.0) * 40.0).clamp(50.0, 100.0);

                let mut data_points = HashMap::new();
                data_points.insert("distinct_resources".to_string(), serde_json::json!(distinct_resources.len()));
                data_points.insert("action".to_string(), serde_json::json!(action));
                data_points.insert("window_secs".to_string(), serde_json::json!(thresholds.batch_window_secs));

                patterns.push(ActivityPattern {
                    pattern_id: Uuid::new_v4(),
                    pattern_type: PatternType::BatchOperation,
                    detected_at: Utc::now(),
                    confidence,
                    metadata: PatternMetadata {
                        actor: actor.to_string(),
                        resource_type: slice.last().and_then(|e| e.resource_type.clone()),
                        action_type: Some(action.to_string()),
                        timestamp: slice.last().unwrap().timestamp,
                    },
                    evidence: Evidence {
                        description: format!(
                            "actor {actor} performed {action} on {} distinct resources within {}s",
                            distinct_resources.len(),
                            thresholds.batch_window_secs
                        ),
                        data_points,
                        supporting_events: slice.iter().map(|e| e.event_id.clone()).collect(),
                    },
                });
                break; // one pattern per actor/action group is enough signal
            }
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};

    fn event(resource: &str, offset_secs: i64) -> PlatformEvent {
        PlatformEvent {
            event_id: format!("e-{resource}"),
            platform: Platform::Google,
            timestamp: Utc::now() + chrono::Duration::seconds(offset_secs),
            user_id: "u1".to_string(),
            user_email: None,
            event_type: "file_delete".to_string(),
            resource_id: Some(resource.to_string()),
            resource_type: Some("file".to_string()),
            action_details: ActionDetails {
                action: "delete".to_string(),
                resource_name: None,
                additional_metadata: Default::default(),
            },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn flags_batch_delete_across_distinct_resources() {
        let events: Vec<PlatformEvent> = (0..6).map(|i| event(&format!("r{i}"), i)).collect();
        let patterns = detect(&events, &DetectorThresholds::default());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::BatchOperation);
    }

    #[test]
    fn same_resource_repeated_does_not_trigger() {
        let events: Vec<PlatformEvent> = (0..6).map(|i| event("r0", i)).collect();
        assert!(detect(&events, &DetectorThresholds::default()).is_empty());
    }
}
