use crate::types::{ActivityPattern, BusinessHours, DetectorThresholds, Evidence, PatternMetadata, PatternType};
use chrono::Utc;
use shadowai_connectors::types::PlatformEvent;
use std::collections::HashMap;
use uuid::Uuid;

/// Flags actors with `>= off_hours_min_events` events outside business
/// hours in the analysis window; confidence is proportional to the
/// off-hours share of that actor's total events.
pub fn detect(
    events: &[PlatformEvent],
    thresholds: &DetectorThresholds,
    business_hours: &BusinessHours,
) -> Vec<ActivityPattern> {
    let mut totals: HashMap<&str, u32> = HashMap::new();
    let mut off_hours: HashMap<&str, Vec<&PlatformEvent>> = HashMap::new();

    for event in events {
        *totals.entry(event.user_id.as_str()).or_insert(0) += 1;
        if business_hours.is_off_hours(event.timestamp) {
            off_hours.entry(event.user_id.as_str()).or_default().push(event);
        }
    }

    let mut patterns = Vec::new();
    for (actor, actor_events) in off_hours {
        if actor_events.len() as u32 < thresholds.off_hours_min_events {
            continue;
        }
        let total = *totals.get(actor).unwrap_or(&(actor_events.len() as u32));
        let share = actor_events.len() as f64 / total as f64;
        let confidence = (share * 100.0).clamp(0.0, 100.0);

        let mut data_points = std::collections::HashMap::new();
        data_points.insert("off_hours_events".to_string(), serde_json::json!(actor_events.len()));
        data_points.insert("total_events".to_string(), serde_json::json!(total));
        data_points.insert("off_hours_share".to_string(), serde_json::json!(share));

        let last = actor_events.iter().max_by_key(|e| e.timestamp).unwrap();
        patterns.push(ActivityPattern {
            pattern_id: Uuid::new_v4(),
            pattern_type: PatternType::OffHours,
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
                    "actor {actor} generated {} of {} events outside business hours",
                    actor_events.len(),
                    total
                ),
                data_points,
                supporting_events: actor_events.iter().map(|e| e.event_id.clone()).collect(),
            },
        });
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};

    fn event_at(hour: u32) -> PlatformEvent {
        // 2025-01-06 is a Monday
        PlatformEvent {
            event_id: format!("e-{hour}"),
            platform: Platform::Microsoft,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 6, hour, 0, 0).unwrap(),
            user_id: "u1".to_string(),
            user_email: None,
            event_type: "login".to_string(),
            resource_id: None,
            resource_type: None,
            action_details: ActionDetails {
                action: "login".to_string(),
                resource_name: None,
                additional_metadata: Default::default(),
            },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn flags_actor_with_enough_off_hours_events() {
        let events: Vec<PlatformEvent> = vec![event_at(2), event_at(3), event_at(4), event_at(10)];
        let patterns = detect(&events, &DetectorThresholds::default(), &BusinessHours::default());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::OffHours);
    }

    #[test]
    fn below_minimum_does_not_trigger() {
        let events: Vec<PlatformEvent> = vec![event_at(2), event_at(10)];
        assert!(detect(&events, &DetectorThresholds::default(), &BusinessHours::default()).is_empty());
    }
}
