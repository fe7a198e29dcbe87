use crate::types::{ActivityPattern, Evidence, PatternMetadata, PatternType};
use chrono::Utc;
use shadowai_connectors::types::PlatformEvent;
use std::collections::HashSet;
use uuid::Uuid;

const PERMISSION_EVENT_TYPES: &[&str] = &["permission_change", "scope_grant", "role_change"];

fn scopes_of(event: &PlatformEvent, key: &str) -> HashSet<String> {
    event
        .action_details
        .additional_metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Detects increases in granted scopes or role elevations in the trailing
/// window; emits one pattern per escalation with severity scaled by the
/// size of the delta.
pub fn detect(events: &[PlatformEvent]) -> Vec<ActivityPattern> {
    let mut patterns = Vec::new();

    for event in events {
        if !PERMISSION_EVENT_TYPES.contains(&event.event_type.as_str()) {
            continue;
        }

        let before = scopes_of(event, "scopes_before");
        let after = scopes_of(event, "scopes_after");
        let added: Vec<&String> = after.difference(&before).collect();
        if added.is_empty() {
            continue;
        }

        let confidence = (30.0 + 20.0 * added.len() as f64).clamp(0.0, 100.0);
        let mut data_points = std::collections::HashMap::new();
        data_points.insert("scopes_added".to_string(), serde_json::json!(added));
        data_points.insert("scopes_before_count".to_string(), serde_json::json!(before.len()));
        data_points.insert("scopes_after_count".to_string(), serde_json::json!(after.len()));

        patterns.push(ActivityPattern {
            pattern_id: Uuid::new_v4(),
            pattern_type: PatternType::PermissionChange,
            detected_at: Utc::now(),
            confidence,
            metadata: PatternMetadata {
                actor: event.user_id.clone(),
                resource_type: event.resource_type.clone(),
                action_type: Some(event.action_details.action.clone()),
                timestamp: event.timestamp,
            },
            evidence: Evidence {
                description: format!(
                    "actor {} gained {} new scope(s): {}",
                    event.user_id,
                    added.len(),
                    added.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
                data_points,
                supporting_events: vec![event.event_id.clone()],
            },
        });
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};
    use std::collections::HashMap;

    fn escalation_event() -> PlatformEvent {
        let mut metadata = HashMap::new();
        metadata.insert("scopes_before".to_string(), serde_json::json!(["drive.readonly"]));
        metadata.insert(
            "scopes_after".to_string(),
            serde_json::json!(["drive.readonly", "drive.write", "admin.directory"]),
        );

        PlatformEvent {
            event_id: "e1".to_string(),
            platform: Platform::Google,
            timestamp: Utc::now(),
            user_id: "svc-account".to_string(),
            user_email: None,
            event_type: "permission_change".to_string(),
            resource_id: None,
            resource_type: None,
            action_details: ActionDetails {
                action: "authorize".to_string(),
                resource_name: None,
                additional_metadata: metadata,
            },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn flags_new_scopes_with_severity_from_delta() {
        let patterns = detect(&[escalation_event()]);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::PermissionChange);
        assert!(patterns[0].confidence >= 60.0);
    }

    #[test]
    fn no_change_does_not_trigger() {
        let mut event = escalation_event();
        event
            .action_details
            .additional_metadata
            .insert("scopes_after".to_string(), serde_json::json!(["drive.readonly"]));
        assert!(detect(&[event]).is_empty());
    }
}
