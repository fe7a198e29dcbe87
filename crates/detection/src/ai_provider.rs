use crate::types::{ActivityPattern, Evidence, PatternMetadata, PatternType};
use chrono::Utc;
use shadowai_connectors::fingerprint::match_ai_provider;
use shadowai_connectors::types::PlatformEvent;
use std::collections::HashMap;
use uuid::Uuid;

const FINGERPRINT_FIELDS: &[&str] = &["endpoint", "script_source", "app_display_name", "client_id"];

/// Matches endpoint strings, script-source substrings, and OAuth-app
/// display text against the fingerprint table and emits
/// one `api_usage` pattern per actor, aggregating every matched signature
/// so one automation yields one pattern rather than one per event
///.
pub fn detect(events: &[PlatformEvent]) -> Vec<ActivityPattern> {
    let mut by_actor: HashMap<&str, (Option<&'static str>, Vec<String>, Vec<&PlatformEvent>)> = HashMap::new();

    for event in events {
        let mut texts: Vec<&str> = vec![event.action_details.action.as_str()];
        if let Some(name) = &event.action_details.resource_name {
            texts.push(name.as_str());
        }
        for field in FINGERPRINT_FIELDS {
            if let Some(value) = event.action_details.additional_metadata.get(*field).and_then(|v| v.as_str()) {
                texts.push(value);
            }
        }

        for text in texts {
            if let Some(provider) = match_ai_provider(text) {
                let entry = by_actor.entry(event.user_id.as_str()).or_insert((None, Vec::new(), Vec::new()));
                entry.0 = Some(provider);
                entry.1.push(text.to_string());
                entry.2.push(event);
            }
        }
    }

    let mut patterns = Vec::new();
    for (actor, (provider, signatures, matched_events)) in by_actor {
        let Some(provider) = provider else { continue };
        let unique_signatures: std::collections::HashSet<String> = signatures.into_iter().collect();
        let confidence = (60.0 + 10.0 * unique_signatures.len() as f64).min(100.0);

        let mut data_points = std::collections::HashMap::new();
        data_points.insert("provider".to_string(), serde_json::json!(provider));
        data_points.insert("signatures".to_string(), serde_json::json!(unique_signatures));

        let last = matched_events.iter().max_by_key(|e| e.timestamp).unwrap();
        patterns.push(ActivityPattern {
            pattern_id: Uuid::new_v4(),
            pattern_type: PatternType::ApiUsage,
            detected_at: Utc::now(),
            confidence,
            metadata: PatternMetadata {
                actor: actor.to_string(),
                resource_type: last.resource_type.clone(),
                action_type: Some(last.action_details.action.clone()),
                timestamp: last.timestamp,
            },
            evidence: Evidence {
                description: format!("actor {actor} shows {provider} usage signatures"),
                data_points,
                supporting_events: matched_events.iter().map(|e| e.event_id.clone()).collect(),
            },
        });
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};
    use std::collections::HashMap as StdHashMap;

    fn event_with_endpoint(endpoint: &str) -> PlatformEvent {
        let mut metadata = StdHashMap::new();
        metadata.insert("endpoint".to_string(), serde_json::json!(endpoint));
        PlatformEvent {
            event_id: "e1".to_string(),
            platform: Platform::Slack,
            timestamp: Utc::now(),
            user_id: "bot-x".to_string(),
            user_email: None,
            event_type: "api_call".to_string(),
            resource_id: None,
            resource_type: None,
            action_details: ActionDetails {
                action: "call".to_string(),
                resource_name: None,
                additional_metadata: metadata,
            },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn detects_openai_endpoint() {
        let patterns = detect(&[event_with_endpoint("https://api.openai.com/v1/chat/completions")]);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].evidence.data_points.get("provider").unwrap(), &serde_json::json!("OpenAI / ChatGPT"));
    }

    #[test]
    fn non_ai_endpoint_does_not_trigger() {
        assert!(detect(&[event_with_endpoint("https://internal.example.com/api")]).is_empty());
    }
}
