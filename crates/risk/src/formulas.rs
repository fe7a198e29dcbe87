use once_cell::sync::Lazy;
use regex::Regex;
use shadowai_detection::{ActivityPattern, PatternType, Severity};

static DATA_ACCESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("(?i)data|volume").expect("data-access regex is valid"));

/// Numeric weight for a detector `Severity`: Low/Medium/High/Critical
/// map onto the same 25/50/75/100 scale confidence is mapped to.
pub fn severity_score(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 25.0,
        Severity::Medium => 50.0,
        Severity::High => 75.0,
        Severity::Critical => 100.0,
    }
}

/// `activityRisk = 0.7·max(pattern.confidence) + 0.3·min(30, 5·patternCount)`.
/// Zero when there are no patterns.
pub fn activity_risk(patterns: &[ActivityPattern]) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    let max_confidence = patterns.iter().map(|p| p.confidence).fold(0.0_f64, f64::max);
    let count_term = (5.0 * patterns.len() as f64).min(30.0);
    0.7 * max_confidence + 0.3 * count_term
}

/// `permissionRisk = avg(indicator.severity)`; default 30 if none.
/// `indicators` is the Detection Engine's permission-escalation subset.
pub fn permission_risk(indicators: &[ActivityPattern]) -> f64 {
    if indicators.is_empty() {
        return 30.0;
    }
    let sum: f64 = indicators.iter().map(|p| severity_score(p.severity())).sum();
    sum / indicators.len() as f64
}

/// `dataAccessRisk = avg(confidence)` over patterns matching
/// `permission_change` or whose description matches `data|volume`;
/// default 30.
pub fn data_access_risk(patterns: &[ActivityPattern]) -> f64 {
    let matching: Vec<&ActivityPattern> = patterns
        .iter()
        .filter(|p| p.pattern_type == PatternType::PermissionChange || DATA_ACCESS_PATTERN.is_match(&p.evidence.description))
        .collect();
    if matching.is_empty() {
        return 30.0;
    }
    let sum: f64 = matching.iter().map(|p| p.confidence).sum();
    sum / matching.len() as f64
}

/// `ownershipRisk`: 50 when the automation's owner is unknown. When known, an
/// individually-attributed owner (an `authorizedBy` email on `OwnerInfo`)
/// lowers risk to 20; a service-account/orphaned owner (no human
/// attribution, non-empty `OwnerInfo`) keeps it elevated at 60. See
/// DESIGN.md for the reasoning behind these defaults.
pub fn ownership_risk(owner_info: &std::collections::HashMap<String, serde_json::Value>) -> f64 {
    if owner_info.is_empty() {
        return 50.0;
    }
    if owner_info.contains_key("authorizedBy") {
        20.0
    } else {
        60.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskComponentScores {
    pub activity: f64,
    pub permission: f64,
    pub data_access: f64,
    pub ownership: f64,
}

/// `overall = round(0.4·activity + 0.2·permission + 0.3·dataAccess +
/// 0.1·ownership)`, capped at 100.
pub fn overall_score(components: RiskComponentScores) -> f64 {
    let raw = 0.4 * components.activity + 0.2 * components.permission + 0.3 * components.data_access
        + 0.1 * components.ownership;
    raw.round().min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shadowai_detection::{Evidence, PatternMetadata};
    use uuid::Uuid;

    fn pattern(pattern_type: PatternType, confidence: f64, description: &str) -> ActivityPattern {
        ActivityPattern {
            pattern_id: Uuid::new_v4(),
            pattern_type,
            detected_at: Utc::now(),
            confidence,
            metadata: PatternMetadata {
                actor: "u1".to_string(),
                resource_type: None,
                action_type: None,
                timestamp: Utc::now(),
            },
            evidence: Evidence {
                description: description.to_string(),
                data_points: Default::default(),
                supporting_events: Vec::new(),
            },
        }
    }

    #[test]
    fn velocity_example_from_spec_yields_activity_risk_at_least_52() {
        let patterns = vec![pattern(PatternType::Velocity, 75.0, "30 events in 3s")];
        assert!(activity_risk(&patterns) >= 52.0);
    }

    #[test]
    fn empty_inputs_use_documented_defaults() {
        assert_eq!(activity_risk(&[]), 0.0);
        assert_eq!(permission_risk(&[]), 30.0);
        assert_eq!(data_access_risk(&[]), 30.0);
    }

    #[test]
    fn data_access_matches_description_regex() {
        let patterns = vec![pattern(PatternType::Velocity, 80.0, "bulk data export detected")];
        assert_eq!(data_access_risk(&patterns), 80.0);
    }

    #[test]
    fn overall_caps_at_100_and_rounds() {
        let components =
            RiskComponentScores { activity: 100.0, permission: 100.0, data_access: 100.0, ownership: 100.0 };
        assert_eq!(overall_score(components), 100.0);
    }

    #[test]
    fn unknown_owner_defaults_to_fifty() {
        assert_eq!(ownership_risk(&Default::default()), 50.0);
    }
}
