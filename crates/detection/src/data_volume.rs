use crate::types::{ActivityPattern, Evidence, PatternMetadata, PatternType};
use chrono::{DateTime, NaiveDate, Utc};
use shadowai_connectors::types::PlatformEvent;
use std::collections::HashMap;
use uuid::Uuid;

const MIB: f64 = 1024.0 * 1024.0;
const WARNING_BYTES: f64 = 100.0 * MIB;
const CRITICAL_BYTES: f64 = 500.0 * MIB;
const MIN_BASELINE_DAYS: usize = 7;
const MULTIPLIER_TRIGGER: f64 = 3.0;
const MIN_FILE_COUNT: u32 = 100;

const DOWNLOAD_EVENT_TYPES: &[&str] = &["file_download", "download", "export"];

/// Default byte estimate per file extension when the event carries no
/// declared size, keyed by lowercase extension.
fn estimate_bytes_by_extension(resource_name: &str) -> f64 {
    let ext = resource_name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "pdf" => 2.0 * MIB,
        "docx" | "doc" => 1.0 * MIB,
        "xlsx" | "xls" | "csv" => 0.5 * MIB,
        "pptx" | "ppt" => 5.0 * MIB,
        "zip" | "tar" | "gz" => 20.0 * MIB,
        "mp4" | "mov" | "avi" => 100.0 * MIB,
        "png" | "jpg" | "jpeg" => 2.0 * MIB,
        _ => 1.0 * MIB,
    }
}

fn event_bytes(event: &PlatformEvent) -> f64 {
    if let Some(declared) = event
        .action_details
        .additional_metadata
        .get("file_size_bytes")
        .and_then(|v| v.as_f64())
    {
        return declared;
    }
    event
        .action_details
        .resource_name
        .as_deref()
        .map(estimate_bytes_by_extension)
        .unwrap_or(1.0 * MIB)
}

fn is_download(event: &PlatformEvent) -> bool {
    DOWNLOAD_EVENT_TYPES.contains(&event.event_type.as_str())
}

struct DayTotal {
    bytes: f64,
    file_count: u32,
    event_ids: Vec<String>,
    last_timestamp: DateTime<Utc>,
    actor: String,
    resource_type: Option<String>,
}

/// Groups download-class events per `(user, UTC-day)`, compares against a
/// per-user baseline (mean bytes/day over days strictly before the
/// evaluated day, when at least `MIN_BASELINE_DAYS` distinct days of
/// history are present), and flags days that trip any of the three rules
///.
pub fn detect(events: &[PlatformEvent]) -> Vec<ActivityPattern> {
    let mut per_user_day: HashMap<(String, NaiveDate), DayTotal> = HashMap::new();

    for event in events {
        if !is_download(event) {
            continue;
        }
        let day = event.timestamp.date_naive();
        let bytes = event_bytes(event);
        let entry = per_user_day.entry((event.user_id.clone(), day)).or_insert_with(|| DayTotal {
            bytes: 0.0,
            file_count: 0,
            event_ids: Vec::new(),
            last_timestamp: event.timestamp,
            actor: event.user_id.clone(),
            resource_type: event.resource_type.clone(),
        });
        entry.bytes += bytes;
        entry.file_count += 1;
        entry.event_ids.push(event.event_id.clone());
        if event.timestamp > entry.last_timestamp {
            entry.last_timestamp = event.timestamp;
        }
    }

    let mut baseline_days_by_user: HashMap<&str, Vec<&NaiveDate>> = HashMap::new();
    for (user, day) in per_user_day.keys() {
        baseline_days_by_user.entry(user.as_str()).or_default().push(day);
    }

    let mut patterns = Vec::new();
    for ((user, day), total) in &per_user_day {
        let history_days: Vec<&NaiveDate> = baseline_days_by_user
            .get(user.as_str())
            .into_iter()
            .flatten()
            .filter(|d| **d < *day)
            .copied()
            .collect();

        let baseline = if history_days.len() >= MIN_BASELINE_DAYS {
            let sum: f64 = history_days
                .iter()
                .map(|d| per_user_day.get(&(user.clone(), **d)).map(|t| t.bytes).unwrap_or(0.0))
                .sum();
            sum / history_days.len() as f64
        } else {
            0.0
        };

        let abs_triggered = total.bytes >= WARNING_BYTES;
        let level = if total.bytes >= CRITICAL_BYTES {
            "critical"
        } else if abs_triggered {
            "warning"
        } else {
            "none"
        };
        let multiplier = if baseline > 0.0 { total.bytes / baseline } else { 0.0 };
        let multiplier_triggered = baseline > 0.0 && multiplier >= MULTIPLIER_TRIGGER;
        let file_count_triggered = total.file_count >= MIN_FILE_COUNT;

        if !abs_triggered && !multiplier_triggered && !file_count_triggered {
            continue;
        }

        let mut confidence = 0.0;
        if abs_triggered {
            confidence += 40.0;
        }
        if multiplier_triggered {
            confidence += 40.0;
        }
        if file_count_triggered {
            confidence += 20.0;
        }
        confidence = confidence.min(100.0);

        let mut data_points = std::collections::HashMap::new();
        data_points.insert("total_bytes".to_string(), serde_json::json!(total.bytes));
        data_points.insert("file_count".to_string(), serde_json::json!(total.file_count));
        data_points.insert("baseline_bytes".to_string(), serde_json::json!(baseline));
        data_points.insert("multiplier".to_string(), serde_json::json!(format!("{multiplier:.2}")));
        data_points.insert("level".to_string(), serde_json::json!(level));
        data_points.insert("day".to_string(), serde_json::json!(day.to_string()));

        patterns.push(ActivityPattern {
            pattern_id: Uuid::new_v4(),
            pattern_type: PatternType::BatchOperation,
            detected_at: Utc::now(),
            confidence,
            metadata: PatternMetadata {
                actor: total.actor.clone(),
                resource_type: total.resource_type.clone(),
                action_type: Some("download".to_string()),
                timestamp: total.last_timestamp,
            },
            evidence: Evidence {
                description: format!(
                    "actor {user} downloaded {:.2} MiB across {} files on {day} ({level})",
                    total.bytes / MIB,
                    total.file_count
                ),
                data_points,
                supporting_events: total.event_ids.clone(),
            },
        });
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata, Platform};
    use std::collections::HashMap as StdHashMap;

    fn download_event(day: u32, index: u32, size_mib: f64) -> PlatformEvent {
        let mut metadata = StdHashMap::new();
        metadata.insert("file_size_bytes".to_string(), serde_json::json!(size_mib * MIB));
        PlatformEvent {
            event_id: format!("e-{day}-{index}"),
            platform: Platform::Google,
            timestamp: Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap() + chrono::Duration::seconds(index as i64),
            user_id: "u1".to_string(),
            user_email: None,
            event_type: "file_download".to_string(),
            resource_id: Some(format!("f{index}")),
            resource_type: Some("file".to_string()),
            action_details: ActionDetails {
                action: "download".to_string(),
                resource_name: Some(format!("report-{index}.pdf")),
                additional_metadata: metadata,
            },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn exfiltration_day_hits_max_confidence_with_baseline() {
        let mut events = Vec::new();
        for day in 1..=7 {
            events.push(download_event(day, 0, 10.0));
        }
        for i in 0..150 {
            events.push(download_event(10, i, 1.0));
        }

        let patterns = detect(&events);
        let flagged = patterns
            .iter()
            .find(|p| p.evidence.data_points.get("day").map(|d| d == "2025-01-10").unwrap_or(false))
            .expect("day 10 should be flagged");
        assert_eq!(flagged.confidence, 100.0);
        assert_eq!(
            flagged.evidence.data_points.get("multiplier").unwrap(),
            &serde_json::json!("15.00")
        );
    }

    #[test]
    fn below_all_thresholds_does_not_trigger() {
        let events = vec![download_event(1, 0, 1.0), download_event(1, 1, 1.0)];
        assert!(detect(&events).is_empty());
    }

    #[test]
    fn insufficient_history_yields_zero_baseline_and_no_multiplier_trigger() {
        let mut events = Vec::new();
        for day in 1..=3 {
            events.push(download_event(day, 0, 1.0));
        }
        for i in 0..10 {
            events.push(download_event(5, i, 10.0));
        }
        let patterns = detect(&events);
        let flagged = patterns
            .iter()
            .find(|p| p.evidence.data_points.get("day").map(|d| d == "2025-01-05").unwrap_or(false))
            .expect("day 5 should be flagged by absolute threshold");
        assert_eq!(flagged.evidence.data_points.get("baseline_bytes").unwrap(), &serde_json::json!(0.0));
    }
}
