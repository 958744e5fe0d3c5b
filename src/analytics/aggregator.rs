//! Reads the JSONL logs and computes dashboard aggregates.
//!
//! Every report takes an optional trailing-days window. Filtering compares
//! timestamp strings lexicographically, which works because the logger
//! writes fixed-width RFC 3339 UTC timestamps.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::analytics::round_to;
use crate::classify::HUMAN_REVIEW_CONFIDENCE_THRESHOLD;

const CLASSIFICATIONS_LOG: &str = "classifications.jsonl";
const CORRECTIONS_LOG: &str = "corrections.jsonl";
const API_USAGE_LOG: &str = "api_usage.jsonl";

/// Read-only view over the analytics logs.
pub struct Aggregator {
    log_dir: PathBuf,
}

impl Aggregator {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    fn read_log(&self, file: &str, days: Option<u32>) -> Vec<Value> {
        let path = self.log_dir.join(file);
        let Ok(content) = fs::read_to_string(&path) else {
            return Vec::new();
        };

        let cutoff = days.map(|d| {
            (Utc::now() - chrono::Duration::days(i64::from(d)))
                .to_rfc3339_opts(SecondsFormat::Micros, true)
        });

        content
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                let entry: Value = serde_json::from_str(line).ok()?;
                if let Some(cutoff) = &cutoff {
                    let ts = entry.get("timestamp").and_then(Value::as_str).unwrap_or("");
                    if ts < cutoff.as_str() {
                        return None;
                    }
                }
                Some(entry)
            })
            .collect()
    }

    // ── Reports ─────────────────────────────────────────────────────

    /// High-level metrics for dashboard header cards.
    pub fn summary(&self, days: Option<u32>) -> Value {
        let classifications = self.read_log(CLASSIFICATIONS_LOG, days);
        let corrections = self.read_log(CORRECTIONS_LOG, days);

        let total = classifications.len();
        let errors = classifications.iter().filter(|c| has_error(c)).count();

        let confidences: Vec<f64> = classifications
            .iter()
            .filter_map(|c| f64_field(c, "confidence"))
            .collect();
        let times: Vec<f64> = classifications
            .iter()
            .filter_map(|c| f64_field(c, "processing_time_seconds"))
            .collect();

        let total_corrections = corrections.len();
        let misclass = corrections
            .iter()
            .filter(|c| bool_field(c, "is_misclassification"))
            .count();

        // Accuracy only exists once CSRs have reviewed something.
        let accuracy = (total_corrections > 0).then(|| {
            round_to(
                (total_corrections - misclass) as f64 / total_corrections as f64 * 100.0,
                1,
            )
        });

        json!({
            "total_classifications": total,
            "successful_classifications": total - errors,
            "accuracy_rate": accuracy,
            "avg_confidence": mean(&confidences).map(|v| round_to(v, 3)),
            "avg_processing_time_seconds": mean(&times).map(|v| round_to(v, 2)),
            "total_corrections": total_corrections,
            "total_misclassifications": misclass,
            "error_rate": percentage(errors, total),
        })
    }

    /// Intent distribution, confidence stats, volume over time.
    pub fn classification_analytics(&self, days: Option<u32>) -> Value {
        let entries = self.read_log(CLASSIFICATIONS_LOG, days);
        let successful: Vec<&Value> = entries.iter().filter(|e| !has_error(e)).collect();
        let total = successful.len();

        let mut intent_counts: BTreeMap<String, usize> = BTreeMap::new();
        for e in &successful {
            *intent_counts
                .entry(str_field(e, "intent").unwrap_or("unknown").to_string())
                .or_default() += 1;
        }
        let mut intent_distribution: Vec<Value> = intent_counts
            .iter()
            .map(|(intent, count)| {
                json!({
                    "intent": intent,
                    "count": count,
                    "percentage": percentage(*count, total),
                })
            })
            .collect();
        intent_distribution.sort_by_key(|v| std::cmp::Reverse(v["count"].as_u64()));

        let mut conf_by_intent: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for e in &successful {
            if let Some(confidence) = f64_field(e, "confidence") {
                conf_by_intent
                    .entry(str_field(e, "intent").unwrap_or("unknown").to_string())
                    .or_default()
                    .push(confidence);
            }
        }
        let confidence_by_intent: Vec<Value> = conf_by_intent
            .iter()
            .map(|(intent, confs)| {
                let min = confs.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = confs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                json!({
                    "intent": intent,
                    "avg_confidence": round_to(confs.iter().sum::<f64>() / confs.len() as f64, 3),
                    "min": round_to(min, 3),
                    "max": round_to(max, 3),
                    "count": confs.len(),
                })
            })
            .collect();

        let mut daily: BTreeMap<String, usize> = BTreeMap::new();
        for e in &successful {
            let date = day_of(e);
            if !date.is_empty() {
                *daily.entry(date).or_default() += 1;
            }
        }
        let volume_over_time: Vec<Value> = daily
            .iter()
            .map(|(date, count)| json!({"date": date, "count": count}))
            .collect();

        let low_confidence_count = successful
            .iter()
            .filter(|e| {
                f64_field(e, "confidence")
                    .is_some_and(|c| c < HUMAN_REVIEW_CONFIDENCE_THRESHOLD)
            })
            .count();

        json!({
            "intent_distribution": intent_distribution,
            "confidence_by_intent": confidence_by_intent,
            "volume_over_time": volume_over_time,
            "complexity_distribution": count_values(&successful, "complexity"),
            "urgency_distribution": count_values(&successful, "urgency"),
            "language_distribution": count_values(&successful, "language"),
            "low_confidence_count": low_confidence_count,
        })
    }

    /// Confusion matrix, ranked confusion pairs, weekly accuracy.
    pub fn correction_analytics(&self, days: Option<u32>) -> Value {
        let entries = self.read_log(CORRECTIONS_LOG, days);
        let misclassifications: Vec<&Value> = entries
            .iter()
            .filter(|e| bool_field(e, "is_misclassification"))
            .collect();

        let mut matrix: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        let mut pair_counts: BTreeMap<(String, String), usize> = BTreeMap::new();
        for e in &misclassifications {
            let original = str_field(e, "original_intent").unwrap_or("unknown").to_string();
            let corrected = str_field(e, "corrected_intent").unwrap_or("unknown").to_string();
            *matrix
                .entry(original.clone())
                .or_default()
                .entry(corrected.clone())
                .or_default() += 1;
            *pair_counts.entry((original, corrected)).or_default() += 1;
        }

        let confusion_matrix: Value = matrix
            .iter()
            .map(|(original, row)| {
                let row: Value = row
                    .iter()
                    .map(|(corrected, count)| (corrected.clone(), json!(count)))
                    .collect::<serde_json::Map<_, _>>()
                    .into();
                (original.clone(), row)
            })
            .collect::<serde_json::Map<_, _>>()
            .into();

        let mut confusion_pairs: Vec<Value> = pair_counts
            .iter()
            .map(|((original, corrected), count)| {
                json!({"original": original, "corrected": corrected, "count": count})
            })
            .collect();
        confusion_pairs.sort_by_key(|v| std::cmp::Reverse(v["count"].as_u64()));

        let mut weekly: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for e in &entries {
            let Some(ts) = str_field(e, "timestamp") else {
                continue;
            };
            let Ok(dt) = DateTime::parse_from_rfc3339(ts) else {
                continue;
            };
            let week = dt.format("%Y-W%W").to_string();
            let slot = weekly.entry(week).or_default();
            slot.0 += 1;
            if !bool_field(e, "is_misclassification") {
                slot.1 += 1;
            }
        }
        let accuracy_over_time: Vec<Value> = weekly
            .iter()
            .map(|(week, (total, correct))| {
                json!({
                    "week": week,
                    "total": total,
                    "correct": correct,
                    "accuracy": percentage(*correct, *total),
                })
            })
            .collect();

        let accuracy_rate = (!entries.is_empty()).then(|| {
            round_to(
                (entries.len() - misclassifications.len()) as f64 / entries.len() as f64 * 100.0,
                1,
            )
        });

        json!({
            "total_corrections": entries.len(),
            "misclassifications": misclassifications.len(),
            "accuracy_rate": accuracy_rate,
            "confusion_matrix": confusion_matrix,
            "confusion_pairs": confusion_pairs,
            "accuracy_over_time": accuracy_over_time,
        })
    }

    /// Processing time percentiles, error rates, tagging success.
    pub fn performance_analytics(&self, days: Option<u32>) -> Value {
        let entries = self.read_log(CLASSIFICATIONS_LOG, days);
        let total = entries.len();

        let mut times: Vec<f64> = entries
            .iter()
            .filter_map(|e| f64_field(e, "processing_time_seconds"))
            .collect();
        times.sort_by(|a, b| a.total_cmp(b));

        let errors: Vec<&Value> = entries.iter().filter(|e| has_error(e)).collect();
        let tagging_ok = entries
            .iter()
            .filter(|e| bool_field(e, "tagging_success"))
            .count();

        let mut error_types: BTreeMap<&'static str, usize> = BTreeMap::new();
        for e in &errors {
            let message = str_field(e, "error").unwrap_or("").to_lowercase();
            let bucket = if message.contains("rate limit") || message.contains("429") {
                "Rate limit (429)"
            } else if message.contains("timeout") {
                "Timeout"
            } else if message.contains("desk") {
                "Desk API error"
            } else {
                "Other"
            };
            *error_types.entry(bucket).or_default() += 1;
        }
        let mut errors_by_type: Vec<Value> = error_types
            .iter()
            .map(|(error, count)| json!({"error": error, "count": count}))
            .collect();
        errors_by_type.sort_by_key(|v| std::cmp::Reverse(v["count"].as_u64()));

        json!({
            "processing_time": {
                "avg_seconds": mean(&times).map(|v| round_to(v, 2)),
                "p50_seconds": percentile(&times, 50),
                "p95_seconds": percentile(&times, 95),
                "p99_seconds": percentile(&times, 99),
                "max_seconds": times.last().map(|v| round_to(*v, 2)),
            },
            "total_processed": total,
            "total_errors": errors.len(),
            "error_rate": percentage(errors.len(), total),
            "tagging_success_rate": percentage(tagging_ok, total),
            "errors_by_type": errors_by_type,
        })
    }

    /// Entity extraction rates by field and by intent.
    pub fn entity_analytics(&self, days: Option<u32>) -> Value {
        const ENTITY_FIELDS: [&str; 4] =
            ["license_plate", "move_out_date", "property_name", "amount"];

        let entries = self.read_log(CLASSIFICATIONS_LOG, days);
        let successful: Vec<&Value> = entries
            .iter()
            .filter(|e| !has_error(e) && has_entities(e))
            .collect();
        let total = successful.len();

        let mut extraction_rates = serde_json::Map::new();
        for field in ENTITY_FIELDS {
            let found = successful
                .iter()
                .filter(|e| entity_present(e, field))
                .count();
            extraction_rates.insert(
                field.to_string(),
                json!({
                    "found": found,
                    "missing": total - found,
                    "rate": percentage(found, total),
                }),
            );
        }

        let mut by_intent: BTreeMap<String, BTreeMap<&str, (usize, usize)>> = BTreeMap::new();
        for e in &successful {
            let intent = str_field(e, "intent").unwrap_or("unknown").to_string();
            let slots = by_intent.entry(intent).or_default();
            for field in ENTITY_FIELDS {
                let slot = slots.entry(field).or_default();
                slot.1 += 1;
                if entity_present(e, field) {
                    slot.0 += 1;
                }
            }
        }
        let by_intent: Value = by_intent
            .iter()
            .map(|(intent, fields)| {
                let fields: Value = fields
                    .iter()
                    .map(|(field, (found, total))| {
                        (
                            field.to_string(),
                            json!({
                                "found": found,
                                "missing": total - found,
                                "rate": percentage(*found, *total),
                            }),
                        )
                    })
                    .collect::<serde_json::Map<_, _>>()
                    .into();
                (intent.clone(), fields)
            })
            .collect::<serde_json::Map<_, _>>()
            .into();

        json!({
            "extraction_rates": extraction_rates,
            "by_intent": by_intent,
        })
    }

    /// API call counts, token usage, cost tracking.
    pub fn api_usage_analytics(&self, days: Option<u32>) -> Value {
        let entries = self.read_log(API_USAGE_LOG, days);

        let llm_entries: Vec<&Value> = entries
            .iter()
            .filter(|e| str_field(e, "provider").is_some_and(|p| p != "desk"))
            .collect();
        let desk_entries: Vec<&Value> = entries
            .iter()
            .filter(|e| str_field(e, "provider") == Some("desk"))
            .collect();

        let prompt_tokens: u64 = llm_entries
            .iter()
            .filter_map(|e| u64_field(e, "prompt_tokens"))
            .sum();
        let completion_tokens: u64 = llm_entries
            .iter()
            .filter_map(|e| u64_field(e, "completion_tokens"))
            .sum();
        let total_tokens: u64 = llm_entries
            .iter()
            .filter_map(|e| u64_field(e, "total_tokens"))
            .sum();
        let total_cost: f64 = llm_entries
            .iter()
            .filter_map(|e| f64_field(e, "estimated_cost_usd"))
            .sum();

        let tickets_with_llm: BTreeSet<&str> = llm_entries
            .iter()
            .filter_map(|e| str_field(e, "ticket_id"))
            .filter(|t| !t.is_empty())
            .collect();
        let avg_cost_per_ticket = if tickets_with_llm.is_empty() {
            0.0
        } else {
            round_to(total_cost / tickets_with_llm.len() as f64, 6)
        };

        let mut daily: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for e in &llm_entries {
            let date = day_of(e);
            if !date.is_empty() {
                let slot = daily.entry(date).or_default();
                slot.0 += f64_field(e, "estimated_cost_usd").unwrap_or(0.0);
                slot.1 += 1;
            }
        }
        let cost_over_time: Vec<Value> = daily
            .iter()
            .map(|(date, (cost, calls))| {
                json!({"date": date, "cost": round_to(*cost, 6), "calls": calls})
            })
            .collect();

        let mut call_type_counts: BTreeMap<String, usize> = BTreeMap::new();
        for e in &entries {
            let label = format!(
                "{}:{}",
                str_field(e, "provider").unwrap_or("unknown"),
                str_field(e, "call_type").unwrap_or("unknown"),
            );
            *call_type_counts.entry(label).or_default() += 1;
        }
        let mut calls_by_type: Vec<Value> = call_type_counts
            .iter()
            .map(|(call_type, count)| json!({"call_type": call_type, "count": count}))
            .collect();
        calls_by_type.sort_by_key(|v| std::cmp::Reverse(v["count"].as_u64()));

        let mut desk_type_counts: BTreeMap<String, usize> = BTreeMap::new();
        for e in &desk_entries {
            *desk_type_counts
                .entry(str_field(e, "call_type").unwrap_or("unknown").to_string())
                .or_default() += 1;
        }
        let mut desk_distribution: Vec<Value> = desk_type_counts
            .iter()
            .map(|(call_type, count)| json!({"call_type": call_type, "count": count}))
            .collect();
        desk_distribution.sort_by_key(|v| std::cmp::Reverse(v["count"].as_u64()));

        let failed = entries
            .iter()
            .filter(|e| !e.get("success").and_then(Value::as_bool).unwrap_or(true))
            .count();

        json!({
            "total_api_calls": entries.len(),
            "total_llm_calls": llm_entries.len(),
            "total_desk_calls": desk_entries.len(),
            "total_cost_usd": round_to(total_cost, 4),
            "avg_cost_per_ticket": avg_cost_per_ticket,
            "token_breakdown": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": completion_tokens,
                "total_tokens": total_tokens,
            },
            "cost_over_time": cost_over_time,
            "calls_by_type": calls_by_type,
            "desk_distribution": desk_distribution,
            "failed_calls": failed,
            "error_rate": percentage(failed, entries.len()),
        })
    }
}

// ── Entry helpers ───────────────────────────────────────────────────

fn str_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

fn f64_field(entry: &Value, key: &str) -> Option<f64> {
    entry.get(key).and_then(Value::as_f64)
}

fn u64_field(entry: &Value, key: &str) -> Option<u64> {
    entry.get(key).and_then(Value::as_u64)
}

fn bool_field(entry: &Value, key: &str) -> bool {
    entry.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn has_error(entry: &Value) -> bool {
    str_field(entry, "error").is_some_and(|e| !e.is_empty())
}

fn has_entities(entry: &Value) -> bool {
    entry
        .get("entities")
        .and_then(Value::as_object)
        .is_some_and(|o| !o.is_empty())
}

fn entity_present(entry: &Value, field: &str) -> bool {
    entry
        .get("entities")
        .and_then(|e| e.get(field))
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Calendar day prefix of the entry's timestamp.
fn day_of(entry: &Value) -> String {
    let ts = str_field(entry, "timestamp").unwrap_or("");
    ts.chars().take(10).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(part as f64 / total as f64 * 100.0, 1)
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[f64], p: usize) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (sorted.len() * p / 100).min(sorted.len() - 1);
    Some(round_to(sorted[idx], 2))
}

/// Count occurrences of a string field across entries.
fn count_values(entries: &[&Value], key: &str) -> Value {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for e in entries {
        if let Some(value) = str_field(e, key) {
            if !value.is_empty() {
                *counts.entry(value.to_string()).or_default() += 1;
            }
        }
    }
    counts
        .into_iter()
        .map(|(k, v)| (k, json!(v)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}
