//! Data-quality pipeline: profile a table, flag anomalies, derive rules from
//! the profile, re-check rows against the rules, and loop back to profiling
//! while too many anomalies remain.
//!
//! Every tool reads rows from `state["data"]`, an array of JSON objects.

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::debug;

use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::state::{State, ToolOutput};
use stepgraph_core::traits::Tool;

type Row = Map<String, Value>;

/// Node id `decide_next_step` jumps to unless `state["loop_node"]` says otherwise.
pub const DEFAULT_LOOP_NODE: &str = "profile";

pub struct ProfileDataTool;
pub struct IdentifyAnomaliesTool;
pub struct GenerateRulesTool;
pub struct ApplyRulesTool;
pub struct DecideNextStepTool;

impl Tool for ProfileDataTool {
    fn name(&self) -> &str {
        "profile_data"
    }

    fn description(&self) -> &str {
        "Compute per-column stats over state.data: min, max, mean, missing_ratio."
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(futures::future::ready(
            profile_data(state).map(ToolOutput::value),
        ))
    }
}

impl Tool for IdentifyAnomaliesTool {
    fn name(&self) -> &str {
        "identify_anomalies"
    }

    fn description(&self) -> &str {
        "Flag missing values and numbers outside the profiled [min, max] range."
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(futures::future::ready(
            identify_anomalies(state).map(ToolOutput::value),
        ))
    }
}

impl Tool for GenerateRulesTool {
    fn name(&self) -> &str {
        "generate_rules"
    }

    fn description(&self) -> &str {
        "Derive range and missing-ratio validation rules from the profile."
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(futures::future::ready(Ok(ToolOutput::value(generate_rules(
            state,
        )))))
    }
}

impl Tool for ApplyRulesTool {
    fn name(&self) -> &str {
        "apply_rules"
    }

    fn description(&self) -> &str {
        "Apply generated rules to every row and recompute anomalies."
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(futures::future::ready(
            apply_rules(state).map(ToolOutput::value),
        ))
    }
}

impl Tool for DecideNextStepTool {
    fn name(&self) -> &str {
        "decide_next_step"
    }

    fn description(&self) -> &str {
        "Loop back to profiling while anomaly_count exceeds anomaly_threshold, else stop."
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(futures::future::ready(Ok(decide_next_step(state))))
    }
}

/// Rows from `state["data"]`. A missing or null key is an empty table.
fn rows<'a>(state: &'a State, tool: &str) -> Result<Vec<&'a Row>> {
    match state.get("data") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_object().ok_or_else(|| FlowError::ToolInput {
                    tool: tool.to_string(),
                    message: format!("data[{}] is not an object", i),
                })
            })
            .collect(),
        Some(_) => Err(FlowError::ToolInput {
            tool: tool.to_string(),
            message: "data must be an array of objects".to_string(),
        }),
    }
}

/// Smallest and largest numeric value, keeping the original JSON numbers.
fn extremes<'a>(values: &[&'a Value]) -> Option<(&'a Value, &'a Value)> {
    let mut iter = values.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min, max), v| {
        let x = v.as_f64().unwrap_or(f64::NAN);
        let min = if x < min.as_f64().unwrap_or(f64::NAN) { v } else { min };
        let max = if x > max.as_f64().unwrap_or(f64::NAN) { v } else { max };
        (min, max)
    }))
}

/// Bound `key` of a constraint or profile, ignoring nulls.
fn bound<'a>(obj: Option<&'a Row>, key: &str) -> Option<&'a Value> {
    obj.and_then(|o| o.get(key)).filter(|v| v.is_number())
}

fn anomaly_report(rows: Vec<usize>, details: Vec<Value>) -> Value {
    json!({
        "count": rows.len(),
        "rows": rows,
        "details": details,
    })
}

pub fn profile_data(state: &State) -> Result<Value> {
    let data = rows(state, "profile_data")?;
    let Some(first) = data.first() else {
        return Ok(json!({"profile": {}, "row_count": 0}));
    };

    let row_count = data.len();
    let mut profile = Map::new();

    for col in first.keys() {
        let values: Vec<Option<&Value>> = data.iter().map(|row| row.get(col)).collect();
        let missing_count = values
            .iter()
            .filter(|v| v.map_or(true, Value::is_null))
            .count();
        let present: Vec<&Value> = values
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_number())
            .collect();

        let mut col_profile = Map::new();
        col_profile.insert("missing_count".into(), json!(missing_count));
        col_profile.insert(
            "missing_ratio".into(),
            json!(missing_count as f64 / row_count as f64),
        );

        if let Some((min, max)) = extremes(&present) {
            let sum: f64 = present.iter().filter_map(|v| v.as_f64()).sum();
            col_profile.insert("min".into(), min.clone());
            col_profile.insert("max".into(), max.clone());
            col_profile.insert("mean".into(), json!(sum / present.len() as f64));
        }

        profile.insert(col.clone(), Value::Object(col_profile));
    }

    debug!(columns = profile.len(), row_count, "Profiled data");
    Ok(json!({"profile": profile, "row_count": row_count}))
}

pub fn identify_anomalies(state: &State) -> Result<Value> {
    let data = rows(state, "identify_anomalies")?;
    let profile = state.get("profile").and_then(Value::as_object);

    let mut anomaly_rows = Vec::new();
    let mut details = Vec::new();

    for (idx, row) in data.iter().enumerate() {
        let mut issues = Map::new();
        for (col, value) in row.iter() {
            if value.is_null() {
                issues.insert(col.clone(), json!("MISSING"));
                continue;
            }
            let Some(x) = value.as_f64() else { continue };

            let col_profile = profile.and_then(|p| p.get(col)).and_then(Value::as_object);
            let min = bound(col_profile, "min");
            let max = bound(col_profile, "max");

            if let Some(min) = min.filter(|m| m.as_f64().is_some_and(|m| x < m)) {
                issues.insert(col.clone(), json!(format!("BELOW_MIN({})", min)));
            } else if let Some(max) = max.filter(|m| m.as_f64().is_some_and(|m| x > m)) {
                issues.insert(col.clone(), json!(format!("ABOVE_MAX({})", max)));
            }
        }

        if !issues.is_empty() {
            anomaly_rows.push(idx);
            details.push(json!({"row_index": idx, "issues": issues}));
        }
    }

    let count = anomaly_rows.len();
    Ok(json!({
        "anomalies": anomaly_report(anomaly_rows, details),
        "anomaly_count": count,
    }))
}

pub fn generate_rules(state: &State) -> Value {
    let mut rules = Vec::new();

    if let Some(profile) = state.get("profile").and_then(Value::as_object) {
        for (col, stats) in profile {
            let stats = stats.as_object();
            let mut constraints = Vec::new();

            if let (Some(min), Some(max)) = (bound(stats, "min"), bound(stats, "max")) {
                constraints.push(json!({"type": "range", "min": min, "max": max}));
            }
            if let Some(ratio) = stats.and_then(|s| s.get("missing_ratio")) {
                constraints.push(json!({"type": "missing_ratio", "max_missing_ratio": ratio}));
            }

            rules.push(json!({"column": col, "constraints": constraints}));
        }
    }

    json!({"rules": rules})
}

pub fn apply_rules(state: &State) -> Result<Value> {
    let data = rows(state, "apply_rules")?;

    let rules_by_col: Map<String, Value> = state
        .get("rules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|r| {
                    let col = r.get("column")?.as_str()?;
                    Some((col.to_string(), r.get("constraints")?.clone()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut anomaly_rows = Vec::new();
    let mut details = Vec::new();

    for (idx, row) in data.iter().enumerate() {
        let mut issues = Map::new();

        for (col, value) in row.iter() {
            let Some(constraints) = rules_by_col.get(col).and_then(Value::as_array) else {
                continue;
            };
            for c in constraints.iter().filter_map(Value::as_object) {
                match c.get("type").and_then(Value::as_str) {
                    Some("range") => {
                        let Some(x) = value.as_f64() else { continue };
                        let below = bound(Some(c), "min")
                            .and_then(Value::as_f64)
                            .is_some_and(|m| x < m);
                        let above = bound(Some(c), "max")
                            .and_then(Value::as_f64)
                            .is_some_and(|m| x > m);
                        if below || above {
                            issues.insert(col.clone(), json!("RANGE_VIOLATION"));
                        }
                    }
                    Some("missing_ratio") if value.is_null() => {
                        issues.insert(col.clone(), json!("MISSING_VALUE"));
                    }
                    _ => {}
                }
            }
        }

        if !issues.is_empty() {
            anomaly_rows.push(idx);
            details.push(json!({"row_index": idx, "issues": issues}));
        }
    }

    let count = anomaly_rows.len();
    Ok(json!({
        "anomalies": anomaly_report(anomaly_rows, details),
        "anomaly_count": count,
        "rules_applied": true,
    }))
}

pub fn decide_next_step(state: &State) -> ToolOutput {
    let count = state.get("anomaly_count").cloned().unwrap_or(json!(0));
    let threshold = state.get("anomaly_threshold").cloned().unwrap_or(json!(0));

    let over = count.as_f64().unwrap_or(0.0) > threshold.as_f64().unwrap_or(0.0);
    if over {
        let target = state.get_str("loop_node").unwrap_or(DEFAULT_LOOP_NODE);
        ToolOutput::none()
            .set(
                "loop_decision",
                json!(format!("Looping again: {} > {}", count, threshold)),
            )
            .goto(target)
    } else {
        ToolOutput::none().set(
            "loop_decision",
            json!(format!("Stopping: {} <= {}", count, threshold)),
        )
    }
}
