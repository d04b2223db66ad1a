//! Parsing untrusted model output into domain types.
//!
//! Responses are free-form text; the contract asks for a bare JSON array but
//! models routinely wrap it in markdown fences or preamble. Extraction is
//! tolerant, parsing is strict: anything that does not decode into the
//! expected schema is an error naming the offending element or field, which
//! feeds the corrective retry prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pw_core::{Error, SubTask};

/// Pull the JSON payload out of a response that may wrap it in markdown
/// fences or surrounding prose.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(inner) = fenced(text, "```json").or_else(|| fenced(text, "```")) {
        return inner;
    }
    // No fence: take from the first bracket, models often prepend a sentence.
    match text.find(|c| c == '[' || c == '{') {
        Some(start) => text[start..].trim(),
        None => text.trim(),
    }
}

fn fenced<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let end = text[start..].find("```")? + start;
    Some(text[start..end].trim())
}

/// Decode the planner's reply into candidate subtasks.
///
/// Accepts `[{"title": "..."}]` (the prompted shape) and a bare array of
/// strings. Ids and order indexes are assigned positionally (`task-1`..).
pub fn parse_planned_candidates(text: &str) -> Result<Vec<SubTask>, Error> {
    let payload = extract_json_block(text);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| Error::serialization(format!("expected a JSON array of subtasks: {e}")))?;

    let items = value
        .as_array()
        .ok_or_else(|| Error::serialization("top-level value must be a JSON array"))?;
    if items.is_empty() {
        return Err(Error::serialization("subtask array must not be empty"));
    }

    let mut candidates = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let title = match item {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("title")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::serialization(format!(
                        "element {idx}: missing or non-string field `title`"
                    ))
                })?,
            _ => {
                return Err(Error::serialization(format!(
                    "element {idx}: expected a string or an object with a `title` field"
                )))
            }
        };
        candidates.push(SubTask::candidate(format!("task-{}", idx + 1), title, idx)?);
    }
    Ok(candidates)
}

/// Wire shape for a refined subtask, as prompted to the model.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefinedItem {
    pub id: String,
    pub title: String,
    pub estimated_duration_minutes: i64,
    pub order_index: usize,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Decode the refiner's reply into fully populated subtasks.
///
/// Structural problems (missing fields, wrong types) surface through
/// serde's error, which names the field; value problems (non-positive
/// durations) surface through the SubTask constructor.
pub fn parse_refined_subtasks(text: &str) -> Result<Vec<SubTask>, Error> {
    let payload = extract_json_block(text);
    let items: Vec<RefinedItem> = serde_json::from_str(payload)
        .map_err(|e| Error::serialization(format!("expected an array of refined subtasks: {e}")))?;
    if items.is_empty() {
        return Err(Error::serialization("refined subtask array must not be empty"));
    }

    items
        .into_iter()
        .map(|item| {
            SubTask::new(
                item.id,
                item.title,
                item.estimated_duration_minutes,
                item.order_index,
                item.dependencies,
            )
        })
        .collect()
}

/// The candidate list as JSON for the refiner's prompt: id and title only.
pub(crate) fn candidate_payload(candidates: &[SubTask]) -> String {
    #[derive(Serialize)]
    struct CandidateItem<'a> {
        id: &'a str,
        title: &'a str,
    }

    let items: Vec<CandidateItem> = candidates
        .iter()
        .map(|t| CandidateItem {
            id: &t.id,
            title: &t.title,
        })
        .collect();
    serde_json::to_string_pretty(&items).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_block_variants() {
        assert_eq!(extract_json_block("[1, 2]"), "[1, 2]");
        assert_eq!(extract_json_block("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(extract_json_block("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(
            extract_json_block("Here is the plan:\n[1, 2]"),
            "[1, 2]"
        );
        assert_eq!(
            extract_json_block("Sure!\n```json\n{\"a\": 1}\n```\nDone."),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn test_parse_planned_objects() {
        let tasks = parse_planned_candidates(
            r#"[{"title": "Pick a course"}, {"title": "Enroll"}]"#,
        )
        .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "task-1");
        assert_eq!(tasks[0].title, "Pick a course");
        assert_eq!(tasks[0].order_index, 0);
        assert_eq!(tasks[1].order_index, 1);
        assert!(!tasks[0].is_estimated());
    }

    #[test]
    fn test_parse_planned_bare_strings() {
        let tasks = parse_planned_candidates(r#"["Pick a course", "Enroll"]"#).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].title, "Enroll");
    }

    #[test]
    fn test_parse_planned_failures_name_the_problem() {
        let err = parse_planned_candidates("not json at all").unwrap_err();
        assert!(err.to_string().contains("JSON array"));

        let err = parse_planned_candidates(r#"{"title": "one object"}"#).unwrap_err();
        assert!(err.to_string().contains("array"));

        let err = parse_planned_candidates(r#"[{"name": "wrong field"}]"#).unwrap_err();
        assert!(err.to_string().contains("title"));

        let err = parse_planned_candidates("[]").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_parse_refined_full_items() {
        let tasks = parse_refined_subtasks(
            r#"[
                {"id": "task-1", "title": "Pick a course", "estimated_duration_minutes": 60, "order_index": 0},
                {"id": "task-2", "title": "Enroll", "estimated_duration_minutes": 15, "order_index": 1, "dependencies": ["task-1"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].estimated_minutes, 60);
        assert!(tasks[0].dependencies.is_empty());
        assert_eq!(tasks[1].dependencies, vec!["task-1".to_string()]);
    }

    #[test]
    fn test_parse_refined_missing_field_is_named() {
        let err = parse_refined_subtasks(
            r#"[{"id": "task-1", "title": "Pick a course", "order_index": 0}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("estimated_duration_minutes"));
    }

    #[test]
    fn test_parse_refined_rejects_nonpositive_duration() {
        let err = parse_refined_subtasks(
            r#"[{"id": "task-1", "title": "T", "estimated_duration_minutes": 0, "order_index": 0}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = parse_refined_subtasks(
            r#"[{"id": "task-1", "title": "T", "estimated_duration_minutes": -5, "order_index": 0}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_candidate_payload_shape() {
        let tasks = vec![SubTask::candidate("task-1", "Pick a course", 0).unwrap()];
        let payload = candidate_payload(&tasks);
        assert!(payload.contains("\"id\": \"task-1\""));
        assert!(payload.contains("\"title\": \"Pick a course\""));
        assert!(!payload.contains("estimated"));
    }
}
