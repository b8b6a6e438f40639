//! Filter helpers for Qdrant search queries.

use serde_json::{Value, json};

use super::types::SearchFilterArgs;

/// Compose the Qdrant filter payload from optional search arguments.
///
/// Priority participates as a `gte` range; everything else is a match
/// condition. Returns `None` when no constraint applies.
pub fn build_search_filter(args: &SearchFilterArgs) -> Option<Value> {
    let mut must: Vec<Value> = Vec::new();

    if let Some(min_priority) = args.min_priority {
        must.push(json!({
            "key": "priority",
            "range": { "gte": min_priority }
        }));
    }

    if let Some(subjects) = args.subjects.as_ref() {
        let cleaned = cleaned_values(subjects);
        if !cleaned.is_empty() {
            must.push(json!({
                "key": "subjects",
                "match": { "any": cleaned }
            }));
        }
    }

    if let Some(services) = args.services.as_ref() {
        let cleaned = cleaned_values(services);
        if !cleaned.is_empty() {
            must.push(json!({
                "key": "services",
                "match": { "any": cleaned }
            }));
        }
    }

    if let Some(content_type) = args.content_type.as_ref().and_then(|value| non_empty(value)) {
        must.push(json!({
            "key": "content_type",
            "match": { "value": content_type }
        }));
    }

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn cleaned_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter_map(|value| non_empty(value).map(str::to_string))
        .collect()
}

fn non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_threshold_becomes_gte_range() {
        let filter = build_search_filter(&SearchFilterArgs {
            min_priority: Some(0.3),
            ..Default::default()
        })
        .expect("filter");

        assert_eq!(
            filter,
            json!({
                "must": [
                    {
                        "key": "priority",
                        "range": { "gte": 0.3 }
                    }
                ]
            })
        );
    }

    #[test]
    fn subjects_and_content_type_combine() {
        let filter = build_search_filter(&SearchFilterArgs {
            subjects: Some(vec!["Case Studies".into(), " ".into()]),
            content_type: Some("project".into()),
            ..Default::default()
        })
        .expect("filter");

        assert_eq!(
            filter,
            json!({
                "must": [
                    {
                        "key": "subjects",
                        "match": { "any": ["Case Studies"] }
                    },
                    {
                        "key": "content_type",
                        "match": { "value": "project" }
                    }
                ]
            })
        );
    }

    #[test]
    fn empty_args_build_no_filter() {
        assert!(build_search_filter(&SearchFilterArgs::default()).is_none());
        assert!(
            build_search_filter(&SearchFilterArgs {
                subjects: Some(vec!["  ".into()]),
                ..Default::default()
            })
            .is_none()
        );
    }
}
