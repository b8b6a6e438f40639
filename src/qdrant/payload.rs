//! Payload flattening and deterministic point identifiers.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::documents::types::Chunk;

/// Derive the Qdrant point id for a chunk.
///
/// Qdrant point ids must be UUIDs or integers, so the chunk id hash is folded
/// into a UUID. Deterministic: re-ingesting the same chunk overwrites its
/// prior vector in place.
pub fn point_id_for_chunk(chunk_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Flatten a chunk into an index-compatible payload.
///
/// Only scalars and arrays of primitives are emitted, never nested objects.
/// Absent optional fields are omitted rather than stored as nulls; the
/// slot-aligned media arrays keep their nulls so positions stay addressable.
pub fn flatten_chunk(chunk: &Chunk, stored_priority: f32) -> Map<String, Value> {
    let mut payload = Map::new();

    payload.insert("chunk_id".into(), Value::String(chunk.chunk_id.clone()));
    payload.insert("text".into(), Value::String(chunk.content.clone()));
    payload.insert(
        "source".into(),
        Value::String(chunk.metadata.source.clone()),
    );
    payload.insert("priority".into(), Value::from(stored_priority));
    payload.insert(
        "chunk_number".into(),
        Value::from(chunk.metadata.chunk_number),
    );
    payload.insert("word_count".into(), Value::from(chunk.metadata.word_count));

    insert_string_array(&mut payload, "subjects", &chunk.subjects);
    insert_string_array(&mut payload, "headings", &chunk.headings);
    insert_string_array(&mut payload, "services", &chunk.services);
    insert_string_array(&mut payload, "categories", &chunk.categories);
    insert_string_array(&mut payload, "related_chunks", &chunk.metadata.related_chunks);
    insert_string_array(&mut payload, "reference_urls", &chunk.metadata.reference_urls);
    insert_string_array(
        &mut payload,
        "reference_descriptions",
        &chunk.metadata.reference_descriptions,
    );

    insert_optional_string(&mut payload, "client_name", chunk.client_name.as_deref());
    insert_optional_string(&mut payload, "project_id", chunk.project_id.as_deref());
    insert_optional_string(&mut payload, "client_id", chunk.client_id.as_deref());
    insert_optional_string(&mut payload, "question", chunk.metadata.question.as_deref());

    if let Some(content_type) = chunk.content_type {
        payload.insert(
            "content_type".into(),
            serde_json::to_value(content_type).unwrap_or(Value::Null),
        );
    }
    if let Some(page_number) = chunk.metadata.page_number {
        payload.insert("page_number".into(), Value::from(page_number));
    }
    if let Some(page_type) = chunk.metadata.page_type {
        payload.insert(
            "page_type".into(),
            serde_json::to_value(page_type).unwrap_or(Value::Null),
        );
    }

    insert_nullable_array(&mut payload, "media_urls", &chunk.metadata.media_urls);
    insert_nullable_array(&mut payload, "media_types", &chunk.metadata.media_types);
    insert_nullable_array(&mut payload, "media_texts", &chunk.metadata.media_texts);

    payload
}

fn insert_string_array(payload: &mut Map<String, Value>, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    payload.insert(
        key.into(),
        Value::Array(
            values
                .iter()
                .map(|value| Value::String(value.clone()))
                .collect(),
        ),
    );
}

fn insert_nullable_array(payload: &mut Map<String, Value>, key: &str, values: &[Option<String>]) {
    if values.is_empty() {
        return;
    }
    payload.insert(
        key.into(),
        Value::Array(
            values
                .iter()
                .map(|value| match value {
                    Some(text) => Value::String(text.clone()),
                    None => Value::Null,
                })
                .collect(),
        ),
    );
}

fn insert_optional_string(payload: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        payload.insert(key.into(), Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::{ChunkMetadata, ContentType};

    fn sample_chunk() -> Chunk {
        Chunk {
            chunk_id: "abc123".into(),
            content: "Brand systems for telehealth.".into(),
            subjects: vec!["Case Studies".into()],
            headings: vec!["Hims".into(), "Services".into()],
            services: vec!["Brand Identity".into()],
            categories: Vec::new(),
            client_name: Some("Hims".into()),
            project_id: Some("p-hims".into()),
            client_id: None,
            content_type: Some(ContentType::Project),
            metadata: ChunkMetadata {
                source: "hims.md".into(),
                chunk_number: 1,
                char_length: 29,
                word_count: 4,
                priority: 0.7,
                media_urls: vec![Some("https://ex.com/a.png".into())],
                media_types: vec![Some("image".into())],
                media_texts: vec![None],
                ..ChunkMetadata::default()
            },
        }
    }

    #[test]
    fn point_id_is_deterministic_and_uuid_shaped() {
        let a = point_id_for_chunk("abc123");
        let b = point_id_for_chunk("abc123");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, point_id_for_chunk("abc124"));
    }

    #[test]
    fn flattened_payload_has_no_nested_objects() {
        let payload = flatten_chunk(&sample_chunk(), 0.35);
        for (key, value) in &payload {
            match value {
                Value::Object(_) => panic!("nested object under {key}"),
                Value::Array(items) => {
                    assert!(
                        items
                            .iter()
                            .all(|item| !item.is_object() && !item.is_array()),
                        "non-primitive array element under {key}"
                    );
                }
                _ => {}
            }
        }
        assert_eq!(payload["priority"], Value::from(0.35));
        assert_eq!(payload["content_type"], Value::String("project".into()));
        assert_eq!(payload["media_texts"], Value::Array(vec![Value::Null]));
    }

    #[test]
    fn empty_optionals_are_omitted() {
        let mut chunk = sample_chunk();
        chunk.client_name = None;
        chunk.services.clear();
        let payload = flatten_chunk(&chunk, 0.1);
        assert!(!payload.contains_key("client_name"));
        assert!(!payload.contains_key("client_id"));
        assert!(!payload.contains_key("services"));
    }
}
