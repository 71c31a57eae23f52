//! The context builder (C8): fetches entity data for an editing context
//! and compacts it into a prompt-sized string, per spec.md §4.8's
//! truncation rules. Grounded on `reqwest` as the HTTP client the teacher
//! already depends on for outbound calls, with the compaction helpers
//! written fresh against the named rules (no single teacher file does
//! entity-context compaction).

use serde_json::Value;

const STRING_TRUNCATE_LEN: usize = 200;
const ARRAY_TRUNCATE_LEN: usize = 10;

/// Bookkeeping keys stripped from objects while compacting -- internal to
/// the entity store, never something the agent needs to see or change.
const METADATA_KEYS: &[&str] = &[
    "metadata",
    "_metadata",
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
    "etag",
    "revision",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextVariant {
    Full,
    Minimal,
    NewEntity,
}

pub struct ContextBuilder {
    client: reqwest::Client,
    entity_api_base: String,
}

impl ContextBuilder {
    pub fn new(entity_api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            entity_api_base: entity_api_base.into(),
        }
    }

    /// Fetch `entity_type`/`entity_id` (when present) and render it as a
    /// compacted JSON string appropriate for `variant`.
    pub async fn build(
        &self,
        variant: ContextVariant,
        entity_type: &str,
        entity_id: Option<&str>,
    ) -> crate::error::Result<String> {
        if variant == ContextVariant::NewEntity || entity_id.is_none() {
            return Ok(format!("{{\"entityType\":\"{entity_type}\",\"new\":true}}"));
        }
        let entity_id = entity_id.unwrap();
        let compacted = match variant {
            ContextVariant::Full => self.fetch_entity(entity_type, entity_id).await?,
            ContextVariant::Minimal => compact(&self.fetch_entity(entity_type, entity_id).await?),
            ContextVariant::NewEntity => unreachable!(),
        };
        Ok(compacted.to_string())
    }

    async fn fetch_entity(&self, entity_type: &str, entity_id: &str) -> crate::error::Result<Value> {
        let url = format!("{}/{entity_type}/{entity_id}", self.entity_api_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| crate::error::BridgeError::Transport {
                message: err.to_string(),
            })?;
        response
            .json()
            .await
            .map_err(|err| crate::error::BridgeError::Transport {
                message: err.to_string(),
            })
    }

    /// Build the prefix prepended to the user's message when the UI
    /// indicates they are editing `entity_type`/`entity_id`. When
    /// `entity_id` is `None`, produces the new-entity variant (schema
    /// hints rather than current values). On fetch failure, degrades to
    /// a minimal `{id, type}` block rather than failing the turn -- the
    /// agent still knows what it's editing even if the fetch failed.
    pub async fn build_full_injection(
        &self,
        entity_type: &str,
        entity_id: Option<&str>,
        user_message: &str,
    ) -> String {
        let tools = tool_names_for(entity_type);
        let tool_list = tools.join(", ");

        let Some(entity_id) = entity_id else {
            return format!(
                "# Editing: new {entity_type}\n\n\
                 You are creating a new {entity_type}. Available tools: {tool_list}.\n\
                 Gather the required fields before calling `{entity_type}_create`.\n\n\
                 {user_message}"
            );
        };

        let current_values = match self.fetch_entity(entity_type, entity_id).await {
            Ok(value) => compact(&value).to_string(),
            Err(err) => {
                tracing::warn!(error = %err, entity_type, entity_id, "context fetch failed, degrading to minimal block");
                format!("{{\"id\":\"{entity_id}\",\"type\":\"{entity_type}\"}}")
            }
        };

        format!(
            "# Editing: {entity_type}/{entity_id}\n\n\
             Available tools: {tool_list}.\n\n\
             Current values:\n```json\n{current_values}\n```\n\n\
             - Use `{entity_type}_update` -- the UI will refresh.\n\
             - Only include changed fields.\n\
             - Send full content, not diffs.\n\n\
             {user_message}"
        )
    }

    /// The lightweight prefix used on subsequent turns for an entity
    /// already fully injected -- no I/O.
    pub fn build_minimal_injection(entity_type: &str, entity_id: Option<&str>, user_message: &str) -> String {
        match entity_id {
            Some(id) => format!("[editing: {entity_type}/{id}]\n{user_message}"),
            None => format!("[editing: {entity_type}]\n{user_message}"),
        }
    }
}

/// Static entity-type -> tool-name mapping used in the injected tool
/// list. Follows the `{type}_get`/`{type}_update`/`{type}_create`
/// convention named for `spec` and `document`; unrecognised entity types
/// fall back to the same formula.
fn tool_names_for(entity_type: &str) -> Vec<String> {
    vec![
        format!("{entity_type}_get"),
        format!("{entity_type}_update"),
        format!("{entity_type}_create"),
    ]
}

/// Truncate strings to ~200 chars and arrays to 10 items (appending a
/// `"(N more)"` marker string as the final element), recursively.
pub fn compact(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > STRING_TRUNCATE_LEN => {
            let truncated: String = s.chars().take(STRING_TRUNCATE_LEN).collect();
            Value::String(format!("{truncated}..."))
        }
        Value::Array(items) => {
            if items.len() > ARRAY_TRUNCATE_LEN {
                let mut out: Vec<Value> = items[..ARRAY_TRUNCATE_LEN].iter().map(compact).collect();
                out.push(Value::String(format!("({} more)", items.len() - ARRAY_TRUNCATE_LEN)));
                Value::Array(out)
            } else {
                Value::Array(items.iter().map(compact).collect())
            }
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !METADATA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), compact(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncates_long_strings() {
        let long = "a".repeat(300);
        let compacted = compact(&json!({ "body": long }));
        let body = compacted["body"].as_str().unwrap();
        assert!(body.ends_with("..."));
        assert_eq!(body.len(), STRING_TRUNCATE_LEN + 3);
    }

    #[test]
    fn truncates_long_arrays_with_marker() {
        let items: Vec<i32> = (0..15).collect();
        let compacted = compact(&json!({ "items": items }));
        let arr = compacted["items"].as_array().unwrap();
        assert_eq!(arr.len(), ARRAY_TRUNCATE_LEN + 1);
        assert_eq!(arr.last().unwrap(), "(5 more)");
    }

    #[test]
    fn short_values_pass_through_unchanged() {
        let value = json!({ "name": "short", "count": 3 });
        assert_eq!(compact(&value), value);
    }

    #[test]
    fn strips_metadata_keys_recursively() {
        let value = json!({
            "name": "task-1",
            "created_at": "2024-01-01T00:00:00Z",
            "nested": { "updated_at": "2024-01-02T00:00:00Z", "title": "x" },
        });
        let compacted = compact(&value);
        assert!(compacted.get("created_at").is_none());
        assert!(compacted["nested"].get("updated_at").is_none());
        assert_eq!(compacted["name"], "task-1");
        assert_eq!(compacted["nested"]["title"], "x");
    }

    #[test]
    fn minimal_injection_is_a_single_line_prefix() {
        let prefix = ContextBuilder::build_minimal_injection("spec", Some("spec_1"), "do the thing");
        assert_eq!(prefix, "[editing: spec/spec_1]\ndo the thing");
    }

    #[tokio::test]
    async fn full_injection_for_new_entity_has_schema_hints_not_a_fetch() {
        let builder = ContextBuilder::new("http://127.0.0.1:1");
        let block = builder.build_full_injection("document", None, "start drafting").await;
        assert!(block.contains("new document"));
        assert!(block.contains("document_create"));
        assert!(block.contains("start drafting"));
    }

    #[tokio::test]
    async fn full_injection_degrades_gracefully_on_fetch_failure() {
        // Port 1 on loopback refuses connections reliably in this sandbox.
        let builder = ContextBuilder::new("http://127.0.0.1:1");
        let block = builder
            .build_full_injection("spec", Some("spec_1"), "hi")
            .await;
        assert!(block.contains("spec_1"));
        assert!(block.contains("spec_update"));
        assert!(block.contains("hi"));
    }
}
