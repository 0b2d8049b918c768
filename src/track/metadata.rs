//! Pluggable metadata parsing
//!
//! Endpoint and track metadata is application defined. Every assignment goes
//! through a [`MetadataParser`]; a failed parse never discards the raw input
//! and never clears previously parsed metadata.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Parses raw metadata into its typed form, or explains why it can't
pub type MetadataParser = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Parser that accepts any JSON value unchanged
pub fn identity_parser() -> MetadataParser {
    Arc::new(|raw: &Value| Ok(raw.clone()))
}

/// Parsed metadata together with its raw form and the last parse error
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataState {
    pub metadata: Option<Value>,
    pub raw_metadata: Value,
    pub metadata_parsing_error: Option<String>,
}

impl MetadataState {
    pub fn parsed(parser: &MetadataParser, raw: Value) -> Self {
        let mut state = Self::default();
        let _ = state.apply(parser, raw);
        state
    }

    /// Store `raw` and its parsed form
    ///
    /// On failure the previous typed metadata is kept, the error is recorded
    /// and also returned so local callers can fail fast.
    pub fn apply(&mut self, parser: &MetadataParser, raw: Value) -> std::result::Result<(), String> {
        let result = parser(&raw);
        self.raw_metadata = raw;
        match result {
            Ok(parsed) => {
                self.metadata = Some(parsed);
                self.metadata_parsing_error = None;
                Ok(())
            }
            Err(e) => {
                self.metadata_parsing_error = Some(e.clone());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn require_name() -> MetadataParser {
        Arc::new(|raw: &Value| {
            raw.get("name")
                .and_then(Value::as_str)
                .map(|name| json!({ "name": name }))
                .ok_or_else(|| "missing name".to_string())
        })
    }

    #[test]
    fn test_identity_parser() {
        let state = MetadataState::parsed(&identity_parser(), json!({"type": "camera"}));
        assert_eq!(state.metadata, Some(json!({"type": "camera"})));
        assert!(state.metadata_parsing_error.is_none());
    }

    #[test]
    fn test_failed_parse_keeps_previous_metadata() {
        let parser = require_name();
        let mut state = MetadataState::parsed(&parser, json!({"name": "alice", "extra": 1}));
        assert_eq!(state.metadata, Some(json!({"name": "alice"})));

        let err = state.apply(&parser, json!({"nick": "bob"})).unwrap_err();
        assert_eq!(err, "missing name");
        assert_eq!(state.metadata, Some(json!({"name": "alice"})));
        assert_eq!(state.raw_metadata, json!({"nick": "bob"}));
        assert_eq!(state.metadata_parsing_error.as_deref(), Some("missing name"));

        state.apply(&parser, json!({"name": "carol"})).unwrap();
        assert!(state.metadata_parsing_error.is_none());
    }
}
