//! Reassembly of streamed tool-call fragments
//!
//! Providers report tool calls piecewise: the name usually arrives whole in
//! one fragment while the JSON argument text is split at arbitrary points,
//! possibly interleaved with fragments of other calls. Fragments are keyed by
//! the index the provider reports.

use crate::provider::ToolCallFragment;
use orchat_tools::ToolRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Working record for one tool call of the current stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments_text: String,
}

impl PendingToolCall {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    fn apply(&mut self, fragment: ToolCallFragment) {
        if let Some(name) = fragment.name.filter(|name| !name.is_empty()) {
            self.name = name;
        }
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        if let Some(arguments) = fragment.arguments {
            self.arguments_text.push_str(&arguments);
        }
    }

    /// Parsed arguments if the call is ready, otherwise the reason it is not.
    ///
    /// Schema checks only apply to tools present in `registry`; calls naming
    /// an unknown tool are left for the executor to skip.
    pub fn parse_ready(&self, registry: &ToolRegistry) -> Result<Value, String> {
        if self.name.is_empty() {
            return Err("tool name never arrived".to_string());
        }

        let arguments: Value = serde_json::from_str(&self.arguments_text)
            .map_err(|e| format!("arguments are not valid JSON ({})", e))?;

        if let Some(tool) = registry.get(&self.name) {
            tool.validate_params(&arguments).map_err(|e| e.to_string())?;
        }

        Ok(arguments)
    }

    pub fn is_ready(&self, registry: &ToolRegistry) -> bool {
        self.parse_ready(registry).is_ok()
    }
}

/// A fully assembled, schema-valid tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyToolCall {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ReadyToolCall {
    /// The `query` argument, when the call carries one
    pub fn query(&self) -> Option<&str> {
        self.arguments.get("query").and_then(Value::as_str)
    }
}

/// Index-keyed reducer over tool-call fragments of a single stream
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the call at its index
    pub fn apply(&mut self, fragment: ToolCallFragment) {
        self.calls
            .entry(fragment.index)
            .or_insert_with(|| PendingToolCall::new(fragment.index))
            .apply(fragment);
    }

    pub fn extend<I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = ToolCallFragment>,
    {
        for fragment in fragments {
            self.apply(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether any known call has received its name
    pub fn has_named_call(&self) -> bool {
        self.calls.values().any(|call| !call.name.is_empty())
    }

    /// All known calls in index order
    pub fn snapshot(&self) -> Vec<PendingToolCall> {
        self.calls.values().cloned().collect()
    }

    /// Consume the accumulator, keeping only ready calls in index order.
    ///
    /// Calls that are not ready are dropped with a warning. A missing call id
    /// is replaced by a synthetic one so the follow-up window can key the
    /// tool result.
    pub fn into_ready(self, registry: &ToolRegistry) -> Vec<ReadyToolCall> {
        self.calls
            .into_values()
            .filter_map(|call| match call.parse_ready(registry) {
                Ok(arguments) => {
                    let id = if call.id.is_empty() {
                        format!("call_{}", call.index)
                    } else {
                        call.id
                    };
                    Some(ReadyToolCall {
                        index: call.index,
                        id,
                        name: call.name,
                        arguments,
                    })
                }
                Err(reason) => {
                    warn!(
                        "Dropping tool call #{} ('{}'): {}",
                        call.index, call.name, reason
                    );
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orchat_tools::{AiTool, ToolError};
    use serde_json::json;

    struct QueryTool;

    #[async_trait]
    impl AiTool for QueryTool {
        fn name(&self) -> &str {
            "web_search"
        }

        fn description(&self) -> &str {
            "query tool"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            })
        }

        async fn execute(&self, _params: Value) -> Result<String, ToolError> {
            Ok(String::new())
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(QueryTool)
    }

    fn feed(text: &str, pieces: &[&str]) -> ToolCallAccumulator {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(ToolCallFragment::new(0).with_name(text).with_id("call_abc"));
        for piece in pieces {
            acc.apply(ToolCallFragment::new(0).with_arguments(*piece));
        }
        acc
    }

    #[test]
    fn test_single_character_split_matches_one_shot() {
        let args = r#"{"query":"tokyo weather"}"#;
        let chars: Vec<String> = args.chars().map(String::from).collect();
        let char_refs: Vec<&str> = chars.iter().map(String::as_str).collect();

        let split = feed("web_search", &char_refs).snapshot();
        let whole = feed("web_search", &[args]).snapshot();

        assert_eq!(split, whole);
        assert_eq!(split[0].arguments_text, args);
    }

    #[test]
    fn test_tokyo_fragments_assemble_into_ready_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(ToolCallFragment::new(0).with_name("web_search"));
        acc.apply(ToolCallFragment::new(0).with_arguments(r#"{"query":"#));
        acc.apply(ToolCallFragment::new(0).with_arguments(r#""tokyo weather"}"#));

        let ready = acc.into_ready(&registry());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "web_search");
        assert_eq!(ready[0].arguments, json!({"query": "tokyo weather"}));
        assert_eq!(ready[0].query(), Some("tokyo weather"));
        assert_eq!(ready[0].id, "call_0");
    }

    #[test]
    fn test_last_non_empty_name_and_id_win() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(ToolCallFragment::new(0).with_name("").with_id(""));
        assert!(!acc.has_named_call());

        acc.apply(ToolCallFragment::new(0).with_name("first").with_id("a"));
        acc.apply(ToolCallFragment::new(0).with_name("").with_id(""));
        acc.apply(ToolCallFragment::new(0).with_name("web_search").with_id("b"));

        let calls = acc.snapshot();
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].id, "b");
        assert!(acc.has_named_call());
    }

    #[test]
    fn test_interleaved_indices_snapshot_in_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(ToolCallFragment::new(1).with_name("second").with_arguments("{"));
        acc.apply(ToolCallFragment::new(0).with_name("first").with_arguments("{"));
        acc.apply(ToolCallFragment::new(1).with_arguments("}"));
        acc.apply(ToolCallFragment::new(0).with_arguments("}"));

        let calls = acc.snapshot();
        assert_eq!(acc.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
        assert!(calls.iter().all(|c| c.arguments_text == "{}"));
    }

    #[test]
    fn test_unparsable_or_unnamed_calls_are_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(ToolCallFragment::new(0).with_name("web_search").with_arguments(r#"{"query":"#));
        acc.apply(ToolCallFragment::new(1).with_arguments(r#"{"query":"x"}"#));
        acc.apply(
            ToolCallFragment::new(2)
                .with_name("web_search")
                .with_arguments(r#"{"query":"ok"}"#),
        );

        let ready = acc.into_ready(&registry());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].index, 2);
    }

    #[test]
    fn test_schema_invalid_arguments_are_not_ready() {
        let call = PendingToolCall {
            index: 0,
            id: "x".into(),
            name: "web_search".into(),
            arguments_text: r#"{"q":"tokyo"}"#.into(),
        };
        assert!(!call.is_ready(&registry()));

        let wrong_type = PendingToolCall {
            arguments_text: r#"{"query":42}"#.into(),
            ..call.clone()
        };
        assert!(!wrong_type.is_ready(&registry()));
    }

    #[test]
    fn test_unregistered_tool_only_needs_json() {
        let call = PendingToolCall {
            index: 0,
            id: "x".into(),
            name: "calculator".into(),
            arguments_text: r#"{"expr":"1+1"}"#.into(),
        };
        assert!(call.is_ready(&registry()));
    }
}
