//! Per-step action schema — a discriminated union of the currently
//! permitted actions, plus the distilled (flattened) fallback variant and
//! the decoder that turns validated JSON back into an [`Action`].

use scour_core::{Action, ActionKind, AnswerReference, Permissions, SchemaSpec};
use serde_json::{json, Value};

/// Builds the JSON schema for one decision step.
#[derive(Debug, Clone)]
pub struct ActionSchemaBuilder {
    permissions: Permissions,
    max_queries: usize,
    max_urls: usize,
    max_questions: usize,
}

impl ActionSchemaBuilder {
    pub fn new(permissions: Permissions) -> Self {
        Self { permissions, max_queries: 5, max_urls: 5, max_questions: 4 }
    }

    pub fn with_limits(mut self, max_queries: usize, max_urls: usize, max_questions: usize) -> Self {
        self.max_queries = max_queries;
        self.max_urls = max_urls;
        self.max_questions = max_questions;
        self
    }

    /// Emit the schema spec for the permitted actions. Every variant
    /// carries `think`; the distilled variant flattens list fields into
    /// delimited strings.
    pub fn build(&self) -> SchemaSpec {
        let mut variants = Vec::new();
        let mut kinds = Vec::new();

        if self.permissions.search {
            kinds.push("search");
            variants.push(variant(
                "search",
                json!({
                    "queries": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "maxItems": self.max_queries,
                        "description": "Search queries, each a short keyword phrase"
                    }
                }),
                &["queries"],
            ));
        }
        if self.permissions.read {
            kinds.push("visit");
            variants.push(variant(
                "visit",
                json!({
                    "urls": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "maxItems": self.max_urls,
                        "description": "URLs to read, chosen from the provided list"
                    }
                }),
                &["urls"],
            ));
        }
        if self.permissions.reflect {
            kinds.push("reflect");
            variants.push(variant(
                "reflect",
                json!({
                    "questions": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "maxItems": self.max_questions,
                        "description": "New sub-questions that would close knowledge gaps"
                    }
                }),
                &["questions"],
            ));
        }
        if self.permissions.code {
            kinds.push("code");
            variants.push(variant(
                "code",
                json!({
                    "program": {
                        "type": "string",
                        "description": "A small program to run against the knowledge snapshot"
                    }
                }),
                &["program"],
            ));
        }
        if self.permissions.answer {
            kinds.push("answer");
            variants.push(variant(
                "answer",
                json!({
                    "answer": {
                        "type": "string",
                        "description": "The final answer, concise and definitive"
                    },
                    "references": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "url": { "type": "string" },
                                "exact_quote": { "type": "string" }
                            },
                            "required": ["url"]
                        }
                    }
                }),
                &["answer"],
            ));
        }

        let full = json!({ "oneOf": variants });
        let distilled = json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": kinds },
                "think": { "type": "string" },
                "queries": { "type": "string", "description": "semicolon-separated search queries" },
                "urls": { "type": "string", "description": "semicolon-separated URLs" },
                "questions": { "type": "string", "description": "semicolon-separated sub-questions" },
                "program": { "type": "string" },
                "answer": { "type": "string" },
                "references": { "type": "string", "description": "one per line: url | exact quote" }
            },
            "required": ["action", "think"]
        });

        SchemaSpec::new("action", full).with_distilled(distilled)
    }
}

fn variant(kind: &str, extra_properties: Value, extra_required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("action".into(), json!({ "const": kind }));
    properties.insert(
        "think".into(),
        json!({ "type": "string", "description": "Why this action moves the research forward" }),
    );
    if let Value::Object(extra) = extra_properties {
        properties.extend(extra);
    }
    let mut required = vec!["action".to_string(), "think".to_string()];
    required.extend(extra_required.iter().map(|s| s.to_string()));
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Decode a validated schema object into an [`Action`], accepting both the
/// full (nested) and distilled (flattened) shapes. Rejects actions the
/// current permissions forbid.
pub fn decode_action(value: &Value, permissions: &Permissions) -> Result<Action, String> {
    let action = if looks_distilled(value) {
        decode_distilled(value)?
    } else {
        serde_json::from_value::<Action>(value.clone()).map_err(|e| e.to_string())?
    };

    if !permissions.allows(action.kind()) {
        return Err(format!("action '{}' is not currently permitted", action.kind()));
    }
    normalize(action)
}

/// Distilled replies carry list payloads as plain strings.
fn looks_distilled(value: &Value) -> bool {
    for key in ["queries", "urls", "questions"] {
        if value.get(key).is_some_and(Value::is_string) {
            return true;
        }
    }
    value.get("references").is_some_and(Value::is_string)
}

fn decode_distilled(value: &Value) -> Result<Action, String> {
    let kind = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or("missing 'action' discriminant")?;
    let think = value
        .get("think")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(|s| {
                s.split(';')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    match kind {
        "search" => Ok(Action::Search { think, queries: list("queries") }),
        "visit" => Ok(Action::Visit { think, urls: list("urls") }),
        "reflect" => Ok(Action::Reflect { think, questions: list("questions") }),
        "code" => Ok(Action::Code {
            think,
            program: value
                .get("program")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        "answer" => {
            let references = value
                .get("references")
                .and_then(Value::as_str)
                .map(parse_reference_lines)
                .unwrap_or_default();
            Ok(Action::Answer {
                think,
                answer: value
                    .get("answer")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                references,
            })
        }
        other => Err(format!("unknown action '{other}'")),
    }
}

fn parse_reference_lines(s: &str) -> Vec<AnswerReference> {
    s.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (url, quote) = match line.split_once('|') {
                Some((u, q)) => (u.trim(), q.trim()),
                None => (line, ""),
            };
            Some(AnswerReference { url: url.to_string(), exact_quote: quote.to_string() })
        })
        .collect()
}

/// Reject structurally valid but semantically empty actions.
fn normalize(action: Action) -> Result<Action, String> {
    match &action {
        Action::Search { queries, .. } if queries.is_empty() => {
            Err("search action carried no queries".into())
        }
        Action::Visit { urls, .. } if urls.is_empty() => Err("visit action carried no urls".into()),
        Action::Reflect { questions, .. } if questions.is_empty() => {
            Err("reflect action carried no questions".into())
        }
        Action::Code { program, .. } if program.trim().is_empty() => {
            Err("code action carried no program".into())
        }
        Action::Answer { answer, .. } if answer.trim().is_empty() => {
            Err("answer action carried no answer".into())
        }
        _ => Ok(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_includes_only_permitted_variants() {
        let perms = Permissions { answer: true, search: true, read: false, reflect: false, code: false };
        let spec = ActionSchemaBuilder::new(perms).build();
        let variants = spec.json["oneOf"].as_array().unwrap();
        assert_eq!(variants.len(), 2);
        let kinds: Vec<&str> = variants
            .iter()
            .map(|v| v["properties"]["action"]["const"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["search", "answer"]);
    }

    #[test]
    fn every_variant_requires_think() {
        let spec = ActionSchemaBuilder::new(Permissions::all()).build();
        for v in spec.json["oneOf"].as_array().unwrap() {
            let required: Vec<&str> =
                v["required"].as_array().unwrap().iter().map(|r| r.as_str().unwrap()).collect();
            assert!(required.contains(&"think"));
        }
    }

    #[test]
    fn distilled_schema_is_flat() {
        let spec = ActionSchemaBuilder::new(Permissions::all()).build();
        let distilled = spec.distilled.unwrap();
        assert_eq!(distilled["properties"]["queries"]["type"], "string");
        assert_eq!(distilled["properties"]["action"]["enum"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn decode_full_shape() {
        let value = serde_json::json!({
            "action": "search",
            "think": "need sources",
            "queries": ["rust book author"]
        });
        let action = decode_action(&value, &Permissions::all()).unwrap();
        assert_eq!(action.kind(), ActionKind::Search);
    }

    #[test]
    fn decode_distilled_shape() {
        let value = serde_json::json!({
            "action": "visit",
            "think": "read the docs",
            "urls": "https://a.example/1; https://b.example/2"
        });
        match decode_action(&value, &Permissions::all()).unwrap() {
            Action::Visit { urls, .. } => assert_eq!(urls.len(), 2),
            other => panic!("expected visit, got {:?}", other.kind()),
        }
    }

    #[test]
    fn decode_distilled_references() {
        let value = serde_json::json!({
            "action": "answer",
            "think": "done",
            "answer": "42",
            "references": "https://a.example/1 | the answer is 42\nhttps://b.example/2"
        });
        match decode_action(&value, &Permissions::all()).unwrap() {
            Action::Answer { references, .. } => {
                assert_eq!(references.len(), 2);
                assert_eq!(references[0].exact_quote, "the answer is 42");
                assert!(references[1].exact_quote.is_empty());
            }
            other => panic!("expected answer, got {:?}", other.kind()),
        }
    }

    #[test]
    fn decode_rejects_forbidden_action() {
        let value = serde_json::json!({
            "action": "answer",
            "think": "give up",
            "answer": "whatever"
        });
        let perms = Permissions { answer: false, ..Permissions::all() };
        assert!(decode_action(&value, &perms).is_err());
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let value = serde_json::json!({
            "action": "search",
            "think": "hmm",
            "queries": []
        });
        assert!(decode_action(&value, &Permissions::all()).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        let value = serde_json::json!({ "noise": true });
        assert!(decode_action(&value, &Permissions::all()).is_err());
    }
}
