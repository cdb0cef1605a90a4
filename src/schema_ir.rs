// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Canonical schema intermediate representation shared by every comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin of a schema view.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaSource {
    #[serde(rename = "backend-static")]
    BackendStatic,
    #[serde(rename = "frontend-static")]
    FrontendStatic,
    #[serde(rename = "runtime-observed")]
    Runtime,
}

impl SchemaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaSource::BackendStatic => "backend-static",
            SchemaSource::FrontendStatic => "frontend-static",
            SchemaSource::Runtime => "runtime-observed",
        }
    }
}

impl std::fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schema view of a single (endpoint, method).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchemaIR {
    pub endpoint: String,
    pub method: String,
    pub source: SchemaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ObjectSchema>,
    /// Response schemas keyed by status code. A `BTreeMap` keeps status
    /// codes in ascending order wherever they are walked or serialized.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response: BTreeMap<u16, ObjectSchema>,
}

/// Recursive schema node. `fields` is populated for objects, `items` for
/// arrays; an opaque object carries neither.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ObjectSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ObjectSchema>>,
}

/// A named member of an object schema.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<ObjectSchema>>,
    /// Observation frequency in [0,1] for inferred schemas; 0.0 for static.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<SchemaSource>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl Field {
    /// A plain static field with no nesting.
    pub fn new(field_type: &str, required: bool) -> Self {
        Self {
            field_type: field_type.to_string(),
            required,
            nested: None,
            confidence: 0.0,
            source_tag: None,
        }
    }
}

/// Outcome of comparing the schema views of one endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Match,
    Partial,
    Violation,
}

/// Canonicalize an endpoint path.
///
/// Rules, in order: ensure a leading `/`; drop a single trailing `/` unless
/// the result would be empty; an empty path becomes `/`; every `{param}`
/// segment collapses to the literal `{}` so paths differing only in
/// parameter names key to the same endpoint.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.to_string();
    if !p.starts_with('/') {
        p.insert(0, '/');
    }
    if p.len() > 1 && p.ends_with('/') {
        p.pop();
    }

    let mut out = String::with_capacity(p.len());
    let mut rest = p.as_str();
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                out.push_str("{}");
                rest = &rest[open + close + 1..];
            }
            None => {
                // unmatched brace: keep the remainder verbatim
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/api/users", "/api/users")]
    #[case("api/users", "/api/users")]
    #[case("/api/users/", "/api/users")]
    #[case("/", "/")]
    #[case("", "/")]
    #[case("/api/users/{userId}", "/api/users/{}")]
    #[case("/api/users/{userId}/posts/{postId}", "/api/users/{}/posts/{}")]
    #[case("/api/{}/x", "/api/{}/x")]
    #[case("/api/users/{broken", "/api/users/{broken")]
    fn normalize_path_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn normalized_paths_have_no_named_params() {
        let p = normalize_path("/v1/{org}/{repo}/issues/{id}/");
        assert!(p.starts_with('/'));
        assert!(!p.ends_with('/'));
        assert!(!p.contains("{o") && !p.contains("{r") && !p.contains("{i"));
        assert_eq!(p, "/v1/{}/{}/issues/{}");
    }

    #[test]
    fn schema_source_serializes_as_kebab_tags() {
        let s = serde_json::to_string(&SchemaSource::BackendStatic).unwrap();
        assert_eq!(s, "\"backend-static\"");
        let back: SchemaSource = serde_json::from_str("\"runtime-observed\"").unwrap();
        assert_eq!(back, SchemaSource::Runtime);
    }

    #[test]
    fn schema_ir_roundtrip_preserves_nested_shape() {
        let json = r#"{
            "endpoint": "/api/users/{}",
            "method": "POST",
            "source": "backend-static",
            "request": {
                "type": "object",
                "fields": {
                    "name": {"type": "string", "required": true},
                    "profile": {
                        "type": "object",
                        "required": false,
                        "nested": {
                            "type": "object",
                            "fields": {"age": {"type": "int", "required": false}}
                        }
                    }
                }
            },
            "response": {
                "201": {
                    "type": "object",
                    "fields": {"id": {"type": "uuid", "required": true}}
                }
            }
        }"#;
        let ir: SchemaIR = serde_json::from_str(json).unwrap();
        assert_eq!(ir.endpoint, "/api/users/{}");
        assert_eq!(ir.source, SchemaSource::BackendStatic);
        let req = ir.request.as_ref().unwrap();
        assert!(req.fields["profile"].nested.is_some());
        assert!(ir.response[&201].fields.contains_key("id"));

        let out = serde_json::to_string(&ir).unwrap();
        let again: SchemaIR = serde_json::from_str(&out).unwrap();
        assert_eq!(again.response.len(), 1);
    }

    #[test]
    fn absent_request_and_response_stay_absent() {
        let ir: SchemaIR = serde_json::from_str(
            r#"{"endpoint":"/x","method":"GET","source":"frontend-static"}"#,
        )
        .unwrap();
        assert!(ir.request.is_none());
        assert!(ir.response.is_empty());
        let out = serde_json::to_string(&ir).unwrap();
        assert!(!out.contains("request"));
        assert!(!out.contains("response"));
    }
}
