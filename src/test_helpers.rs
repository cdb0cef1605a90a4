// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Shared test utilities to reduce duplication across test modules.

use crate::infer::CapturedRequest;
use crate::live::LiveRequest;
use crate::schema_ir::{Field, ObjectSchema, SchemaIR, SchemaSource};
use std::collections::BTreeMap;

/// Build a flat object schema from `(name, type, required)` triples.
pub fn object_schema(fields: &[(&str, &str, bool)]) -> ObjectSchema {
    let mut map = BTreeMap::new();
    for (name, field_type, required) in fields {
        map.insert(name.to_string(), Field::new(field_type, *required));
    }
    ObjectSchema {
        schema_type: "object".to_string(),
        fields: map,
        items: None,
    }
}

/// Alias kept for call sites that read better as "a response schema".
pub fn response_schema(fields: &[(&str, &str, bool)]) -> ObjectSchema {
    object_schema(fields)
}

/// An IR record with a single status-code response and no request body.
pub fn ir_with_response(
    source: SchemaSource,
    status: u16,
    fields: &[(&str, &str, bool)],
) -> SchemaIR {
    let mut response = BTreeMap::new();
    response.insert(status, object_schema(fields));
    SchemaIR {
        endpoint: "/api/test".to_string(),
        method: "GET".to_string(),
        source,
        request: None,
        response,
    }
}

/// A captured exchange with a JSON response body and no request body.
pub fn capture(method: &str, path: &str, status: u16, response_json: &str) -> CapturedRequest {
    CapturedRequest {
        path: path.to_string(),
        method: method.to_string(),
        request_body: None,
        status_code: status,
        response: serde_json::from_str(response_json).ok(),
        observation_count: 1,
    }
}

/// A buffered live request with the given source label.
pub fn live_request(method: &str, path: &str, status: u16, source: &str) -> LiveRequest {
    LiveRequest {
        id: String::new(),
        timestamp: None,
        path: path.to_string(),
        method: method.to_string(),
        status_code: status,
        duration_ms: 1.0,
        request_body: None,
        response_body: serde_json::from_str(r#"{"ok": true}"#).ok(),
        source: source.to_string(),
    }
}
