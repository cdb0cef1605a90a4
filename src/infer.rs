// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Online aggregation of captured HTTP exchanges into runtime-observed
//! schema IR, with frequency-based required/optional inference.

use crate::schema_ir::{Field, ObjectSchema, SchemaIR, SchemaSource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// One observed HTTP exchange, decoded. Bodies are present only when they
/// were top-level JSON objects.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Map<String, Value>>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Map<String, Value>>,
    /// Weight of this capture in the merge; a pre-aggregated capture may
    /// stand for many identical observations.
    pub observation_count: u64,
}

/// Aggregate captures into one runtime-observed IR per unique
/// `(method, path)`.
///
/// Fields seen in every observation of a key end up `required` with
/// confidence 1.0; fields seen in a strict subset are demoted to optional
/// with confidence `seen / total`.
pub fn infer_schema(requests: &[CapturedRequest]) -> Vec<SchemaIR> {
    let mut endpoints: BTreeMap<String, SchemaIR> = BTreeMap::new();
    let mut hits: BTreeMap<String, u64> = BTreeMap::new();

    for req in requests {
        let key = format!("{}:{}", req.method, req.path);
        *hits.entry(key.clone()).or_insert(0) += req.observation_count;

        let schema = endpoints.entry(key).or_insert_with(|| SchemaIR {
            endpoint: req.path.clone(),
            method: req.method.clone(),
            source: SchemaSource::Runtime,
            request: None,
            response: BTreeMap::new(),
        });

        if let Some(body) = &req.request_body {
            let merged = match schema.request.take() {
                Some(mut existing) => {
                    merge_object_schema(&mut existing, body, req.observation_count);
                    existing
                }
                None => infer_object_schema(body, req.observation_count),
            };
            schema.request = Some(merged);
        }

        if let Some(body) = &req.response {
            match schema.response.entry(req.status_code) {
                Entry::Occupied(mut existing) => {
                    merge_object_schema(existing.get_mut(), body, req.observation_count);
                }
                Entry::Vacant(slot) => {
                    slot.insert(infer_object_schema(body, req.observation_count));
                }
            }
        }
    }

    let mut result = Vec::with_capacity(endpoints.len());
    for (key, mut schema) in endpoints {
        let total = hits.get(&key).copied().unwrap_or(0);
        if let Some(request) = &mut schema.request {
            normalize_confidence(request, total);
        }
        for resp in schema.response.values_mut() {
            normalize_confidence(resp, total);
        }
        result.push(schema);
    }
    result
}

fn infer_object_schema(data: &Map<String, Value>, hits: u64) -> ObjectSchema {
    let mut fields = BTreeMap::new();
    for (key, value) in data {
        let mut field = Field {
            field_type: infer_type(value).to_string(),
            required: true,
            nested: None,
            confidence: hits as f64,
            source_tag: Some(SchemaSource::Runtime),
        };
        if let Some(nested) = value.as_object() {
            field.nested = Some(Box::new(infer_object_schema(nested, hits)));
        }
        fields.insert(key.clone(), field);
    }
    ObjectSchema {
        schema_type: "object".to_string(),
        fields,
        items: None,
    }
}

fn merge_object_schema(schema: &mut ObjectSchema, data: &Map<String, Value>, hits: u64) {
    for (key, value) in data {
        match schema.fields.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let field = entry.get_mut();
                field.confidence += hits as f64;
                if let (Some(nested_data), Some(nested_schema)) =
                    (value.as_object(), field.nested.as_mut())
                {
                    merge_object_schema(nested_schema, nested_data, hits);
                }
            }
            Entry::Vacant(slot) => {
                // first seen after the initial observation: cannot be required
                let mut field = Field {
                    field_type: infer_type(value).to_string(),
                    required: false,
                    nested: None,
                    confidence: hits as f64,
                    source_tag: Some(SchemaSource::Runtime),
                };
                if let Some(nested) = value.as_object() {
                    field.nested = Some(Box::new(infer_object_schema(nested, hits)));
                }
                slot.insert(field);
            }
        }
    }
}

fn normalize_confidence(schema: &mut ObjectSchema, total_hits: u64) {
    if total_hits == 0 {
        return;
    }
    for field in schema.fields.values_mut() {
        field.confidence /= total_hits as f64;
        if field.confidence < 1.0 {
            field.required = false;
        }
        if let Some(nested) = field.nested.as_mut() {
            normalize_confidence(nested, total_hits);
        }
    }
}

fn infer_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}
