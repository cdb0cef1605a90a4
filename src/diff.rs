// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Schema diff engine: field-path collection, the type-compatibility
//! lattice, mismatch emission, severity policy, and confidence scoring.

use crate::schema_ir::{MatchStatus, ObjectSchema, SchemaIR, SchemaSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

/// Kind of disagreement discovered at a field path.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    Missing,
    TypeMismatch,
    OptionalityMismatch,
}

/// How much a mismatch matters.
///
/// `Critical` marks real contract violations, `Warning` marks likely drift,
/// `Info` marks wire-compatible or forward-compatible differences.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// A single disagreement at one field path.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Mismatch {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: MismatchKind,
    pub description: String,
    pub in_sources: Vec<SchemaSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggestion: String,
}

/// Per-endpoint confidence score with human-readable attributions.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EndpointConfidence {
    pub score: f64,
    pub factors: Vec<String>,
}

/// Full result of diffing one endpoint's schema views.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiffResult {
    pub endpoint: String,
    pub method: String,
    pub sources_compared: Vec<SchemaSource>,
    pub mismatches: Vec<Mismatch>,
    pub status: MatchStatus,
    pub confidence: EndpointConfidence,
}

/// Canonical representative of a type's equivalence class.
fn canonical_type(t: &str) -> String {
    let lower = t.trim().to_ascii_lowercase();
    match lower.as_str() {
        "int" | "integer" => "int".to_string(),
        "float" | "double" => "float".to_string(),
        "bool" | "boolean" => "bool".to_string(),
        "string" | "str" => "string".to_string(),
        "object" | "map" => "object".to_string(),
        "array" | "list" => "array".to_string(),
        _ => lower,
    }
}

/// Parent in the subtype graph, if the type is a subtype.
fn subtype_parent(t: &str) -> Option<&'static str> {
    match t {
        "uuid" | "date" | "datetime" | "date-time" | "uri" | "email" | "time" | "timestamp" => {
            Some("string")
        }
        "int32" | "int64" => Some("int"),
        "int" | "integer" => Some("number"),
        "float32" | "float64" => Some("float"),
        "float" | "double" => Some("number"),
        _ => None,
    }
}

/// The JSON-level type a declared type collapses to: follow subtype edges
/// transitively, then canonicalize.
fn wire_type(t: &str) -> String {
    let lower = t.trim().to_ascii_lowercase();
    match subtype_parent(&lower) {
        Some(parent) => wire_type(parent),
        None => canonical_type(&lower),
    }
}

/// Numeric family (`int` or `float`) a type belongs to, if any.
fn numeric_group(t: &str) -> Option<&'static str> {
    let lower = t.trim().to_ascii_lowercase();
    match canonical_type(&lower).as_str() {
        "int" => return Some("int"),
        "float" => return Some("float"),
        _ => {}
    }
    subtype_parent(&lower).and_then(numeric_group)
}

/// Two types are subtype-compatible iff at least one is a subtype and their
/// wire types match. Integer and float families are never compatible with
/// each other: mixing them is a real violation, not formatting drift.
fn are_subtype_compatible(type_a: &str, type_b: &str) -> bool {
    let a = type_a.trim().to_ascii_lowercase();
    let b = type_b.trim().to_ascii_lowercase();

    if let (Some(ga), Some(gb)) = (numeric_group(&a), numeric_group(&b)) {
        if ga != gb {
            return false;
        }
    }

    if subtype_parent(&a).is_none() && subtype_parent(&b).is_none() {
        return false;
    }
    wire_type(&a) == wire_type(&b)
}

/// Normalize a field name so case-style variants compare equal:
/// `userId`, `user_id`, `user-id`, and `UserID` all map to `user_id`.
fn normalize_field_name(name: &str) -> String {
    let name = name.replace('-', "_");
    let runes: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(runes.len() + 4);

    for (i, &r) in runes.iter().enumerate() {
        if i > 0 && r.is_uppercase() {
            let prev = runes[i - 1];
            if prev.is_lowercase() || prev.is_ascii_digit() {
                out.push('_');
            } else if runes.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false) {
                out.push('_');
            }
        }
        out.extend(r.to_lowercase());
    }
    out
}

fn method_has_request_body(method: &str) -> bool {
    !matches!(
        method.trim().to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "DELETE" | "OPTIONS"
    )
}

#[derive(Debug, Clone)]
struct FieldInfo {
    field_type: String,
    required: bool,
}

type FieldPresence = BTreeMap<String, BTreeMap<SchemaSource, FieldInfo>>;

/// Walk a schema tree and record every field path this source declares.
///
/// Path grammar: nested objects append `<name>.`, array items append `[].`,
/// leaves end in the normalized field name.
fn collect_fields(obj: &ObjectSchema, prefix: &str, source: SchemaSource, out: &mut FieldPresence) {
    for (field_name, field) in &obj.fields {
        let path = format!("{}{}", prefix, normalize_field_name(field_name));

        out.entry(path.clone()).or_default().insert(
            source,
            FieldInfo {
                field_type: field.field_type.clone(),
                required: field.required,
            },
        );

        if let Some(nested) = &field.nested {
            collect_fields(nested, &format!("{}.", path), source, out);
        }
    }

    if let Some(items) = &obj.items {
        collect_fields(items, &format!("{}[].", prefix), source, out);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Request,
    Response,
}

/// Compare the schema views of one endpoint and produce a diff result.
///
/// With fewer than two views there is nothing to compare: the result is a
/// `Match` with a confidence reflecting the lone source, if any.
pub fn compare(endpoint: &str, method: &str, schemas: &[SchemaIR]) -> DiffResult {
    let sources_compared: Vec<SchemaSource> = schemas.iter().map(|s| s.source).collect();

    if schemas.len() < 2 {
        return DiffResult {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            sources_compared,
            mismatches: Vec::new(),
            status: MatchStatus::Match,
            confidence: calculate_confidence(schemas, &[]),
        };
    }

    let mut mismatches = Vec::new();
    if method_has_request_body(method) {
        mismatches.extend(compare_requests(schemas));
    }
    mismatches.extend(compare_responses(schemas));

    let status = if mismatches.is_empty() {
        MatchStatus::Match
    } else if mismatches.iter().any(|m| m.severity == Severity::Critical) {
        MatchStatus::Violation
    } else {
        MatchStatus::Partial
    };

    let confidence = calculate_confidence(schemas, &mismatches);

    DiffResult {
        endpoint: endpoint.to_string(),
        method: method.to_string(),
        sources_compared,
        mismatches,
        status,
        confidence,
    }
}

fn compare_requests(schemas: &[SchemaIR]) -> Vec<Mismatch> {
    let mut presence = FieldPresence::new();
    let mut contributing = Vec::new();

    for schema in schemas {
        if let Some(request) = &schema.request {
            if !request.fields.is_empty() || request.items.is_some() {
                contributing.push(schema.source);
                collect_fields(request, "request.", schema.source, &mut presence);
            }
        }
    }

    if contributing.len() < 2 {
        return Vec::new();
    }
    detect_mismatches(&presence, &contributing, Section::Request)
}

fn compare_responses(schemas: &[SchemaIR]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    let status_codes: std::collections::BTreeSet<u16> = schemas
        .iter()
        .flat_map(|s| s.response.keys().copied())
        .collect();

    for code in status_codes {
        let mut presence = FieldPresence::new();
        let mut contributing = Vec::new();

        for schema in schemas {
            if let Some(resp) = schema.response.get(&code) {
                contributing.push(schema.source);
                collect_fields(resp, &format!("response.{}.", code), schema.source, &mut presence);
            }
        }

        if contributing.len() < 2 {
            continue;
        }
        mismatches.extend(detect_mismatches(&presence, &contributing, Section::Response));
    }

    mismatches
}

fn detect_mismatches(
    presence: &FieldPresence,
    contributing: &[SchemaSource],
    section: Section,
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for (path, source_map) in presence {
        let present: Vec<SchemaSource> = source_map.keys().copied().collect();

        if source_map.len() < contributing.len() {
            let mut missing: Vec<SchemaSource> = contributing
                .iter()
                .copied()
                .filter(|s| !source_map.contains_key(s))
                .collect();
            missing.sort();

            let severity = missing_field_severity(&present, &missing, section);
            mismatches.push(Mismatch {
                path: path.clone(),
                kind: MismatchKind::Missing,
                description: format!(
                    "Field missing in: [{}] (present in: [{}])",
                    join_sources(&missing),
                    join_sources(&present),
                ),
                in_sources: present.clone(),
                expected: None,
                actual: None,
                severity,
                suggestion: missing_suggestion(severity),
            });
        }

        if source_map.len() >= 2 {
            let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
            let entries: Vec<(&SchemaSource, &FieldInfo)> = source_map.iter().collect();

            for i in 0..entries.len() {
                for j in (i + 1)..entries.len() {
                    let (src_a, info_a) = entries[i];
                    let (src_b, info_b) = entries[j];
                    let canon_a = canonical_type(&info_a.field_type);
                    let canon_b = canonical_type(&info_b.field_type);
                    if canon_a == canon_b {
                        continue;
                    }

                    let pair_key = if canon_a <= canon_b {
                        (canon_a.clone(), canon_b.clone())
                    } else {
                        (canon_b.clone(), canon_a.clone())
                    };
                    if !seen_pairs.insert(pair_key) {
                        continue;
                    }

                    let compatible = are_subtype_compatible(&info_a.field_type, &info_b.field_type);
                    let (severity, suggestion) = if compatible {
                        (
                            Severity::Info,
                            format!(
                                "'{}' and '{}' are wire-compatible (both serialize as {} in JSON)",
                                info_a.field_type,
                                info_b.field_type,
                                wire_type(&info_a.field_type),
                            ),
                        )
                    } else {
                        (
                            Severity::Critical,
                            format!("Align type to '{}' across all sources", info_a.field_type),
                        )
                    };

                    mismatches.push(Mismatch {
                        path: path.clone(),
                        kind: MismatchKind::TypeMismatch,
                        description: format!(
                            "Type mismatch: {} has '{}', {} has '{}'",
                            src_a, info_a.field_type, src_b, info_b.field_type,
                        ),
                        in_sources: present.clone(),
                        expected: Some(json!(info_a.field_type)),
                        actual: Some(json!(info_b.field_type)),
                        severity,
                        suggestion,
                    });
                }
            }
        }

        let mut entries = source_map.iter();
        // BTreeMap iteration is sorted; the first source is the reference
        if let Some((ref_source, ref_info)) = entries.next() {
            for (src, info) in entries {
                if info.required != ref_info.required {
                    mismatches.push(Mismatch {
                        path: path.clone(),
                        kind: MismatchKind::OptionalityMismatch,
                        description: format!(
                            "Optionality mismatch: {}={}, {}={}",
                            ref_source, ref_info.required, src, info.required,
                        ),
                        in_sources: present.clone(),
                        expected: Some(json!(ref_info.required)),
                        actual: Some(json!(info.required)),
                        severity: Severity::Warning,
                        suggestion: "Consider aligning optionality across sources".to_string(),
                    });
                    break;
                }
            }
        }
    }

    mismatches
}

/// Severity of a missing field depends on which side has it and in which
/// section. The matrix is deliberately asymmetric: a client expecting a
/// field the server never sends is a bug, a server sending extra fields a
/// client ignores is forward-compatible.
fn missing_field_severity(
    present: &[SchemaSource],
    missing: &[SchemaSource],
    section: Section,
) -> Severity {
    let has_be = present.contains(&SchemaSource::BackendStatic);
    let has_fe = present.contains(&SchemaSource::FrontendStatic);
    let missing_be = missing.contains(&SchemaSource::BackendStatic);
    let missing_fe = missing.contains(&SchemaSource::FrontendStatic);

    match section {
        Section::Response => {
            if has_be && missing_fe {
                return Severity::Info;
            }
            if has_fe && missing_be {
                return Severity::Critical;
            }
        }
        Section::Request => {
            if has_fe && missing_be {
                return Severity::Info;
            }
            if has_be && missing_fe {
                return Severity::Warning;
            }
        }
    }

    Severity::Warning
}

fn missing_suggestion(severity: Severity) -> String {
    match severity {
        Severity::Info => "Extra field; safe to ignore unless strict contracts are wanted",
        Severity::Warning => "Field may be expected; verify both sides agree",
        Severity::Critical => "Field is expected but not provided; likely a bug",
    }
    .to_string()
}

fn join_sources(sources: &[SchemaSource]) -> String {
    sources
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn calculate_confidence(schemas: &[SchemaIR], mismatches: &[Mismatch]) -> EndpointConfidence {
    let mut score: f64 = 0.0;
    let mut factors = Vec::new();

    let sources: HashSet<SchemaSource> = schemas.iter().map(|s| s.source).collect();

    if sources.contains(&SchemaSource::BackendStatic) {
        score += 20.0;
        factors.push("Backend static analysis present (+20)".to_string());
    }
    if sources.contains(&SchemaSource::FrontendStatic) {
        score += 20.0;
        factors.push("Frontend static analysis present (+20)".to_string());
    }
    if sources.contains(&SchemaSource::Runtime) {
        score += 20.0;
        factors.push("Runtime observation present (+20)".to_string());
    }

    if sources.len() == 3 {
        score += 20.0;
        factors.push("Triple-source verification active (+20)".to_string());
    }

    for m in mismatches {
        match m.severity {
            Severity::Critical => {
                score -= 10.0;
                factors.push(format!("Critical: {} (-10)", m.path));
            }
            Severity::Warning => {
                score -= 3.0;
                factors.push(format!("Warning: {} (-3)", m.path));
            }
            Severity::Info => {}
        }
    }

    EndpointConfidence {
        score: score.clamp(0.0, 100.0),
        factors,
    }
}
