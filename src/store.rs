// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! In-memory persistence seam: projects, endpoints, schema rows, and diff
//! history. A database-backed implementation would replace this component
//! behind the same methods.

use crate::diff::DiffResult;
use crate::schema_ir::{normalize_path, SchemaIR};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    #[serde(skip)]
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Endpoint {
    pub id: Uuid,
    pub project_id: Uuid,
    pub path: String,
    pub method: String,
}

/// An endpoint plus the schema sources stored for it.
#[derive(Serialize, Debug, Clone)]
pub struct EndpointWithSources {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub sources: Vec<String>,
}

/// One persisted schema view. `data` is the raw IR document; it is decoded
/// per read so one corrupt row degrades, never breaks, a diff.
#[derive(Debug, Clone)]
pub struct SchemaRow {
    pub endpoint_id: Uuid,
    pub source: String,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiffRecord {
    pub endpoint_id: Uuid,
    pub data: Value,
    pub sources_compared: String,
    pub created_at: DateTime<Utc>,
}

/// Counts of diff outcomes across a set of projects.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub matched: usize,
    pub partial: usize,
    pub violations: usize,
}

#[derive(Default)]
struct StoreInner {
    projects: HashMap<Uuid, Project>,
    endpoints: HashMap<Uuid, Endpoint>,
    schemas: HashMap<(Uuid, String), SchemaRow>,
    diffs: Vec<DiffRecord>,
}

#[derive(Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_project(&self, owner_id: &str, name: &str, description: &str) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        if let Ok(mut inner) = self.inner.write() {
            inner.projects.insert(project.id, project.clone());
        }
        project
    }

    pub fn get_project(&self, id: Uuid) -> Option<Project> {
        self.read(|inner| inner.projects.get(&id).cloned())
    }

    /// The project, if it exists and belongs to this user.
    pub fn accessible_project(&self, id: Uuid, user_id: &str) -> Option<Project> {
        self.get_project(id).filter(|p| p.owner_id == user_id)
    }

    pub fn list_projects(&self, owner_id: &str) -> Vec<Project> {
        let mut projects = self.read(|inner| {
            inner
                .projects
                .values()
                .filter(|p| p.owner_id == owner_id)
                .cloned()
                .collect::<Vec<_>>()
        });
        projects.sort_by_key(|p| p.created_at);
        projects
    }

    /// Delete a project and everything hanging off it. False when the
    /// project does not exist or belongs to someone else.
    pub fn delete_project(&self, id: Uuid, owner_id: &str) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            tracing::warn!("store lock poisoned during delete");
            return false;
        };
        match inner.projects.get(&id) {
            Some(p) if p.owner_id == owner_id => {}
            _ => return false,
        }
        inner.projects.remove(&id);
        let endpoint_ids: Vec<Uuid> = inner
            .endpoints
            .values()
            .filter(|e| e.project_id == id)
            .map(|e| e.id)
            .collect();
        inner.endpoints.retain(|_, e| e.project_id != id);
        inner
            .schemas
            .retain(|(eid, _), _| !endpoint_ids.contains(eid));
        inner.diffs.retain(|d| !endpoint_ids.contains(&d.endpoint_id));
        true
    }

    /// Persist IR documents, creating endpoints on first sight of each
    /// normalized (path, method). One row per (endpoint, source); a later
    /// upload for the same source replaces the earlier row.
    pub fn upsert_schemas(&self, project_id: Uuid, schemas: Vec<SchemaIR>) {
        let Ok(mut inner) = self.inner.write() else {
            tracing::warn!("store lock poisoned during schema upsert");
            return;
        };

        for mut schema in schemas {
            schema.endpoint = normalize_path(&schema.endpoint);
            schema.method = schema.method.trim().to_ascii_uppercase();

            let existing = inner
                .endpoints
                .values()
                .find(|e| {
                    e.project_id == project_id
                        && e.path == schema.endpoint
                        && e.method == schema.method
                })
                .map(|e| e.id);
            let endpoint_id = match existing {
                Some(id) => id,
                None => {
                    let endpoint = Endpoint {
                        id: Uuid::new_v4(),
                        project_id,
                        path: schema.endpoint.clone(),
                        method: schema.method.clone(),
                    };
                    let id = endpoint.id;
                    inner.endpoints.insert(id, endpoint);
                    id
                }
            };

            let source = schema.source.as_str().to_string();
            let data = match serde_json::to_value(&schema) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode schema row, skipping");
                    continue;
                }
            };
            inner.schemas.insert(
                (endpoint_id, source.clone()),
                SchemaRow {
                    endpoint_id,
                    source,
                    data,
                    updated_at: Utc::now(),
                },
            );
        }
    }

    /// Raw row insert. Exists so tests can plant corrupt rows; `upsert_schemas`
    /// is the normal write path.
    pub fn insert_schema_row(&self, endpoint_id: Uuid, source: &str, data: Value) {
        if let Ok(mut inner) = self.inner.write() {
            inner.schemas.insert(
                (endpoint_id, source.to_string()),
                SchemaRow {
                    endpoint_id,
                    source: source.to_string(),
                    data,
                    updated_at: Utc::now(),
                },
            );
        }
    }

    pub fn get_endpoint(&self, id: Uuid) -> Option<Endpoint> {
        self.read(|inner| inner.endpoints.get(&id).cloned())
    }

    pub fn list_endpoints(&self, project_id: Uuid) -> Vec<EndpointWithSources> {
        let mut endpoints = self.read(|inner| {
            inner
                .endpoints
                .values()
                .filter(|e| e.project_id == project_id)
                .map(|e| {
                    let mut sources: Vec<String> = inner
                        .schemas
                        .values()
                        .filter(|row| row.endpoint_id == e.id)
                        .map(|row| row.source.clone())
                        .collect();
                    sources.sort();
                    EndpointWithSources {
                        endpoint: e.clone(),
                        sources,
                    }
                })
                .collect::<Vec<_>>()
        });
        endpoints.sort_by(|a, b| {
            (a.endpoint.path.as_str(), a.endpoint.method.as_str())
                .cmp(&(b.endpoint.path.as_str(), b.endpoint.method.as_str()))
        });
        endpoints
    }

    /// Decode the IR rows for one endpoint. A row that fails to decode is
    /// logged and skipped so a single corrupt row cannot fail the diff.
    pub fn schema_irs_for_endpoint(&self, endpoint_id: Uuid) -> Vec<SchemaIR> {
        let rows = self.read(|inner| {
            let mut rows: Vec<SchemaRow> = inner
                .schemas
                .values()
                .filter(|row| row.endpoint_id == endpoint_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.source.cmp(&b.source));
            rows
        });

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<SchemaIR>(row.data.clone()) {
                Ok(ir) => result.push(ir),
                Err(e) => {
                    tracing::warn!(
                        endpoint_id = %endpoint_id,
                        source = %row.source,
                        error = %e,
                        "skipping unparseable schema row",
                    );
                }
            }
        }
        result
    }

    pub fn record_diff(&self, endpoint_id: Uuid, result: &DiffResult) {
        let data = match serde_json::to_value(result) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode diff record");
                return;
            }
        };
        let sources_compared = result
            .sources_compared
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(":");
        if let Ok(mut inner) = self.inner.write() {
            inner.diffs.push(DiffRecord {
                endpoint_id,
                data,
                sources_compared,
                created_at: Utc::now(),
            });
        }
    }

    pub fn latest_diff(&self, endpoint_id: Uuid) -> Option<DiffRecord> {
        self.read(|inner| {
            inner
                .diffs
                .iter()
                .rev()
                .find(|d| d.endpoint_id == endpoint_id)
                .cloned()
        })
    }

    /// Diff-outcome counts over every endpoint of the given projects that
    /// has at least two decodable sources.
    pub fn stats(&self, project_ids: &[Uuid]) -> DiffStats {
        let mut stats = DiffStats::default();
        let endpoints: Vec<Endpoint> = self.read(|inner| {
            inner
                .endpoints
                .values()
                .filter(|e| project_ids.contains(&e.project_id))
                .cloned()
                .collect()
        });

        for endpoint in endpoints {
            let irs = self.schema_irs_for_endpoint(endpoint.id);
            if irs.len() < 2 {
                continue;
            }
            let result = crate::diff::compare(&endpoint.path, &endpoint.method, &irs);
            match result.status {
                crate::schema_ir::MatchStatus::Match => stats.matched += 1,
                crate::schema_ir::MatchStatus::Partial => stats.partial += 1,
                crate::schema_ir::MatchStatus::Violation => stats.violations += 1,
            }
        }
        stats
    }

    fn read<T: Default>(&self, f: impl FnOnce(&StoreInner) -> T) -> T {
        match self.inner.read() {
            Ok(inner) => f(&inner),
            Err(_) => {
                tracing::warn!("store lock poisoned during read");
                T::default()
            }
        }
    }
}
