// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Per-project live capture state: bounded buffers of observed requests,
//! subscriber fan-out, and self-capture bookkeeping.

use crate::infer::{infer_schema, CapturedRequest};
use crate::schema_ir::SchemaIR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Buffered capture of one HTTP exchange.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LiveRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Map<String, Value>>,
    /// Opaque label for where this capture came from (`self`, a proxy
    /// label, or whatever the ingesting client chose).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

impl LiveRequest {
    fn as_captured(&self) -> CapturedRequest {
        CapturedRequest {
            path: self.path.clone(),
            method: self.method.clone(),
            request_body: self.request_body.clone(),
            status_code: self.status_code,
            response: self.response_body.clone(),
            observation_count: 1,
        }
    }
}

/// Event fanned out to live subscribers.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveEvent {
    Request {
        payload: Box<LiveRequest>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        source: String,
    },
    Clear,
}

/// Buffer capacity per project. Oldest entries are evicted first.
pub const MAX_BUFFERED_PER_PROJECT: usize = 200;

/// Per-subscriber channel depth. Slow consumers drop events past this.
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 32;

struct Inner {
    buffers: HashMap<Uuid, VecDeque<LiveRequest>>,
    subscribers: HashMap<Uuid, HashMap<Uuid, mpsc::Sender<LiveEvent>>>,
    /// project → user that enabled self-capture for it
    captures: HashMap<Uuid, String>,
}

/// Process-local live capture service.
///
/// One `RwLock` guards all per-project state. `ingest` appends and
/// broadcasts under the write lock so every subscriber observes events in
/// append order. Broadcasting never blocks: full subscriber channels drop
/// the event for that subscriber only.
pub struct LiveService {
    inner: RwLock<Inner>,
    max_per_project: usize,
}

impl Default for LiveService {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveService {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFERED_PER_PROJECT)
    }

    /// Capacity override for tests exercising eviction.
    pub fn with_capacity(max_per_project: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                buffers: HashMap::new(),
                subscribers: HashMap::new(),
                captures: HashMap::new(),
            }),
            max_per_project,
        }
    }

    /// Append captures to the project buffer and fan them out.
    ///
    /// Empty ids get a fresh UUID, missing timestamps the current time.
    pub fn ingest(&self, project_id: Uuid, requests: Vec<LiveRequest>) {
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(_) => {
                tracing::warn!("live service lock poisoned during ingest");
                return;
            }
        };

        for mut req in requests {
            if req.id.is_empty() {
                req.id = Uuid::new_v4().to_string();
            }
            if req.timestamp.is_none() {
                req.timestamp = Some(Utc::now());
            }

            let event = LiveEvent::Request {
                payload: Box::new(req.clone()),
                source: req.source.clone(),
            };

            let buf = inner.buffers.entry(project_id).or_default();
            buf.push_back(req);
            if buf.len() > self.max_per_project {
                buf.pop_front();
            }

            Self::broadcast(&inner, project_id, event);
        }
    }

    /// Snapshot of the buffer in arrival order.
    pub fn get_recent(&self, project_id: Uuid) -> Vec<LiveRequest> {
        match self.inner.read() {
            Ok(inner) => inner
                .buffers
                .get(&project_id)
                .map(|b| b.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => {
                tracing::warn!("live service lock poisoned during read");
                Vec::new()
            }
        }
    }

    /// Snapshot filtered to one source label.
    pub fn get_by_source(&self, project_id: Uuid, source: &str) -> Vec<LiveRequest> {
        self.get_recent(project_id)
            .into_iter()
            .filter(|r| r.source == source)
            .collect()
    }

    /// Distinct non-empty source labels currently in the buffer, sorted.
    pub fn distinct_sources(&self, project_id: Uuid) -> Vec<String> {
        let mut sources: Vec<String> = self
            .get_recent(project_id)
            .into_iter()
            .filter(|r| !r.source.is_empty())
            .map(|r| r.source)
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Run runtime inference over the buffer, optionally restricted to one
    /// source label. Empty result when nothing is buffered.
    pub fn infer(&self, project_id: Uuid, source: Option<&str>) -> Vec<SchemaIR> {
        let snapshot = match source {
            Some(label) => self.get_by_source(project_id, label),
            None => self.get_recent(project_id),
        };
        if snapshot.is_empty() {
            return Vec::new();
        }
        let captured: Vec<CapturedRequest> = snapshot.iter().map(|r| r.as_captured()).collect();
        infer_schema(&captured)
    }

    /// Drop the project buffer and notify subscribers.
    pub fn clear(&self, project_id: Uuid) {
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(_) => {
                tracing::warn!("live service lock poisoned during clear");
                return;
            }
        };
        inner.buffers.remove(&project_id);
        Self::broadcast(&inner, project_id, LiveEvent::Clear);
    }

    /// Register a subscriber; returns its id and the receiving end.
    ///
    /// The receiver's lifetime belongs to the caller. The sender half is
    /// dropped (closing the channel) on `unsubscribe`.
    pub fn subscribe(&self, project_id: Uuid) -> (Uuid, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        match self.inner.write() {
            Ok(mut inner) => {
                inner.subscribers.entry(project_id).or_default().insert(id, tx);
            }
            Err(_) => {
                tracing::warn!("live service lock poisoned during subscribe");
            }
        }
        (id, rx)
    }

    pub fn unsubscribe(&self, project_id: Uuid, subscriber_id: Uuid) {
        match self.inner.write() {
            Ok(mut inner) => {
                if let Some(subs) = inner.subscribers.get_mut(&project_id) {
                    subs.remove(&subscriber_id);
                    if subs.is_empty() {
                        inner.subscribers.remove(&project_id);
                    }
                }
            }
            Err(_) => {
                tracing::warn!("live service lock poisoned during unsubscribe");
            }
        }
    }

    /// Enable self-capture of `user_id`'s traffic into `project_id`.
    pub fn start_capture(&self, project_id: Uuid, user_id: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.captures.insert(project_id, user_id.to_string());
        }
    }

    pub fn stop_capture(&self, project_id: Uuid) {
        if let Ok(mut inner) = self.inner.write() {
            inner.captures.remove(&project_id);
        }
    }

    /// The project this user is currently self-capturing into, if any.
    pub fn capturing_project_for(&self, user_id: &str) -> Option<Uuid> {
        match self.inner.read() {
            Ok(inner) => inner
                .captures
                .iter()
                .find(|(_, owner)| owner.as_str() == user_id)
                .map(|(project, _)| *project),
            Err(_) => None,
        }
    }

    /// The user self-capturing into this project, if any.
    pub fn capture_owner(&self, project_id: Uuid) -> Option<String> {
        match self.inner.read() {
            Ok(inner) => inner.captures.get(&project_id).cloned(),
            Err(_) => None,
        }
    }

    fn broadcast(inner: &Inner, project_id: Uuid, event: LiveEvent) {
        let Some(subs) = inner.subscribers.get(&project_id) else {
            return;
        };
        for tx in subs.values() {
            // non-blocking: a full or closed subscriber loses this event
            let _ = tx.try_send(event.clone());
        }
    }
}
