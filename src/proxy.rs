// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Reverse-proxy capture targets: SSRF validation, configure-time IP
//! pinning, and request forwarding.

use bytes::Bytes;
use reqwest::Url;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::RwLock;
use uuid::Uuid;

/// A configured proxy destination for one (project, label).
///
/// The client inside dials the IP resolved at configure time, never
/// re-resolving, so a DNS record that later flips to a private address
/// cannot redirect forwarded traffic. The Host header and TLS SNI still
/// carry the original hostname.
#[derive(Clone)]
pub struct ProxyTarget {
    pub label: String,
    pub url: Url,
    pub resolved_ip: IpAddr,
    client: reqwest::Client,
}

/// Why a proxy target was refused.
#[derive(Debug, thiserror::Error)]
pub enum ProxyConfigError {
    #[error("invalid target URL")]
    InvalidUrl,
    #[error("proxy target not allowed: {0}")]
    NotAllowed(String),
    #[error("cannot resolve host: {0}")]
    Resolve(String),
}

impl ProxyTarget {
    /// Build a target pinned to an already-validated address.
    pub fn pinned(label: &str, url: Url, resolved_ip: IpAddr) -> anyhow::Result<Self> {
        let host = url
            .host_str()
            .unwrap_or_default()
            .trim_matches(['[', ']'])
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let client = reqwest::Client::builder()
            .resolve(&host, SocketAddr::new(resolved_ip, port))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            label: label.to_string(),
            url,
            resolved_ip,
            client,
        })
    }

    /// Forward one request to the target, rewriting path and query.
    ///
    /// Any transport failure surfaces as an error for the caller to
    /// translate into a 502.
    pub async fn forward(
        &self,
        method: &str,
        downstream_path: &str,
        query: Option<&str>,
        headers: &hyper::HeaderMap,
        body: Bytes,
    ) -> anyhow::Result<ForwardedResponse> {
        let mut url = self.url.clone();
        url.set_path(downstream_path);
        url.set_query(query);

        let method = reqwest::Method::from_bytes(method.as_bytes())?;
        let mut req = self.client.request(method, url).body(body.to_vec());
        for (name, value) in headers {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            req = req.header(name.as_str(), value.as_bytes());
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let mut out_headers = Vec::new();
        for (name, value) in resp.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            out_headers.push((name.as_str().to_string(), value.as_bytes().to_vec()));
        }
        let body = resp.bytes().await?;

        Ok(ForwardedResponse {
            status,
            headers: out_headers,
            body: Bytes::from(body.to_vec()),
        })
    }
}

/// Upstream response surfaced back to the proxy handler.
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Bytes,
}

/// Headers that belong to a single hop and must not be forwarded, plus the
/// ones the outbound client recomputes itself.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "proxy-connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

/// True for addresses in the private/reserved set a capture proxy must
/// never dial: 10/8, 172.16/12, 192.168/16, 127/8, 169.254/16, ::1/128,
/// fc00::/7, fe80::/10.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            v4.is_loopback()
                || v4.is_link_local()
                || o[0] == 10
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            v6.is_loopback()
                || (s[0] & 0xfe00) == 0xfc00 // unique local, fc00::/7
                || (s[0] & 0xffc0) == 0xfe80 // link local, fe80::/10
        }
    }
}

/// Validate a proxy target URL and resolve it to a pinned public address.
///
/// Rejects empty or denylisted hosts, non-HTTP schemes, and any target
/// whose resolution set contains a private/reserved address. One private
/// record poisons the whole set.
pub async fn validate_proxy_target(url: &Url) -> Result<IpAddr, ProxyConfigError> {
    let host = url.host_str().unwrap_or_default();
    if host.is_empty() {
        return Err(ProxyConfigError::NotAllowed("empty host".to_string()));
    }
    if host == "localhost" || host == "0.0.0.0" || host == "[::1]" {
        return Err(ProxyConfigError::NotAllowed(
            "localhost targets are not allowed".to_string(),
        ));
    }
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ProxyConfigError::NotAllowed(
            "only http and https schemes are allowed".to_string(),
        ));
    }

    let bare_host = host.trim_matches(['[', ']']);
    let port = url.port_or_known_default().unwrap_or(80);

    let ips: Vec<IpAddr> = if let Ok(literal) = bare_host.parse::<IpAddr>() {
        vec![literal]
    } else {
        tokio::net::lookup_host((bare_host, port))
            .await
            .map_err(|e| ProxyConfigError::Resolve(e.to_string()))?
            .map(|addr| addr.ip())
            .collect()
    };

    let mut pinned = None;
    for ip in ips {
        if is_private_ip(ip) {
            return Err(ProxyConfigError::NotAllowed(
                "target resolves to a private/reserved IP address".to_string(),
            ));
        }
        if pinned.is_none() {
            pinned = Some(ip);
        }
    }
    pinned.ok_or_else(|| ProxyConfigError::Resolve("no addresses".to_string()))
}

/// Registry of configured proxy targets, keyed by (project, label).
///
/// Targets live for the process lifetime only; reconfiguring the same
/// (project, label) replaces the previous target.
#[derive(Default)]
pub struct ProxyRegistry {
    targets: RwLock<HashMap<(Uuid, String), ProxyTarget>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, pin, and store a target. Returns the pinned address.
    pub async fn configure(
        &self,
        project_id: Uuid,
        label: &str,
        raw_url: &str,
    ) -> Result<IpAddr, ProxyConfigError> {
        let url = Url::parse(raw_url).map_err(|_| ProxyConfigError::InvalidUrl)?;
        let resolved = validate_proxy_target(&url).await?;
        let target = ProxyTarget::pinned(label, url, resolved)
            .map_err(|e| ProxyConfigError::Resolve(e.to_string()))?;
        self.insert(project_id, target);
        Ok(resolved)
    }

    /// Store a pre-built target, replacing any previous one for the key.
    /// Validation happens in `configure`; tests may insert directly.
    pub fn insert(&self, project_id: Uuid, target: ProxyTarget) {
        match self.targets.write() {
            Ok(mut targets) => {
                targets.insert((project_id, target.label.clone()), target);
            }
            Err(_) => {
                tracing::warn!("proxy registry lock poisoned during insert");
            }
        }
    }

    pub fn get(&self, project_id: Uuid, label: &str) -> Option<ProxyTarget> {
        match self.targets.read() {
            Ok(targets) => targets.get(&(project_id, label.to_string())).cloned(),
            Err(_) => {
                tracing::warn!("proxy registry lock poisoned during read");
                None
            }
        }
    }
}
