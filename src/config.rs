// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Runtime configuration from flags and environment.

use crate::auth::{PermissiveVerifier, StaticTokenVerifier, TokenVerifier};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(name = "drift-http")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Database connection string (required; the persistence collaborator
    /// owns it)
    #[arg(long, env = "DATABASE_URL", default_value = "")]
    pub database_url: String,

    /// Key for secrets-at-rest encryption; absent means plaintext
    #[arg(long, env = "ENCRYPTION_KEY", default_value = "")]
    pub encryption_key: String,

    /// Pre-shared bearer token; absent enables permissive dev auth
    #[arg(long, env = "AUTH_TOKEN", default_value = "")]
    pub auth_token: String,

    /// Deployment environment label
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }

    /// The identity provider this deployment runs with.
    pub fn verifier(&self) -> Arc<dyn TokenVerifier> {
        if self.auth_token.is_empty() {
            Arc::new(PermissiveVerifier)
        } else {
            Arc::new(StaticTokenVerifier::new(&self.auth_token))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("drift-http").chain(args.iter().copied()))
            .expect("parse config")
    }

    #[test]
    fn defaults_apply_without_flags() {
        let cfg = parse(&[]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.listen_addr().port(), 8080);
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = parse(&["--port", "9090", "--auth-token", "tok"]);
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.auth_token, "tok");
    }

    #[test]
    fn verifier_mode_follows_auth_token_presence() {
        let dev = parse(&[]);
        assert_eq!(dev.verifier().verify("anything").as_deref(), Some("anything"));

        let locked = parse(&["--auth-token", "tok"]);
        assert_eq!(locked.verifier().verify("tok").as_deref(), Some("local"));
        assert!(locked.verifier().verify("other").is_none());
    }
}
