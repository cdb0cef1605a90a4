// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Reconciles backend-static, frontend-static, and runtime-observed views
//! of a REST API surface and reports where they disagree.
//!
//! The library provides the schema IR, the diff engine, runtime inference,
//! the live capture service, and the HTTP surface; main.rs remains the
//! binary entrypoint.

pub mod auth;
pub mod config;
pub mod diff;
pub mod infer;
pub mod live;
pub mod live_api;
pub mod proxy;
pub mod schema_ir;
pub mod server;
pub mod store;
pub mod test_helpers;
