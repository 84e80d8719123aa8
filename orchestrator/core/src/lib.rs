// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tenant Provisioner Core
//!
//! Provisions a tenant site end-to-end: dedicated database, hosting project,
//! DNS, environment, deployment and the final write-back to the client record.
//!
//! # Architecture
//!
//! - **Domain:** provisioning model and the contracts of every external collaborator
//! - **Application:** the orchestrator, deployment monitor, rollback and trigger
//! - **Infrastructure:** Vercel / Forge / Cloudflare / Neon adapters, record stores
//! - **Presentation:** HTTP trigger route

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
