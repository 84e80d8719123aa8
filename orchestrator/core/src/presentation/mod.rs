// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that translates external requests into application service
//! calls. No business logic lives here; all real work is delegated to
//! `crate::application`.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Liveness |
//! | `POST /api/clients/{id}/provision` | Run the provisioning trigger for one client |
//! | `GET /api/clients/{id}/events` | Server-Sent Events stream of progress events |

pub mod api;
