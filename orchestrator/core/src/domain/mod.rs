// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: provisioning model and collaborator contracts.

pub mod client;
pub mod database;
pub mod deployment;
pub mod dns;
pub mod events;
pub mod notification;
pub mod provisioner_config;
pub mod provisioning;
pub mod repository;
