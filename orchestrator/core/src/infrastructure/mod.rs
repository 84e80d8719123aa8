// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod background_tasks;
pub mod db;
pub mod deployment;
pub mod dns;
pub mod event_bus;
pub mod neon;
pub mod notification;
pub mod repositories;

pub use event_bus::ProgressEventBus;
