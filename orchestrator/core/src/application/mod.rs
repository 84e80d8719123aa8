// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod change_hook;
pub mod deployment_monitor;
pub mod environment;
pub mod errors;
pub mod progress;
pub mod provisioning_orchestrator;
pub mod rollback;
pub mod service_factory;
pub mod trigger;

// Re-export use cases for convenience
pub use change_hook::ClientChangeHook;
pub use errors::{ProvisioningError, TriggerError};
pub use provisioning_orchestrator::{OrchestratorSettings, ProvisioningOrchestrator};
pub use service_factory::ProvisioningServices;
pub use trigger::{ProvisioningTrigger, TriggerOptions};
