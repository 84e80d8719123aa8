// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! DNS Configurator Domain Interface
//!
//! Creates or updates the record that points a tenant subdomain at its
//! deployment. DNS is convenience, not correctness: callers treat every
//! error from this interface as degraded, never fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    #[serde(rename = "CNAME")]
    Cname,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRecordType::A => "A",
            DnsRecordType::Cname => "CNAME",
        }
    }
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub record_type: DnsRecordType,
    /// Fully qualified record name
    pub name: String,
    /// IP address (A) or target hostname (CNAME)
    pub value: String,
}

impl DnsRecord {
    pub fn a(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self { record_type: DnsRecordType::A, name: name.into(), value: ip.into() }
    }

    pub fn cname(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self { record_type: DnsRecordType::Cname, name: name.into(), value: target.into() }
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.record_type, self.name, self.value)
    }
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsChange {
    Created,
    Updated,
    Unchanged,
}

#[async_trait]
pub trait DnsConfigurator: Send + Sync {
    /// Create the record, or update it in place when one with the same name and type exists
    async fn upsert_record(&self, record: &DnsRecord) -> Result<DnsChange, DnsError>;

    /// Best-effort check that public resolvers already answer with the record's value
    async fn verify_propagation(&self, record: &DnsRecord) -> Result<bool, DnsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("DNS provider error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
