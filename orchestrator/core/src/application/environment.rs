// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Environment pushed to a deployed tenant site.
//!
//! The key names below are a contract with the deployed application: adding a
//! key is backward compatible, renaming one is a breaking change.

use rand_core::{OsRng, RngCore};
use std::collections::BTreeMap;

use crate::domain::provisioning::ProvisioningInput;

pub const SECRET_KEY: &str = "PAYLOAD_SECRET";
pub const DATABASE_URL_KEY: &str = "DATABASE_URI";
pub const PUBLIC_URL_KEY: &str = "NEXT_PUBLIC_SERVER_URL";
pub const CLIENT_ID_KEY: &str = "CLIENT_ID";
pub const CLIENT_NAME_KEY: &str = "CLIENT_NAME";
pub const SITE_NAME_KEY: &str = "SITE_NAME";
pub const PRIMARY_COLOR_KEY: &str = "PRIMARY_COLOR";

const SECRET_BYTES: usize = 32;

/// Random hex secret for the tenant application
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Deterministic base environment for a run, given its generated secret
pub fn base_environment(
    input: &ProvisioningInput,
    secret: &str,
    database_url: &str,
    public_url: &str,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(SECRET_KEY.to_string(), secret.to_string());
    env.insert(DATABASE_URL_KEY.to_string(), database_url.to_string());
    env.insert(PUBLIC_URL_KEY.to_string(), public_url.trim_end_matches('/').to_string());
    env.insert(CLIENT_ID_KEY.to_string(), input.client_id.to_string());
    env.insert(CLIENT_NAME_KEY.to_string(), input.client_name.clone());
    env.insert(SITE_NAME_KEY.to_string(), input.site_name().to_string());
    if let Some(color) = &input.site.primary_color {
        env.insert(PRIMARY_COLOR_KEY.to_string(), color.clone());
    }
    env
}

/// Caller overrides win on key collision
pub fn merge_overrides(
    mut base: BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    base.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    base
}

/// Full environment for a run
pub fn build_environment(
    input: &ProvisioningInput,
    secret: &str,
    database_url: &str,
    public_url: &str,
) -> BTreeMap<String, String> {
    merge_overrides(
        base_environment(input, secret, database_url, public_url),
        &input.environment_overrides,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deployment::DeploymentProvider;
    use crate::domain::provisioning::{ClientId, SiteConfig};

    fn input() -> ProvisioningInput {
        ProvisioningInput::new(ClientId::new("t1"), "Acme", "acme", DeploymentProvider::Vercel).with_site(SiteConfig {
            display_name: Some("Acme Shop".into()),
            primary_color: Some("#ff6600".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_base_environment_keys() {
        let env = base_environment(&input(), "s3cret", "postgres://db", "https://acme.example.com/");
        assert_eq!(env[SECRET_KEY], "s3cret");
        assert_eq!(env[DATABASE_URL_KEY], "postgres://db");
        assert_eq!(env[PUBLIC_URL_KEY], "https://acme.example.com");
        assert_eq!(env[CLIENT_ID_KEY], "t1");
        assert_eq!(env[CLIENT_NAME_KEY], "Acme");
        assert_eq!(env[SITE_NAME_KEY], "Acme Shop");
        assert_eq!(env[PRIMARY_COLOR_KEY], "#ff6600");
    }

    #[test]
    fn test_caller_override_wins() {
        let input = input()
            .with_environment_override(DATABASE_URL_KEY, "postgres://override")
            .with_environment_override("FEATURE_FLAG", "on");
        let env = build_environment(&input, "s3cret", "postgres://generated", "https://acme.example.com");
        assert_eq!(env[DATABASE_URL_KEY], "postgres://override");
        assert_eq!(env["FEATURE_FLAG"], "on");
        assert_eq!(env[SECRET_KEY], "s3cret");
    }

    #[test]
    fn test_primary_color_omitted_when_unset() {
        let input = ProvisioningInput::new(ClientId::new("t1"), "Acme", "acme", DeploymentProvider::Forge);
        let env = base_environment(&input, "s", "db", "https://x");
        assert!(!env.contains_key(PRIMARY_COLOR_KEY));
        assert_eq!(env[SITE_NAME_KEY], "Acme");
    }

    #[test]
    fn test_generated_secrets_are_unique_hex() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), SECRET_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
