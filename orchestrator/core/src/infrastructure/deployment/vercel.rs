// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Vercel Deployment Adapter
//
// Anti-Corruption Layer for the Vercel REST API (serverless hosting).
// Project ids are Vercel's own opaque ids; deployments are redeploy-style
// triggers against the project's linked repository.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{check_response, http_client, parse_json, transport_error};
use crate::domain::deployment::{
    CreateProjectRequest, CreatedProject, DeployRequest, Deployment, DeploymentAdapter, DeploymentError,
    DeploymentId, DeploymentProvider, DeploymentState, DeploymentStatus, DomainConfiguration, ProjectId,
    ProjectInfo,
};
use crate::domain::dns::DnsRecord;
use crate::domain::provisioner_config::{resolve_secret, VercelConfig};

/// CNAME target Vercel expects for custom subdomains
pub const VERCEL_CNAME_TARGET: &str = "cname.vercel-dns.com";

const ENV_TARGETS: [&str; 3] = ["production", "preview", "development"];

pub struct VercelAdapter {
    client: reqwest::Client,
    api_url: String,
    token: String,
    team_id: Option<String>,
    framework: String,
}

#[derive(Deserialize)]
struct VercelProject {
    id: String,
    name: String,
    #[serde(default, rename = "latestDeployments")]
    latest_deployments: Vec<VercelDeployment>,
}

#[derive(Deserialize)]
struct VercelDeployment {
    #[serde(alias = "uid")]
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "readyState")]
    ready_state: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct VercelDomain {
    name: String,
    #[serde(default)]
    verified: bool,
}

#[derive(Serialize)]
struct VercelEnvVar<'a> {
    key: &'a str,
    value: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    target: [&'static str; 3],
}

impl VercelAdapter {
    pub fn new(api_url: String, token: String, team_id: Option<String>, framework: String) -> Self {
        Self {
            client: http_client(),
            api_url,
            token,
            team_id,
            framework,
        }
    }

    pub fn from_config(config: &VercelConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.api_url.clone(),
            resolve_secret(&config.token)?,
            config.team_id.clone(),
            config.framework.clone(),
        ))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url).bearer_auth(&self.token);
        match &self.team_id {
            Some(team_id) => builder.query(&[("teamId", team_id)]),
            None => builder,
        }
    }
}

fn map_ready_state(state: Option<&str>) -> DeploymentState {
    match state.map(str::to_ascii_uppercase).as_deref() {
        Some("READY") => DeploymentState::Ready,
        Some("ERROR") => DeploymentState::Error,
        Some("CANCELED") => DeploymentState::Canceled,
        Some("BUILDING") => DeploymentState::Building,
        _ => DeploymentState::Queued,
    }
}

fn https(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// `https://github.com/org/repo(.git)` into a Vercel git source
fn git_source(git_url: &str) -> Option<serde_json::Value> {
    let url = url::Url::parse(git_url).ok()?;
    let provider = match url.host_str()? {
        "github.com" => "github",
        "gitlab.com" => "gitlab",
        "bitbucket.org" => "bitbucket",
        _ => return None,
    };
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let org = segments.next()?;
    let repo = segments.next()?.trim_end_matches(".git");
    Some(json!({ "type": provider, "org": org, "repo": repo, "ref": "main" }))
}

#[async_trait]
impl DeploymentAdapter for VercelAdapter {
    fn provider(&self) -> DeploymentProvider {
        DeploymentProvider::Vercel
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<CreatedProject, DeploymentError> {
        let mut body = json!({ "name": request.name, "framework": self.framework });
        if !request.environment.is_empty() {
            body["environmentVariables"] = request
                .environment
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": value, "type": "encrypted", "target": ENV_TARGETS }))
                .collect();
        }

        let response = self
            .request(reqwest::Method::POST, "/v10/projects")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let project: VercelProject = parse_json(check_response(response, "project").await?).await?;

        info!("Vercel project created: {} ({})", project.name, project.id);
        Ok(CreatedProject {
            project_url: format!("https://{}.vercel.app", project.name),
            project_id: ProjectId::new(project.id),
        })
    }

    async fn deploy(&self, project_id: &ProjectId, request: &DeployRequest) -> Result<Deployment, DeploymentError> {
        // Deployments are named after the project, not its id
        let project = self.get_project(project_id).await?;
        let mut body = json!({
            "name": project.name,
            "project": project_id.as_str(),
            "target": "production",
        });
        if let Some(source) = request.git_url.as_deref().and_then(git_source) {
            body["gitSource"] = source;
        }

        let response = self
            .request(reqwest::Method::POST, "/v13/deployments")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let deployment: VercelDeployment =
            parse_json(check_response(response, project_id.as_str()).await?).await?;

        debug!("Vercel deployment {} queued", deployment.id);
        Ok(Deployment {
            deployment_url: deployment.url.as_deref().map(https).unwrap_or_default(),
            state: map_ready_state(deployment.ready_state.as_deref()),
            deployment_id: DeploymentId::new(deployment.id),
        })
    }

    async fn get_deployment_status(&self, deployment_id: &DeploymentId) -> Result<DeploymentStatus, DeploymentError> {
        let path = format!("/v13/deployments/{}", deployment_id);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(transport_error)?;
        let deployment: VercelDeployment =
            parse_json(check_response(response, deployment_id.as_str()).await?).await?;

        Ok(DeploymentStatus {
            state: map_ready_state(deployment.ready_state.as_deref()),
            url: deployment.url.as_deref().map(https),
            error: deployment.error_message,
        })
    }

    async fn configure_domain(
        &self,
        project_id: &ProjectId,
        domain: &str,
    ) -> Result<Option<DomainConfiguration>, DeploymentError> {
        let path = format!("/v10/projects/{}/domains", project_id);
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "name": domain }))
            .send()
            .await
            .map_err(transport_error)?;
        let attached: VercelDomain = parse_json(check_response(response, project_id.as_str()).await?).await?;

        Ok(Some(DomainConfiguration {
            dns_records: vec![DnsRecord::cname(&attached.name, VERCEL_CNAME_TARGET)],
            domain: attached.name,
            configured: attached.verified,
        }))
    }

    async fn update_environment_variables(
        &self,
        project_id: &ProjectId,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), DeploymentError> {
        if variables.is_empty() {
            return Ok(());
        }
        let body: Vec<VercelEnvVar<'_>> = variables
            .iter()
            .map(|(key, value)| VercelEnvVar { key, value, kind: "encrypted", target: ENV_TARGETS })
            .collect();

        let path = format!("/v10/projects/{}/env", project_id);
        let response = self
            .request(reqwest::Method::POST, &path)
            .query(&[("upsert", "true")])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, project_id.as_str()).await?;
        Ok(())
    }

    async fn delete_project(&self, project_id: &ProjectId) -> Result<(), DeploymentError> {
        let path = format!("/v9/projects/{}", project_id);
        let response = self
            .request(reqwest::Method::DELETE, &path)
            .send()
            .await
            .map_err(transport_error)?;
        match check_response(response, project_id.as_str()).await {
            Ok(_) | Err(DeploymentError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_project(&self, project_id: &ProjectId) -> Result<ProjectInfo, DeploymentError> {
        let path = format!("/v9/projects/{}", project_id);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(transport_error)?;
        let project: VercelProject = parse_json(check_response(response, project_id.as_str()).await?).await?;

        let status = project
            .latest_deployments
            .first()
            .map(|d| map_ready_state(d.ready_state.as_deref()).as_str())
            .unwrap_or("none");
        Ok(ProjectInfo {
            url: format!("https://{}.vercel.app", project.name),
            status: status.to_string(),
            id: ProjectId::new(project.id),
            name: project.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn adapter(server: &mockito::ServerGuard) -> VercelAdapter {
        VercelAdapter::new(server.url(), "tok".into(), Some("team_1".into()), "nextjs".into())
    }

    #[tokio::test]
    async fn test_create_project_and_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/v10/projects")
            .match_query(Matcher::UrlEncoded("teamId".into(), "team_1".into()))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"id":"prj_123","name":"acme"}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/v13/deployments/dpl_1")
            .match_query(Matcher::Any)
            .with_body(r#"{"id":"dpl_1","url":"acme-abc.vercel.app","readyState":"READY"}"#)
            .create_async()
            .await;

        let adapter = adapter(&server);
        let project = adapter
            .create_project(&CreateProjectRequest { name: "acme".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(project.project_id.as_str(), "prj_123");
        assert_eq!(project.project_url, "https://acme.vercel.app");

        let deployment = adapter.get_deployment_status(&DeploymentId::new("dpl_1")).await.unwrap();
        assert_eq!(deployment.state, DeploymentState::Ready);
        assert_eq!(deployment.url.as_deref(), Some("https://acme-abc.vercel.app"));

        create.assert_async().await;
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_deploy_uses_project_name() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v9/projects/prj_123")
            .with_body(r#"{"id": "prj_123", "name": "acme-example-com", "latestDeployments": []}"#)
            .create_async()
            .await;
        let deploy = server
            .mock("POST", "/v13/deployments")
            .match_body(Matcher::PartialJson(json!({
                "name": "acme-example-com",
                "project": "prj_123",
                "target": "production"
            })))
            .with_body(r#"{"id": "dpl_9", "url": "acme-example-com-abc.vercel.app", "readyState": "QUEUED"}"#)
            .expect(1)
            .create_async()
            .await;

        let deployment = adapter(&server)
            .deploy(&ProjectId::new("prj_123"), &DeployRequest::default())
            .await
            .unwrap();

        assert_eq!(deployment.deployment_id.as_str(), "dpl_9");
        assert_eq!(deployment.deployment_url, "https://acme-example-com-abc.vercel.app");
        assert_eq!(deployment.state, DeploymentState::Queued);
        deploy.assert_async().await;
    }

    #[tokio::test]
    async fn test_env_upsert_targets_every_environment() {
        let mut server = mockito::Server::new_async().await;
        let env = server
            .mock("POST", "/v10/projects/prj_123/env")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("upsert".into(), "true".into()),
                Matcher::UrlEncoded("teamId".into(), "team_1".into()),
            ]))
            .match_body(Matcher::PartialJson(json!([
                { "key": "PAYLOAD_SECRET", "value": "s3cret", "target": ["production", "preview", "development"] }
            ])))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let mut variables = BTreeMap::new();
        variables.insert("PAYLOAD_SECRET".to_string(), "s3cret".to_string());
        adapter(&server)
            .update_environment_variables(&ProjectId::new("prj_123"), &variables)
            .await
            .unwrap();
        env.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v13/deployments/dpl_limited")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;
        server
            .mock("GET", "/v13/deployments/dpl_denied")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;
        server
            .mock("DELETE", "/v9/projects/prj_gone")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let adapter = adapter(&server);
        let limited = adapter.get_deployment_status(&DeploymentId::new("dpl_limited")).await;
        assert!(matches!(limited, Err(DeploymentError::RateLimited)));
        let denied = adapter.get_deployment_status(&DeploymentId::new("dpl_denied")).await;
        assert!(matches!(denied, Err(DeploymentError::Authentication(_))));
        assert!(adapter.delete_project(&ProjectId::new("prj_gone")).await.is_ok());
    }

    #[tokio::test]
    async fn test_configure_domain_returns_cname() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v10/projects/prj_123/domains")
            .match_query(Matcher::Any)
            .with_body(r#"{"name":"acme.sites.example.com","verified":false}"#)
            .create_async()
            .await;

        let configuration = adapter(&server)
            .configure_domain(&ProjectId::new("prj_123"), "acme.sites.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!configuration.configured);
        assert_eq!(
            configuration.dns_records,
            vec![DnsRecord::cname("acme.sites.example.com", VERCEL_CNAME_TARGET)]
        );
    }

    #[test]
    fn test_git_source() {
        let source = git_source("https://github.com/acme/site-template.git").unwrap();
        assert_eq!(source["org"], "acme");
        assert_eq!(source["repo"], "site-template");
        assert!(git_source("https://example.com/acme/site").is_none());
    }

    #[test]
    fn test_ready_state_mapping() {
        assert_eq!(map_ready_state(Some("INITIALIZING")), DeploymentState::Queued);
        assert_eq!(map_ready_state(Some("BUILDING")), DeploymentState::Building);
        assert_eq!(map_ready_state(Some("CANCELED")), DeploymentState::Canceled);
        assert_eq!(map_ready_state(None), DeploymentState::Queued);
    }
}
