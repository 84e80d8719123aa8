// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Laravel Forge Deployment Adapter
//
// Anti-Corruption Layer for the Forge API (server / VPS management).
//
// A "project" is a Forge site on a fixed server, so project ids are composite:
// `<server>:<site>`. Deployment ids additionally carry the newest server event
// id seen before the deploy was triggered (`<server>:<site>:<after>`), since
// Forge has no deployment object to poll. Status comes from the free-text
// descriptions of the server events that follow.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{check_response, http_client, parse_json, transport_error};
use crate::domain::deployment::{
    CreateProjectRequest, CreatedProject, DeployRequest, Deployment, DeploymentAdapter, DeploymentError,
    DeploymentId, DeploymentProvider, DeploymentState, DeploymentStatus, DomainConfiguration, ProjectId,
    ProjectInfo,
};
use crate::domain::dns::DnsRecord;
use crate::domain::provisioner_config::{resolve_secret, ForgeConfig};

const SITE_ROOT: &str = "/home/forge";

pub struct ForgeAdapter {
    client: reqwest::Client,
    api_url: String,
    token: String,
    server_id: u64,
    branch: String,
    server_ip: OnceCell<String>,
}

/// Parsed `<server>:<site>` project id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SiteRef {
    server_id: u64,
    site_id: u64,
}

impl SiteRef {
    fn parse(id: &str) -> Result<Self, DeploymentError> {
        let invalid = || DeploymentError::InvalidIdentifier(format!("'{}' is not a <server>:<site> id", id));
        let (server, site) = id.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            server_id: server.parse().map_err(|_| invalid())?,
            site_id: site.parse().map_err(|_| invalid())?,
        })
    }

    fn path(&self) -> String {
        format!("/servers/{}/sites/{}", self.server_id, self.site_id)
    }
}

impl fmt::Display for SiteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_id, self.site_id)
    }
}

/// Parsed `<server>:<site>:<after-event>` deployment id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeploymentRef {
    site: SiteRef,
    after_event: u64,
}

impl DeploymentRef {
    fn parse(id: &str) -> Result<Self, DeploymentError> {
        let invalid =
            || DeploymentError::InvalidIdentifier(format!("'{}' is not a <server>:<site>:<event> id", id));
        let (site, after) = id.rsplit_once(':').ok_or_else(invalid)?;
        Ok(Self {
            site: SiteRef::parse(site).map_err(|_| invalid())?,
            after_event: after.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for DeploymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.after_event)
    }
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: ForgeServer,
}

#[derive(Deserialize)]
struct ForgeServer {
    ip_address: String,
}

#[derive(Deserialize)]
struct SiteEnvelope {
    site: ForgeSite,
}

#[derive(Deserialize)]
struct ForgeSite {
    id: u64,
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    repository: Option<String>,
}

#[derive(Deserialize)]
struct ForgeEvent {
    id: u64,
    #[serde(default)]
    description: String,
}

/// Split `"Deployment finished (acme.example.com)"` into the message and the
/// site host Forge appends to server events.
fn split_event_description(description: &str) -> (&str, Option<&str>) {
    let trimmed = description.trim_end();
    if let Some(stripped) = trimmed.strip_suffix(')') {
        if let Some((message, host)) = stripped.rsplit_once('(') {
            let host = host.trim();
            if !host.is_empty() && !host.contains(char::is_whitespace) {
                return (message.trim_end(), Some(host));
            }
        }
    }
    (trimmed, None)
}

/// Infer a deployment state from a Forge event description.
/// Only the message is matched; the trailing `(host)` is ignored.
pub fn classify_deployment_description(description: &str) -> DeploymentState {
    const FAILURE: [&str; 4] = ["failed", "failure", "error", "unable to"];
    const CANCELED: [&str; 2] = ["cancelled", "canceled"];
    const SUCCESS: [&str; 4] = ["finished", "successful", "deployed", "completed"];
    const QUEUED: [&str; 2] = ["queued", "pending"];

    let (message, _) = split_event_description(description);
    let text = message.to_ascii_lowercase();
    let any = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

    if any(&FAILURE) {
        DeploymentState::Error
    } else if any(&CANCELED) {
        DeploymentState::Canceled
    } else if any(&SUCCESS) {
        DeploymentState::Ready
    } else if any(&QUEUED) {
        DeploymentState::Queued
    } else {
        DeploymentState::Building
    }
}

/// Render variables as a dotenv file, values double-quoted and escaped
pub fn render_env_file(variables: &BTreeMap<String, String>) -> String {
    let mut content = String::new();
    for (key, value) in variables {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$")
            .replace('\n', "\\n");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    content
}

/// Shell script Forge runs for each deployment
pub fn render_deploy_script(site_name: &str, branch: &str, build_command: Option<&str>) -> String {
    let build = build_command.unwrap_or("npm run build");
    format!(
        "set -e\n\
         cd {root}/{site}\n\
         git pull origin {branch}\n\
         npm ci\n\
         {build}\n\
         pm2 restart {site} --update-env || pm2 start npm --name {site} -- start\n",
        root = SITE_ROOT,
        site = site_name,
        branch = branch,
        build = build,
    )
}

impl ForgeAdapter {
    pub fn new(api_url: String, token: String, server_id: u64, branch: String) -> Self {
        Self {
            client: http_client(),
            api_url,
            token,
            server_id,
            branch,
            server_ip: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ForgeConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.api_url.clone(),
            resolve_secret(&config.token)?,
            config.server_id,
            config.branch.clone(),
        ))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
    }

    async fn server_ip(&self) -> Result<&str, DeploymentError> {
        let ip = self
            .server_ip
            .get_or_try_init(|| async {
                let path = format!("/servers/{}", self.server_id);
                let response = self
                    .request(reqwest::Method::GET, &path)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let envelope: ServerEnvelope = parse_json(check_response(response, "server").await?).await?;
                Ok::<_, DeploymentError>(envelope.server.ip_address)
            })
            .await?;
        Ok(ip.as_str())
    }

    async fn site(&self, site: SiteRef) -> Result<ForgeSite, DeploymentError> {
        let response = self
            .request(reqwest::Method::GET, &site.path())
            .send()
            .await
            .map_err(transport_error)?;
        let envelope: SiteEnvelope = parse_json(check_response(response, &site.to_string()).await?).await?;
        Ok(envelope.site)
    }

    async fn events(&self, server_id: u64) -> Result<Vec<ForgeEvent>, DeploymentError> {
        let path = format!("/servers/{}/events", server_id);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(transport_error)?;
        parse_json(check_response(response, "events").await?).await
    }

    async fn put_content(&self, path: &str, content: String, resource: &str) -> Result<(), DeploymentError> {
        let response = self
            .request(reqwest::Method::PUT, path)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, resource).await?;
        Ok(())
    }

    async fn install_repository(&self, site: SiteRef, git_url: &str) -> Result<(), DeploymentError> {
        let path = format!("{}/git", site.path());
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "provider": "custom", "repository": git_url, "branch": self.branch }))
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, &site.to_string()).await?;
        info!("Repository installed on Forge site {}", site);
        Ok(())
    }
}

#[async_trait]
impl DeploymentAdapter for ForgeAdapter {
    fn provider(&self) -> DeploymentProvider {
        DeploymentProvider::Forge
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<CreatedProject, DeploymentError> {
        let domain = request.domain.clone().unwrap_or_else(|| request.name.clone());
        let path = format!("/servers/{}/sites", self.server_id);
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "domain": domain, "project_type": "php", "directory": "/" }))
            .send()
            .await
            .map_err(transport_error)?;
        let envelope: SiteEnvelope = parse_json(check_response(response, "site").await?).await?;

        let site = SiteRef { server_id: self.server_id, site_id: envelope.site.id };
        let ip = self.server_ip().await?;
        info!("Forge site created: {} ({})", envelope.site.name, site);

        if !request.environment.is_empty() {
            self.put_content(&format!("{}/env", site.path()), render_env_file(&request.environment), &site.to_string())
                .await?;
        }

        Ok(CreatedProject {
            project_id: ProjectId::new(site.to_string()),
            project_url: format!("http://{}", ip),
        })
    }

    async fn deploy(&self, project_id: &ProjectId, request: &DeployRequest) -> Result<Deployment, DeploymentError> {
        let site_ref = SiteRef::parse(project_id.as_str())?;
        let site = self.site(site_ref).await?;
        let resource = site_ref.to_string();

        if site.repository.is_none() {
            match request.git_url.as_deref() {
                Some(git_url) => self.install_repository(site_ref, git_url).await?,
                None => warn!("Forge site {} has no repository and none was provided", site_ref),
            }
        }

        if !request.environment.is_empty() {
            self.put_content(&format!("{}/env", site_ref.path()), render_env_file(&request.environment), &resource)
                .await?;
        }
        let script = render_deploy_script(&site.name, &self.branch, request.build_command.as_deref());
        self.put_content(&format!("{}/deployment/script", site_ref.path()), script, &resource)
            .await?;

        let after_event = self
            .events(site_ref.server_id)
            .await?
            .iter()
            .map(|e| e.id)
            .max()
            .unwrap_or(0);

        let path = format!("{}/deployment/deploy", site_ref.path());
        let response = self
            .request(reqwest::Method::POST, &path)
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, &resource).await?;

        let deployment = DeploymentRef { site: site_ref, after_event };
        debug!("Forge deployment triggered: {}", deployment);
        Ok(Deployment {
            deployment_id: DeploymentId::new(deployment.to_string()),
            deployment_url: format!("http://{}", self.server_ip().await?),
            state: DeploymentState::Queued,
        })
    }

    async fn get_deployment_status(&self, deployment_id: &DeploymentId) -> Result<DeploymentStatus, DeploymentError> {
        let deployment = DeploymentRef::parse(deployment_id.as_str())?;
        let site = self.site(deployment.site).await?;
        // Server events cover every site on the server; keep this site's only
        let mut events: Vec<ForgeEvent> = self
            .events(deployment.site.server_id)
            .await?
            .into_iter()
            .filter(|e| e.id > deployment.after_event)
            .filter(|e| {
                matches!(split_event_description(&e.description), (_, Some(host)) if host.eq_ignore_ascii_case(&site.name))
            })
            .collect();
        events.sort_by_key(|e| e.id);

        let Some(latest) = events.last() else {
            return Ok(DeploymentStatus::new(DeploymentState::Queued));
        };

        let state = classify_deployment_description(&latest.description);
        let mut status = DeploymentStatus::new(state);
        match state {
            DeploymentState::Ready => status.url = Some(format!("http://{}", self.server_ip().await?)),
            DeploymentState::Error | DeploymentState::Canceled => status.error = Some(latest.description.clone()),
            _ => {}
        }
        Ok(status)
    }

    async fn configure_domain(
        &self,
        project_id: &ProjectId,
        domain: &str,
    ) -> Result<Option<DomainConfiguration>, DeploymentError> {
        let site = SiteRef::parse(project_id.as_str())?;
        let ip = self.server_ip().await?.to_string();

        let path = format!("{}/certificates/letsencrypt", site.path());
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "domains": [domain] }))
            .send()
            .await
            .map_err(transport_error)?;
        let configured = match check_response(response, &site.to_string()).await {
            Ok(_) => true,
            Err(e) if !matches!(e, DeploymentError::Authentication(_)) => {
                warn!("Let's Encrypt certificate request for {} failed: {}", domain, e);
                false
            }
            Err(e) => return Err(e),
        };

        Ok(Some(DomainConfiguration {
            domain: domain.to_string(),
            configured,
            dns_records: vec![DnsRecord::a(domain, ip)],
        }))
    }

    async fn update_environment_variables(
        &self,
        project_id: &ProjectId,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), DeploymentError> {
        let site = SiteRef::parse(project_id.as_str())?;
        self.put_content(&format!("{}/env", site.path()), render_env_file(variables), project_id.as_str())
            .await
    }

    async fn delete_project(&self, project_id: &ProjectId) -> Result<(), DeploymentError> {
        let site = SiteRef::parse(project_id.as_str())?;
        let response = self
            .request(reqwest::Method::DELETE, &site.path())
            .send()
            .await
            .map_err(transport_error)?;
        match check_response(response, project_id.as_str()).await {
            Ok(_) | Err(DeploymentError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_project(&self, project_id: &ProjectId) -> Result<ProjectInfo, DeploymentError> {
        let site_ref = SiteRef::parse(project_id.as_str())?;
        let site = self.site(site_ref).await?;
        Ok(ProjectInfo {
            id: project_id.clone(),
            url: format!("http://{}", site.name),
            status: site.status.unwrap_or_else(|| "unknown".to_string()),
            name: site.name,
        })
    }
}
