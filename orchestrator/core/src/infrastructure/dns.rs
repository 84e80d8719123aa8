// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Cloudflare DNS Configurator
//
// Upserts A/CNAME records in a single Cloudflare zone and checks propagation
// through a DNS-over-HTTPS resolver (JSON wire format).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::dns::{DnsChange, DnsConfigurator, DnsError, DnsRecord, DnsRecordType};
use crate::domain::provisioner_config::{resolve_secret, CloudflareConfig};

pub struct CloudflareDnsConfigurator {
    client: reqwest::Client,
    api_url: String,
    doh_url: String,
    token: String,
    zone_id: String,
    proxied: bool,
}

#[derive(Deserialize)]
struct CloudflareEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareMessage>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct CloudflareMessage {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ExistingRecord {
    id: String,
    content: String,
    #[serde(default)]
    proxied: bool,
}

#[derive(Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Deserialize)]
struct DohAnswer {
    data: String,
}

impl CloudflareDnsConfigurator {
    pub fn new(api_url: String, doh_url: String, token: String, zone_id: String, proxied: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            doh_url,
            token,
            zone_id,
            proxied,
        }
    }

    pub fn from_config(config: &CloudflareConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.api_url.clone(),
            config.doh_url.clone(),
            resolve_secret(&config.token)?,
            config.zone_id.clone(),
            config.proxied,
        ))
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_url.trim_end_matches('/'), self.zone_id)
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, DnsError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DnsError::Network(e.to_string()))?;

        let status = response.status();
        if status == 401 || status == 403 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DnsError::Authentication(error_text));
        }

        let envelope: CloudflareEnvelope<T> = response
            .json()
            .await
            .map_err(|e| DnsError::Api { code: i64::from(status.as_u16()), message: e.to_string() })?;

        match (envelope.success, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => {
                let (code, message) = envelope
                    .errors
                    .into_iter()
                    .next()
                    .map(|e| (e.code, e.message))
                    .unwrap_or_else(|| (i64::from(status.as_u16()), format!("HTTP {}", status)));
                Err(DnsError::Api { code, message })
            }
        }
    }
}

#[async_trait]
impl DnsConfigurator for CloudflareDnsConfigurator {
    async fn upsert_record(&self, record: &DnsRecord) -> Result<DnsChange, DnsError> {
        if record.name.is_empty() || record.value.is_empty() {
            return Err(DnsError::InvalidRecord(record.to_string()));
        }
        let record_type = record.record_type.as_str();

        let existing: Vec<ExistingRecord> = self
            .send(
                self.client
                    .get(self.records_url())
                    .query(&[("type", record_type), ("name", record.name.as_str())]),
            )
            .await?;

        let body = RecordBody {
            record_type,
            name: &record.name,
            content: &record.value,
            ttl: 1,
            proxied: self.proxied,
        };

        match existing.first() {
            Some(current) if current.content.eq_ignore_ascii_case(&record.value) && current.proxied == self.proxied => {
                debug!("DNS record unchanged: {}", record);
                Ok(DnsChange::Unchanged)
            }
            Some(current) => {
                let url = format!("{}/{}", self.records_url(), current.id);
                let _: serde_json::Value = self.send(self.client.put(url).json(&body)).await?;
                info!("DNS record updated: {}", record);
                Ok(DnsChange::Updated)
            }
            None => {
                let _: serde_json::Value = self.send(self.client.post(self.records_url()).json(&body)).await?;
                info!("DNS record created: {}", record);
                Ok(DnsChange::Created)
            }
        }
    }

    async fn verify_propagation(&self, record: &DnsRecord) -> Result<bool, DnsError> {
        let record_type = record.record_type.as_str();
        let response = self
            .client
            .get(&self.doh_url)
            .query(&[("name", record.name.as_str()), ("type", record_type)])
            .header("Accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| DnsError::Network(e.to_string()))?;
        let answer: DohResponse = response
            .json()
            .await
            .map_err(|e| DnsError::Network(format!("invalid DNS-over-HTTPS response: {}", e)))?;

        // NOERROR only; proxied records answer with edge addresses instead
        if answer.status != 0 {
            return Ok(false);
        }
        if self.proxied && record.record_type == DnsRecordType::A {
            return Ok(!answer.answer.is_empty());
        }
        let expected = record.value.trim_end_matches('.');
        Ok(answer
            .answer
            .iter()
            .any(|a| a.data.trim_end_matches('.').eq_ignore_ascii_case(expected)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn configurator(server: &mockito::ServerGuard) -> CloudflareDnsConfigurator {
        CloudflareDnsConfigurator::new(
            server.url(),
            format!("{}/dns-query", server.url()),
            "tok".into(),
            "zone1".into(),
            false,
        )
    }

    #[tokio::test]
    async fn test_upsert_creates_missing_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/zones/zone1/dns_records")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "CNAME".into()),
                Matcher::UrlEncoded("name".into(), "acme.example.com".into()),
            ]))
            .with_body(r#"{"success": true, "errors": [], "result": []}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/zones/zone1/dns_records")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "type": "CNAME", "name": "acme.example.com", "content": "cname.vercel-dns.com"
            })))
            .with_body(r#"{"success": true, "errors": [], "result": {"id": "rec1"}}"#)
            .create_async()
            .await;

        let change = configurator(&server)
            .upsert_record(&DnsRecord::cname("acme.example.com", "cname.vercel-dns.com"))
            .await
            .unwrap();
        assert_eq!(change, DnsChange::Created);
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_upsert_updates_or_skips_existing_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/zones/zone1/dns_records")
            .match_query(Matcher::Any)
            .with_body(r#"{"success": true, "result": [{"id": "rec1", "content": "203.0.113.1", "proxied": false}]}"#)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/zones/zone1/dns_records/rec1")
            .with_body(r#"{"success": true, "result": {"id": "rec1"}}"#)
            .expect(1)
            .create_async()
            .await;

        let dns = configurator(&server);
        let changed = dns.upsert_record(&DnsRecord::a("acme.example.com", "203.0.113.7")).await.unwrap();
        assert_eq!(changed, DnsChange::Updated);
        let same = dns.upsert_record(&DnsRecord::a("acme.example.com", "203.0.113.1")).await.unwrap();
        assert_eq!(same, DnsChange::Unchanged);
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_errors_surface_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/zones/zone1/dns_records")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"success": false, "errors": [{"code": 7003, "message": "Could not route"}], "result": null}"#)
            .create_async()
            .await;

        let result = configurator(&server).upsert_record(&DnsRecord::a("acme.example.com", "203.0.113.7")).await;
        assert!(matches!(result, Err(DnsError::Api { code: 7003, .. })));
    }

    #[tokio::test]
    async fn test_verify_propagation_via_doh() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/dns-query")
            .match_query(Matcher::UrlEncoded("name".into(), "acme.example.com".into()))
            .match_header("accept", "application/dns-json")
            .with_body(r#"{"Status": 0, "Answer": [{"name": "acme.example.com.", "type": 5, "data": "cname.vercel-dns.com."}]}"#)
            .create_async()
            .await;

        let dns = configurator(&server);
        assert!(dns
            .verify_propagation(&DnsRecord::cname("acme.example.com", "cname.vercel-dns.com"))
            .await
            .unwrap());
        assert!(!dns
            .verify_propagation(&DnsRecord::cname("acme.example.com", "other.example.net"))
            .await
            .unwrap());
    }
}
