use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::{
    daemon::{accumulator::TimeReport, focus::categories::CategoryMap},
    domain::Domain,
};

use super::{
    responses::{AlertResponse, Category, CategoryMapResponse, FocusStatus},
    TrackerApi,
};

const USER_HEADER: &str = "X-Usuario-ID";

pub struct HttpTrackerApi {
    client: Client,
    base_url: String,
}

impl HttpTrackerApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // The dashboard authenticates with a session cookie, keep whatever the server sets.
        let client = Client::builder().timeout(timeout).cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("server answered {status}: {body}"));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        Ok(Self::send(request).await?.json::<T>().await?)
    }
}

#[async_trait]
impl TrackerApi for HttpTrackerApi {
    async fn log_time(&self, report: TimeReport) -> Result<()> {
        let form = [
            ("dominio", report.domain.to_string()),
            ("tiempo", report.delta_seconds.to_string()),
            (
                "fecha_hora",
                report.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            (
                "timezone_offset_min",
                report.timezone_offset_min.to_string(),
            ),
        ];
        Self::send(self.client.post(self.url("admin/guardar")).form(&form)).await?;
        debug!("Logged {}s for {}", report.delta_seconds, report.domain);
        Ok(())
    }

    async fn fetch_category_map(&self) -> Result<CategoryMap> {
        let response: CategoryMapResponse =
            Self::send_json(self.client.get(self.url("api/categorias/con-dominios"))).await?;
        match response {
            CategoryMapResponse {
                success: true,
                mapping: Some(mapping),
                total_domains,
            } => {
                debug!("Server reports {total_domains:?} categorised domains");
                Ok(mapping.into_iter().collect())
            }
            _ => Err(anyhow!("category map response has no mapping")),
        }
    }

    async fn fetch_focus_status(&self) -> Result<FocusStatus> {
        Self::send_json(self.client.get(self.url("api/focus/status"))).await
    }

    async fn report_skip(&self, domain: Domain, category: Option<Arc<str>>) -> Result<()> {
        Self::send(
            self.client
                .post(self.url("api/focus/skip-block"))
                .json(&json!({ "domain": domain, "category": category })),
        )
        .await?;
        Ok(())
    }

    async fn fetch_categories(&self, user_id: u64) -> Result<Vec<Category>> {
        Self::send_json(
            self.client
                .get(self.url("api/categorias"))
                .header(USER_HEADER, user_id.to_string()),
        )
        .await
    }

    async fn check_category_alert(&self, user_id: u64, category_id: i64) -> Result<AlertResponse> {
        Self::send_json(
            self.client
                .post(self.url("api/alerta_dominio"))
                .header(USER_HEADER, user_id.to_string())
                .json(&json!({ "categoria_id": category_id })),
        )
        .await
    }

    async fn check_domain_alert(&self, user_id: u64, domain: Domain) -> Result<AlertResponse> {
        Self::send_json(
            self.client
                .post(self.url("api/alerta_dominio"))
                .header(USER_HEADER, user_id.to_string())
                .json(&json!({ "dominio": domain })),
        )
        .await
    }
}
