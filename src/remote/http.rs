//! HTTP implementations of the remote contracts.

use crate::config::RemoteConfig;
use crate::error::ApiError;
use crate::remote::{
    extract_error_message, BuildClient, BuildRequest, ComputationResultClient,
    ModificationAction, ModificationClient, ProfileClient, ReportClient,
};
use crate::types::{ComputationType, GroupRef, ReportId, ResultId};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn map_http_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Upstream(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::Upstream(format!("Connection error: {}", error))
    } else {
        ApiError::Upstream(format!("HTTP error: {}", error))
    }
}

/// Turn a non-success response into an error carrying the extracted upstream message.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    Err(match status {
        StatusCode::BAD_REQUEST => ApiError::BadRequest(message),
        _ => ApiError::Upstream(format!("{} ({})", message, status)),
    })
}

/// Client for every collaborator, configured from [`RemoteConfig`].
pub struct HttpRemote {
    client: Client,
    modification_url: String,
    build_url: String,
    report_url: String,
    profile_url: String,
    computation_urls: HashMap<ComputationType, String>,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let mut computation_urls = HashMap::new();
        for (name, url) in &config.computation_urls {
            let kind = name
                .parse::<ComputationType>()
                .map_err(ApiError::ConfigError)?;
            computation_urls.insert(kind, trim_base(url));
        }

        Ok(Self {
            client,
            modification_url: trim_base(&config.modification_url),
            build_url: trim_base(&config.build_url),
            report_url: trim_base(&config.report_url),
            profile_url: trim_base(&config.profile_url),
            computation_urls,
        })
    }

    fn computation_url(&self, kind: ComputationType) -> Result<&str, ApiError> {
        self.computation_urls
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| ApiError::ConfigError(format!("No URL configured for {}", kind)))
    }

    fn group_url(&self, group: GroupRef) -> String {
        format!("{}/v1/groups/{}", self.modification_url, group)
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn ids_param(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ModificationClient for HttpRemote {
    async fn create_modification(
        &self,
        group: GroupRef,
        payload: Value,
    ) -> Result<Uuid, ApiError> {
        #[derive(Deserialize)]
        struct Created {
            id: Uuid,
        }
        let url = format!("{}/network-modifications", self.group_url(group));
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(map_http_error)?;
        let created: Created = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to parse response: {}", e)))?;
        Ok(created.id)
    }

    async fn update_modification(
        &self,
        group: GroupRef,
        modification_id: Uuid,
        payload: Value,
    ) -> Result<(), ApiError> {
        let url = format!(
            "{}/network-modifications/{}",
            self.group_url(group),
            modification_id
        );
        let response = self
            .client
            .put(&url)
            .json(&payload)
            .send()
            .await
            .map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }

    async fn delete_modifications(
        &self,
        group: GroupRef,
        modification_ids: &[Uuid],
    ) -> Result<(), ApiError> {
        let url = format!("{}/network-modifications", self.group_url(group));
        let response = self
            .client
            .delete(&url)
            .query(&[("uuids", ids_param(modification_ids))])
            .send()
            .await
            .map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }

    async fn move_or_copy(
        &self,
        action: ModificationAction,
        origin: GroupRef,
        target: GroupRef,
        modification_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, ApiError> {
        let url = format!("{}/network-modifications", self.group_url(target));
        let action = match action {
            ModificationAction::Move => "MOVE",
            ModificationAction::Copy => "COPY",
        };
        let response = self
            .client
            .put(&url)
            .query(&[("action", action.to_string()), ("originGroupUuid", origin.to_string())])
            .json(&json!(modification_ids))
            .send()
            .await
            .map_err(map_http_error)?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to parse response: {}", e)))
    }

    async fn reorder(
        &self,
        group: GroupRef,
        modification_id: Uuid,
        before: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let url = format!(
            "{}/network-modifications/{}/move",
            self.group_url(group),
            modification_id
        );
        let mut request = self.client.put(&url);
        if let Some(before) = before {
            request = request.query(&[("before", before.to_string())]);
        }
        let response = request.send().await.map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }

    async fn duplicate_group(&self, source: GroupRef) -> Result<GroupRef, ApiError> {
        let copy = Uuid::new_v4();
        let url = format!("{}/v1/groups", self.modification_url);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("groupUuid", copy.to_string()),
                ("duplicateFrom", source.to_string()),
            ])
            .send()
            .await
            .map_err(map_http_error)?;
        check(response).await?;
        Ok(copy)
    }

    async fn delete_group(&self, group: GroupRef) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.group_url(group))
            .send()
            .await
            .map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }

    async fn list_modifications(&self, group: GroupRef) -> Result<Vec<Uuid>, ApiError> {
        #[derive(Deserialize)]
        struct Listed {
            uuid: Uuid,
        }
        let url = format!("{}/network-modifications", self.group_url(group));
        let response = self
            .client
            .get(&url)
            .query(&[("onlyMetadata", "true")])
            .send()
            .await
            .map_err(map_http_error)?;
        let listed: Vec<Listed> = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to parse response: {}", e)))?;
        Ok(listed.into_iter().map(|m| m.uuid).collect())
    }
}

#[async_trait]
impl BuildClient for HttpRemote {
    async fn build(&self, request: BuildRequest) -> Result<(), ApiError> {
        let url = format!("{}/v1/networks/{}/build", self.build_url, request.network_id);
        debug!(build_id = %request.build_id, url = %url, "Dispatching build");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }

    async fn stop(&self, build_id: Uuid) -> Result<(), ApiError> {
        let url = format!("{}/v1/build/stop", self.build_url);
        let response = self
            .client
            .put(&url)
            .query(&[("receiver", build_id.to_string())])
            .send()
            .await
            .map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }
}

#[async_trait]
impl ComputationResultClient for HttpRemote {
    async fn delete_result(
        &self,
        kind: ComputationType,
        result_id: ResultId,
    ) -> Result<(), ApiError> {
        let url = format!("{}/v1/results/{}", self.computation_url(kind)?, result_id);
        let response = self.client.delete(&url).send().await.map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }

    async fn get_status(
        &self,
        kind: ComputationType,
        result_id: ResultId,
    ) -> Result<Option<String>, ApiError> {
        let url = format!(
            "{}/v1/results/{}/status",
            self.computation_url(kind)?,
            result_id
        );
        let response = self.client.get(&url).send().await.map_err(map_http_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = check(response)
            .await?
            .text()
            .await
            .map_err(map_http_error)?;
        let status = text.trim().trim_matches('"').to_string();
        Ok((!status.is_empty()).then_some(status))
    }
}

#[async_trait]
impl ReportClient for HttpRemote {
    async fn delete_report(&self, report_id: ReportId) -> Result<(), ApiError> {
        let url = format!("{}/v1/reports/{}", self.report_url, report_id);
        let response = self.client.delete(&url).send().await.map_err(map_http_error)?;
        check(response).await.map(|_| ())
    }
}

#[async_trait]
impl ProfileClient for HttpRemote {
    async fn max_builds(&self, user: &str) -> Result<Option<u32>, ApiError> {
        let url = format!("{}/v1/users/{}/profile/max-builds", self.profile_url, user);
        let response = self.client.get(&url).send().await.map_err(map_http_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Option<u32> = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to parse quota: {}", e)))?;
        Ok(body)
    }
}
