// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! JSON-over-HTTP client for a management-plane gateway.
//!
//! Every request carries the configured timeout, so a gateway that stops
//! answering surfaces as a transport failure instead of a stuck call.

use super::types::*;
use super::{ManagementPlane, PlaneError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Clone)]
pub struct GatewayClient {
    base: Url,
    token: Option<String>,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize, Deserialize)]
struct ReconfigureResponse {
    task: TaskHandle,
}

impl GatewayClient {
    pub fn new(mut base: Url, token: Option<String>, request_timeout: Duration) -> Result<Self, PlaneError> {
        if !matches!(base.scheme(), "http" | "https") {
            return Err(PlaneError::InvalidArgument(format!(
                "unsupported gateway scheme '{}', expected http or https",
                base.scheme()
            )));
        }
        if base.host_str().is_none() {
            return Err(PlaneError::InvalidArgument(format!(
                "gateway URL {} has no host",
                base
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PlaneError::InvalidArgument(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base,
            token,
            http_client,
        })
    }

    fn url(&self, path: &str) -> Result<Url, PlaneError> {
        self.base
            .join(path)
            .map_err(|e| PlaneError::InvalidArgument(format!("invalid request path {}: {}", path, e)))
    }

    async fn send<R: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<R, PlaneError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map_err(transport)?;
            return Err(classify_status(status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| PlaneError::Transport(format!("malformed gateway response: {}", e)))
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, PlaneError> {
        let url = self.url(path)?;
        debug!("GET {}", url);
        self.send(self.http_client.get(url)).await
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, payload: &B) -> Result<R, PlaneError> {
        let url = self.url(path)?;
        debug!("POST {}", url);
        self.send(self.http_client.post(url).json(payload)).await
    }
}

fn transport(err: reqwest::Error) -> PlaneError {
    if err.is_timeout() {
        PlaneError::Transport(format!("gateway request timed out: {}", err))
    } else {
        PlaneError::Transport(format!("gateway request failed: {}", err))
    }
}

/// Map a non-success HTTP status onto a plane error.
pub(crate) fn classify_status(status: StatusCode, body: &[u8]) -> PlaneError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());

    match status {
        StatusCode::NOT_FOUND => PlaneError::NotFound(message),
        StatusCode::CONFLICT => PlaneError::DuplicateName(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlaneError::InvalidArgument(message)
        }
        other => PlaneError::Transport(format!("{}: {}", other, message)),
    }
}

#[async_trait]
impl ManagementPlane for GatewayClient {
    #[instrument(skip(self))]
    async fn find_by_id(&self, kind: ObjectKind, id: &str) -> Result<Option<InventoryObject>, PlaneError> {
        match self.get_json(&format!("objects/{}/{}", kind, id)).await {
            Ok(object) => Ok(Some(object)),
            Err(PlaneError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn find_by_path(&self, query: &PathQuery) -> Result<Vec<InventoryObject>, PlaneError> {
        self.post_json("objects/find", query).await
    }

    #[instrument(skip(self, cluster), fields(cluster = %cluster))]
    async fn get_cluster_config(&self, cluster: &ManagedObjectRef) -> Result<ClusterConfigInfo, PlaneError> {
        self.get_json(&format!("clusters/{}/configuration", cluster.value))
            .await
    }

    #[instrument(skip(self, cluster, spec), fields(cluster = %cluster))]
    async fn reconfigure(&self, cluster: &ManagedObjectRef, spec: &ClusterConfigSpec) -> Result<TaskHandle, PlaneError> {
        let response: ReconfigureResponse = self
            .post_json(&format!("clusters/{}/reconfigure", cluster.value), spec)
            .await?;
        Ok(response.task)
    }

    async fn task_info(&self, task: &TaskHandle) -> Result<TaskInfo, PlaneError> {
        self.get_json(&format!("tasks/{}", task.0)).await
    }
}
