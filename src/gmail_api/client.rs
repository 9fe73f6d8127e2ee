use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bootstrap::ProviderEndpoints;
use crate::error::{GmailError, Result};
use crate::types::AccessToken;

/// HTTP access to the provider. Cheap to clone; holds no token.
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    endpoints: ProviderEndpoints,
}

impl GmailClient {
    pub fn new(http: reqwest::Client, endpoints: ProviderEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// GET `{api_base}/users/me/{path}` with the token as bearer and the API key, if any.
    pub(crate) fn user_get(&self, token: &AccessToken, path: &str) -> RequestBuilder {
        let url = format!("{}/users/me/{}", self.endpoints.api_base, path);
        let request = self.http.get(url).bearer_auth(token.as_str());
        match &self.endpoints.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }

    /// Probe the token-introspection endpoint. Any non-success status means "invalid".
    pub async fn is_token_valid(
        &self,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let request = self
            .http
            .get(&self.endpoints.token_info_url)
            .query(&[("access_token", token.as_str())]);
        let response = send_cancellable(request, cancel).await?;
        let valid = response.status().is_success();
        debug!(status = %response.status(), valid, "token introspection");
        Ok(valid)
    }

    pub async fn revoke(&self, token: &AccessToken) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoints.revoke_url)
            .form(&[("token", token.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Send a request unless `cancel` fires first. Dropping the send future aborts the request.
pub(crate) async fn send_cancellable(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<Response> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GmailError::Cancelled),
        response = request.send() => Ok(response?),
    }
}

/// Send a request and decode its JSON body, both under `cancel`.
///
/// The body read sits inside the same race as the send, so cancelling also drops a response
/// that is still downloading.
pub(crate) async fn fetch_json_cancellable<T: DeserializeOwned>(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T> {
    let exchange = async {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(error_from_response(response).await)
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GmailError::Cancelled),
        result = exchange => result,
    }
}

/// 401 means the token went stale mid-flight; everything else is reported verbatim.
pub(crate) async fn error_from_response(response: Response) -> GmailError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return GmailError::InvalidToken;
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    GmailError::Api {
        status: status.as_u16(),
        body,
    }
}
