//! HTTP transport for a REST backend.
//!
//! Each resource lives under `{base_url}/{resource path}`: `GET` lists,
//! `POST` creates (one object or an array), `PUT /{id}` replaces,
//! `DELETE /{id}` removes and `DELETE ?id[$in][]=…` removes in bulk.

use core::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

use super::Transport;
use crate::error::{LedgerError, RemoteError, RemoteErrorKind, Result};
use crate::models::Resource;

/// Default service URL.
const DEFAULT_BASE_URL: &str = "http://localhost:3030";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Query key used for bulk removal by id.
const ID_IN_QUERY: &str = "id[$in][]";

/// Builder for constructing an [`HttpTransport`].
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    /// Access token for API authentication.
    token: Option<SecretString>,
    /// Base URL override.
    base_url: Option<String>,
    /// Per-request timeout override.
    timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    /// Sets the access token for API authentication.
    #[inline]
    #[must_use]
    pub fn token<T: Into<String>>(mut self, token: T) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Overrides the base URL (useful for testing with a mock server).
    #[inline]
    #[must_use]
    pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Overrides the per-request timeout.
    #[inline]
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingToken`] if no token was provided,
    /// [`LedgerError::InvalidUrl`] if the base URL does not parse or
    /// cannot carry a path, and [`LedgerError::Http`] if the HTTP client
    /// fails to build.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> Result<HttpTransport> {
        let token = self.token.ok_or(LedgerError::MissingToken)?;
        let raw = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = Url::parse(&raw)?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        tracing::debug!(base_url = %base_url, ?timeout, "building HTTP transport");
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpTransport {
            http,
            token,
            base_url,
        })
    }
}

/// Async REST transport.
///
/// Use [`HttpTransport::builder()`] to construct an instance.
#[derive(Debug)]
pub struct HttpTransport {
    /// Underlying HTTP client.
    http: reqwest::Client,
    /// Bearer access token.
    token: SecretString,
    /// Service base URL.
    base_url: Url,
}

impl HttpTransport {
    /// Creates a new builder for configuring the transport.
    #[inline]
    #[must_use]
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Returns the URL of a resource collection or one of its records.
    fn endpoint(&self, resource: Resource, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            let _segments = segments.pop_if_empty().push(resource.path());
            if let Some(id) = id {
                let _segments = segments.push(id);
            }
        }
        url
    }

    /// Sends an authenticated request and returns the response body.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> core::result::Result<String, RemoteError> {
        let response = request
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.token.expose_secret()),
            )
            .send()
            .await
            .map_err(classify_send_error)?;
        Self::handle_response(response).await
    }

    /// Checks the status and reads the body.
    async fn handle_response(
        response: reqwest::Response,
    ) -> core::result::Result<String, RemoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_owned());
        if status.is_success() {
            Ok(body)
        } else {
            tracing::debug!(status = status.as_u16(), "request rejected");
            Err(RemoteError::from_status(status.as_u16(), &body))
        }
    }

    /// Sends a JSON body with the given method.
    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> core::result::Result<(), RemoteError> {
        let _body = self
            .send(request.header(CONTENT_TYPE, "application/json").json(body))
            .await?;
        Ok(())
    }
}

/// Maps a failure to reach the server onto a retryable kind.
fn classify_send_error(err: reqwest::Error) -> RemoteError {
    let kind = if err.is_timeout() {
        RemoteErrorKind::Timeout
    } else {
        RemoteErrorKind::Unavailable
    };
    RemoteError::new(kind, err.to_string())
}

/// Accepts either a bare array or a paginated `{ "data": [...] }` page.
fn records(body: &str) -> core::result::Result<Vec<Value>, RemoteError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| RemoteError::new(RemoteErrorKind::Decode, err.to_string()))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut page) => match page.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) | None => Err(RemoteError::new(
                RemoteErrorKind::Decode,
                "response page has no data array",
            )),
        },
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Err(
            RemoteError::new(RemoteErrorKind::Decode, "expected a list of records"),
        ),
    }
}

impl Transport for HttpTransport {
    #[tracing::instrument(skip_all, fields(resource = %resource))]
    async fn find(&self, resource: Resource) -> core::result::Result<Vec<Value>, RemoteError> {
        let body = self
            .send(self.http.get(self.endpoint(resource, None)))
            .await?;
        records(&body)
    }

    #[tracing::instrument(skip_all, fields(resource = %resource))]
    async fn create(
        &self,
        resource: Resource,
        payload: Value,
    ) -> core::result::Result<(), RemoteError> {
        self.send_json(self.http.post(self.endpoint(resource, None)), &payload)
            .await
    }

    #[tracing::instrument(skip_all, fields(resource = %resource, count = payloads.len()))]
    async fn create_many(
        &self,
        resource: Resource,
        payloads: Vec<Value>,
    ) -> core::result::Result<(), RemoteError> {
        let body = Value::Array(payloads);
        self.send_json(self.http.post(self.endpoint(resource, None)), &body)
            .await
    }

    #[tracing::instrument(skip_all, fields(resource = %resource, id = %id))]
    async fn update(
        &self,
        resource: Resource,
        id: String,
        payload: Value,
    ) -> core::result::Result<(), RemoteError> {
        self.send_json(
            self.http.put(self.endpoint(resource, Some(&id))),
            &payload,
        )
        .await
    }

    #[tracing::instrument(skip_all, fields(resource = %resource, id = %id))]
    async fn remove(
        &self,
        resource: Resource,
        id: String,
    ) -> core::result::Result<(), RemoteError> {
        let _body = self
            .send(self.http.delete(self.endpoint(resource, Some(&id))))
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(resource = %resource, count = ids.len()))]
    async fn remove_many(
        &self,
        resource: Resource,
        ids: Vec<String>,
    ) -> core::result::Result<(), RemoteError> {
        let mut url = self.endpoint(resource, None);
        {
            let mut query = url.query_pairs_mut();
            for id in &ids {
                let _query = query.append_pair(ID_IN_QUERY, id);
            }
        }
        let _body = self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
