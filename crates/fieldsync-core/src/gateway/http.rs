//! HTTP implementation of the remote gateway.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::models::{Attachment, AttachmentRef, Collection, Record, RecordId};
use crate::util::{compact_text, normalize_http_base_url, normalize_text_option};

use super::{GatewayError, RemoteGateway};

/// Attachments at or below this size are returned inline.
pub const DEFAULT_INLINE_THRESHOLD_BYTES: usize = 64 * 1024;

/// JSON-over-HTTP gateway.
///
/// Routes: `GET /v1/{collection}?since=`, `PUT /v1/{collection}/{id}`,
/// `DELETE /v1/{collection}/{id}`, `POST /v1/attachments`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
    inline_threshold: usize,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let base_url =
            normalize_http_base_url(base_url, "api_url").map_err(GatewayError::InvalidConfiguration)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                GatewayError::InvalidConfiguration(format!(
                    "Failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            base_url,
            api_token: normalize_text_option(api_token),
            timeout,
            inline_threshold: DEFAULT_INLINE_THRESHOLD_BYTES,
            client,
        })
    }

    /// Override the inline attachment threshold (0 uploads everything).
    #[must_use]
    pub const fn with_inline_threshold(mut self, bytes: usize) -> Self {
        self.inline_threshold = bytes;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn record_url(&self, collection: Collection, id: &RecordId) -> String {
        format!(
            "{}/v1/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(id.as_str())
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status,
            message: parse_error_message(&body),
        })
    }

    fn transport_error(&self, error: &reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_collection(
        &self,
        collection: Collection,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>, GatewayError> {
        let mut url = format!("{}/v1/{}", self.base_url, collection);
        if let Some(since) = since {
            let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
            url.push_str(&format!("?since={}", urlencoding::encode(&since)));
        }

        let response = self.send(self.client.get(url)).await?;
        let body = response
            .text()
            .await
            .map_err(|error| self.transport_error(&error))?;
        parse_collection(collection, &body)
    }

    async fn submit(&self, collection: Collection, record: &Record) -> Result<(), GatewayError> {
        self.send(
            self.client
                .put(self.record_url(collection, &record.id))
                .json(&record.payload),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), GatewayError> {
        match self
            .send(self.client.delete(self.record_url(collection, id)))
            .await
        {
            Ok(_) | Err(GatewayError::Rejected { status: 404, .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn upload_attachment(
        &self,
        attachment: &Attachment,
    ) -> Result<AttachmentRef, GatewayError> {
        if attachment.size_bytes() <= self.inline_threshold {
            return Ok(inline_reference(attachment));
        }

        let mut request = self
            .client
            .post(format!("{}/v1/attachments", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, &attachment.mime_type)
            .body(attachment.bytes.clone());
        if let Some(filename) = &attachment.filename {
            request = request.header("X-Filename", urlencoding::encode(filename).into_owned());
        }

        let response = self.send(request).await?;
        let body = response
            .json::<UploadResponse>()
            .await
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))?;
        let url = normalize_text_option(Some(body.url)).ok_or_else(|| {
            GatewayError::InvalidPayload("upload response has an empty url".to_string())
        })?;
        Ok(AttachmentRef::Url(url))
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_error_message(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }
    compact_text(body)
}

/// Accepts either a bare array or `{"records": [...]}`; every element must be
/// an object carrying a string or numeric `id`.
fn parse_collection(collection: Collection, body: &str) -> Result<Vec<Record>, GatewayError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|error| GatewayError::InvalidPayload(error.to_string()))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("records") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(GatewayError::InvalidPayload(format!(
                    "{collection} response has no records array"
                )))
            }
        },
        _ => {
            return Err(GatewayError::InvalidPayload(format!(
                "{collection} response is not a JSON array"
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            let id = match item.get("id") {
                Some(serde_json::Value::String(id)) => id.clone(),
                Some(serde_json::Value::Number(id)) => id.to_string(),
                _ => {
                    return Err(GatewayError::InvalidPayload(format!(
                        "{collection} item is missing an id"
                    )))
                }
            };
            let id = RecordId::new(id)
                .map_err(|error| GatewayError::InvalidPayload(error.to_string()))?;
            let mut record = Record::new(collection, id, item);
            record.synced = true;
            Ok(record)
        })
        .collect()
}

fn inline_reference(attachment: &Attachment) -> AttachmentRef {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&attachment.bytes);
    AttachmentRef::Inline(format!("data:{};base64,{encoded}", attachment.mime_type))
}
