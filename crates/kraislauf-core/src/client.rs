use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::error::{ClientError, Operation};
use crate::image::ImageUpload;

/// The remote assistant service, as seen by the conversation.
///
/// Implementors own transport and serialization. Every failure is reported
/// as [`ClientError::RemoteCallFailed`]; callers never see finer detail.
#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn send_chat_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;

    async fn upload_image(&self, image: ImageUpload) -> Result<ChatResponse, ClientError>;
}

const MAX_LOGGED_BODY: usize = 200;

#[derive(Clone)]
pub struct HttpAssistantClient {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl HttpAssistantClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn post(&self, operation: Operation) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, operation.path());
        let builder = self.client.post(url);
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    async fn execute(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<ChatResponse, ClientError> {
        let response = request.send().await.map_err(|e| {
            warn!(%operation, error = %e, "Assistant service unreachable");
            ClientError::failed(operation)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(MAX_LOGGED_BODY).collect();
            warn!(%operation, %status, %body, "Assistant service returned an error");
            return Err(ClientError::failed(operation));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            warn!(%operation, error = %e, "Malformed assistant service response");
            ClientError::failed(operation)
        })?;

        debug!(%operation, chars = reply.response.chars().count(), "Assistant replied");
        Ok(reply)
    }
}

#[async_trait]
impl AssistantService for HttpAssistantClient {
    async fn send_chat_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        debug!(
            history = request.history.len(),
            "Sending chat message to {}",
            self.base_url
        );
        let builder = self.post(Operation::Chat).json(request);
        self.execute(Operation::Chat, builder).await
    }

    async fn upload_image(&self, image: ImageUpload) -> Result<ChatResponse, ClientError> {
        debug!(
            file = image.file_name(),
            bytes = image.bytes().len(),
            "Uploading image to {}",
            self.base_url
        );
        let file_name = image.file_name().to_string();
        let content_type = image.content_type().to_string();
        let part = Part::bytes(image.into_bytes())
            .file_name(file_name)
            .mime_str(&content_type)
            .map_err(|e| {
                warn!(error = %e, %content_type, "Invalid image content type");
                ClientError::failed(Operation::Upload)
            })?;
        let form = Form::new().part("file", part);

        let builder = self.post(Operation::Upload).multipart(form);
        self.execute(Operation::Upload, builder).await
    }
}
