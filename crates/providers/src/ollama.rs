use crate::assembler::{AssemblerConfig, StreamAssembler};
use crate::error::{map_http_status, map_reqwest_error, ProviderError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Serialize;
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::settings::ChatSettings;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

pub struct OllamaClient {
    http: Client,
    chat_url: reqwest::Url,
    model: String,
    timeout: Duration,
    assembler_config: AssemblerConfig,
}

impl OllamaClient {
    pub fn new(settings: &ChatSettings) -> Result<Self, ProviderError> {
        let raw_url = settings.chat_url();
        let chat_url =
            reqwest::Url::parse(&raw_url).map_err(|e| ProviderError::InvalidEndpoint {
                url: raw_url.clone(),
                reason: e.to_string(),
            })?;
        let timeout = Duration::from_secs(settings.timeout_secs);
        // Replies may stream for minutes; bound connecting and each read
        // instead of the whole request.
        let http = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            http,
            chat_url,
            model: settings.model.clone(),
            timeout,
            assembler_config: AssemblerConfig {
                char_threshold: settings.char_threshold,
            },
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stream a chat completion, forwarding UI updates over `tx`.
    ///
    /// Contract: if the request fails before any body arrives (connect error,
    /// non-2xx status), returns `Err(...)` and nothing is sent on `tx`. Once
    /// streaming starts, read errors go through `StreamChunk::Error`, whatever
    /// arrived is still flushed and completed, and the (possibly partial)
    /// response is returned as `Ok`.
    pub async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<String, ProviderError> {
        let req = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };
        tracing::debug!(
            "sending chat request to {} (model {}, {} messages)",
            self.chat_url,
            self.model,
            messages.len()
        );

        let resp = self
            .http
            .post(self.chat_url.clone())
            .header(ACCEPT, "text/event-stream")
            .json(&req)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("ollama error {}: {}", status, body.trim());
            return Err(map_http_status(status, &body));
        }

        let span = tracing::info_span!("ollama_stream", model = %self.model);
        let assembler = StreamAssembler::new(self.assembler_config, span);
        Ok(assemble_stream(resp.bytes_stream(), assembler, tx).await)
    }
}

/// Drive `assembler` from a byte stream until it ends or fails.
///
/// Flushes become `StreamChunk::Incremental`, the end of the stream becomes
/// `StreamChunk::Complete`. A read error is reported as `StreamChunk::Error`
/// before the assembler is finished with what it already has.
pub async fn assemble_stream<S, E>(
    byte_stream: S,
    mut assembler: StreamAssembler,
    tx: UnboundedSender<StreamChunk>,
) -> String
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let incremental_tx = tx.clone();
    let complete_tx = tx.clone();
    assembler
        .on_incremental(move |text| {
            let _ = incremental_tx.send(StreamChunk::Incremental(text.to_string()));
        })
        .on_complete(move |text| {
            let _ = complete_tx.send(StreamChunk::Complete(text.to_string()));
        });

    let mut stream = std::pin::pin!(byte_stream);
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => assembler.feed(&bytes),
            Err(e) => {
                tracing::error!("stream read error: {}", e);
                let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e)));
                break;
            }
        }
    }

    assembler.finish()
}
