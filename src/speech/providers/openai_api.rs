use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, info};

use super::SpeechProvider;
use crate::text::format_structured_text;

const BASE_URL: &str = "https://api.openai.com/v1";
const TRANSCRIBE_MODEL: &str = "gpt-4o-transcribe";
const TRANSCRIBE_PROMPT: &str = "Transcribe the audio and return well-structured paragraphs. \
    Use blank lines to separate paragraphs and fix simple punctuation errors.";
const TRANSLATE_MODEL: &str = "gpt-5-mini-2025-08-07";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    transcribe_model: String,
    translate_model: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        transcribe_model: Option<String>,
        translate_model: Option<String>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("OpenAI API key is not configured");
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to initialise HTTP client")?;
        let base_url = endpoint.unwrap_or_else(|| BASE_URL.to_string());

        info!("Initialized OpenAI provider with endpoint: {}", base_url);

        Ok(Self {
            client,
            base_url,
            api_key,
            transcribe_model: transcribe_model.unwrap_or_else(|| TRANSCRIBE_MODEL.to_string()),
            translate_model: translate_model.unwrap_or_else(|| TRANSLATE_MODEL.to_string()),
        })
    }

    async fn transcribe_inner(
        &self,
        audio: &[u8],
        mimetype: &str,
        language: Option<&str>,
    ) -> Result<String> {
        info!(
            "Transcribing {} bytes of {} via OpenAI",
            audio.len(),
            mimetype
        );

        let file_part = Part::bytes(audio.to_vec())
            .file_name(artifact_file_name(mimetype))
            .mime_str(mimetype)
            .context("Failed constructing multipart payload")?;

        let mut form = Form::new()
            .text("model", self.transcribe_model.clone())
            .text("prompt", TRANSCRIBE_PROMPT.to_string())
            .part("file", file_part);
        if let Some(lang) = language {
            if !lang.is_empty() {
                form = form.text("language", lang.to_string());
            }
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed sending transcription request")?;

        let payload: TranscriptionResponse = parse_response(response).await?;
        debug!("Received transcription response");
        Ok(format_structured_text(&payload.text))
    }

    async fn translate_inner(&self, text: &str, target_language: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        info!("Translating text to {}", target_language);

        let request = ChatCompletionRequest {
            model: self.translate_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!(
                    "Translate the following text to {target}. Format the translation into \
                     clear paragraphs separated by blank lines. Return only the translated \
                     text.\n\n{text}",
                    target = target_language,
                    text = text.trim()
                ),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed sending translation request")?;

        let payload: ChatCompletionResponse = parse_response(response).await?;
        let translated = payload
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or_default();
        Ok(format_structured_text(translated))
    }
}

impl SpeechProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OpenAI API"
    }

    fn transcribe<'a>(
        &'a self,
        audio: &'a [u8],
        mimetype: &'a str,
        language: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.transcribe_inner(audio, mimetype, language))
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.translate_inner(text, target_language))
    }
}

fn artifact_file_name(mimetype: &str) -> &'static str {
    match mimetype {
        "audio/webm" => "audio.webm",
        "audio/ogg" => "audio.ogg",
        _ => "audio.wav",
    }
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .context("Failed decoding API response");
    }

    let body = response.text().await.unwrap_or_default();
    error!("OpenAI request failed with status {}: {}", status, body);

    let message = if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let mut msg = envelope
            .error
            .message
            .unwrap_or_else(|| "Unknown error".into());
        if let Some(code) = envelope.error.code {
            msg = format!("{msg} ({code})");
        }
        if let Some(kind) = envelope.error.kind {
            msg = format!("{msg} [{kind}]");
        }
        msg
    } else if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    bail!(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_api_key() {
        assert!(OpenAiProvider::new("  ".to_string(), None, None, None).is_err());
    }

    #[test]
    fn test_artifact_file_name_by_mimetype() {
        assert_eq!(artifact_file_name("audio/wav"), "audio.wav");
        assert_eq!(artifact_file_name("audio/webm"), "audio.webm");
        assert_eq!(artifact_file_name("audio/ogg"), "audio.ogg");
    }
}
