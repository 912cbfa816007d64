use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

pub mod openai_api;

pub use openai_api::OpenAiProvider;

/// The downstream text-generation collaborator: turns an audio artifact
/// into text and, on request, text into another language. Both calls are
/// remote, potentially slow and fallible, and have no side effects on the
/// session protocol's own state.
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn transcribe<'a>(
        &'a self,
        audio: &'a [u8],
        mimetype: &'a str,
        language: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}
