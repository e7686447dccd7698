//! HTTP speech-to-text adapter.
//!
//! Speaks the OpenAI-compatible `audio/transcriptions` multipart API that
//! self-hosted Whisper servers also expose. The model size, device and
//! compute type from [`AsrConfig`] travel as form fields for servers that
//! honor them; the language hint is set per call.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::{ModelError, SpeechToText};
use vox_core::AsrConfig;

pub struct WhisperHttpTranscriber {
    http: Client,
    config: AsrConfig,
}

impl WhisperHttpTranscriber {
    pub fn new(http: Client, config: AsrConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl SpeechToText for WhisperHttpTranscriber {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<String, ModelError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|err| ModelError::Transport(format!("read {}: {err}", audio.display())))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".into());

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("model", self.config.model_size.clone())
            .text("language", language.to_string())
            .text("device", self.config.device.clone())
            .text("compute_type", self.config.compute_type.clone());

        let url = format!(
            "{}/v1/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(ModelError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| ModelError::Decode(err.to_string()))?;
        body["text"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ModelError::Decode("transcription response had no text".into()))
    }
}
