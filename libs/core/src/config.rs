//! Process settings, assembled once at startup from the environment.
//!
//! Every binary calls `Settings::from_env()` before doing anything else and
//! aborts with the full list of missing variables, so a misconfigured
//! deployment fails at boot rather than at the first request.

use anyhow::{Result, bail};

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub endpoint_url: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub service_key: String,
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct ModelKeys {
    pub google_api_key: String,
    pub deepseek_api_key: String,
    pub openai_api_key: String,
}

/// Speech-to-text configuration. `model_size`, `device` and `compute_type`
/// are forwarded to the transcription backend; `language` is the hint used
/// for every voice note.
#[derive(Debug, Clone)]
pub struct AsrConfig {
    pub base_url: String,
    pub model_size: String,
    pub device: String,
    pub compute_type: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub redis_url: String,
    pub blob: BlobConfig,
    pub db: DbConfig,
    pub models: ModelKeys,
    pub asr: AsrConfig,
    pub frontend_origins: Vec<String>,
    pub api_rate_limit: u32,
    pub bind_addr: String,
    pub knowledge_pdf_enabled: bool,
    pub healthbeat_file: String,
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let mut missing: Vec<&str> = Vec::new();
        let mut required = |name: &'static str| -> String {
            match std::env::var(name) {
                Ok(v) if !v.is_empty() => v,
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let blob = BlobConfig {
            endpoint_url: required("BLOB_ENDPOINT_URL"),
            bucket: required("BLOB_BUCKET_NAME"),
            access_key: required("BLOB_ACCESS_KEY_ID"),
            secret_key: required("BLOB_SECRET_ACCESS_KEY"),
        };
        let db = DbConfig {
            url: required("DATABASE_URL"),
            service_key: required("DATABASE_SERVICE_KEY"),
            jwt_secret: required("JWT_SECRET"),
        };
        let models = ModelKeys {
            google_api_key: required("GOOGLE_API_KEY"),
            deepseek_api_key: required("DEEPSEEK_API_KEY"),
            openai_api_key: required("OPENAI_API_KEY"),
        };
        let frontend_origins: Vec<String> = required("FRONTEND_ORIGINS")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if !missing.is_empty() {
            bail!("missing environment variables: {}", missing.join(", "));
        }

        let redis_host = optional("REDIS_HOST", "redis");
        let redis_port = optional("REDIS_PORT", "6379");

        Ok(Self {
            redis_url: optional("REDIS_URL", &format!("redis://{redis_host}:{redis_port}")),
            blob,
            db,
            models,
            asr: AsrConfig {
                base_url: optional("ASR_BASE_URL", "http://localhost:9000"),
                model_size: optional("ASR_MODEL_SIZE", "base"),
                device: optional("ASR_DEVICE", "cpu"),
                compute_type: optional("ASR_COMPUTE_TYPE", "int8"),
                language: optional("ASR_LANGUAGE", "es"),
            },
            frontend_origins,
            api_rate_limit: optional("API_RATE_LIMIT", "60").parse().unwrap_or(60),
            bind_addr: optional("BIND", "0.0.0.0:8000"),
            knowledge_pdf_enabled: optional("KNOWLEDGE_PDF_ENABLED", "true") != "false",
            healthbeat_file: optional("HEALTHBEAT_FILE", "/tmp/health/last_processed"),
        })
    }
}
