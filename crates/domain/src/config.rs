use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub jota_db: JotaDbConfig,
}

impl Config {
    /// Apply environment variable overrides on top of the file-loaded config.
    ///
    /// Environment always wins over `config.toml`, matching how the service
    /// is deployed (a `.env` per environment, the file only for defaults).
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("APP_NAME") {
            self.app.name = v;
        }
        if let Ok(v) = std::env::var("APP_ENV") {
            self.app.env = v;
        }
        if let Ok(v) = std::env::var("DEBUG") {
            self.app.debug = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("INFERENCE_SERVICE_URL") {
            self.inference.url = v;
        }
        if let Ok(v) = std::env::var("INFERENCE_CLIENT_ID") {
            self.inference.client_id = v;
        }
        if let Ok(v) = std::env::var("INFERENCE_API_KEY") {
            self.inference.api_key = v;
        }
        if let Ok(v) = std::env::var("SSL_VERIFY") {
            self.inference.ssl_verify = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("JOTA_DB_URL") {
            self.jota_db.base_url = v;
        }
        if let Ok(v) = std::env::var("JOTA_DB_API_KEY") {
            self.jota_db.api_key = Some(v);
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim(), "1" | "true" | "True" | "TRUE" | "yes" | "on")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// App
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "d_app_name")]
    pub name: String,
    #[serde(default = "d_app_env")]
    pub env: String,
    #[serde(default)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: d_app_name(),
            env: d_app_env(),
            debug: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_8000")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: 8000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inference engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Engine endpoint. `wss://` selects TLS.
    #[serde(default = "d_inference_url")]
    pub url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Verify the server certificate when the URL scheme selects TLS.
    #[serde(default = "d_true")]
    pub ssl_verify: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: d_inference_url(),
            client_id: String::new(),
            api_key: String::new(),
            ssl_verify: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JotaDB (conversation store)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JotaDbConfig {
    #[serde(default = "d_jota_db_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_10000u")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
}

impl Default for JotaDbConfig {
    fn default() -> Self {
        Self {
            base_url: d_jota_db_url(),
            api_key: None,
            timeout_ms: 10_000,
            max_retries: 2,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_app_name() -> String {
    "JotaOrchestrator".into()
}
fn d_app_env() -> String {
    "development".into()
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_8000() -> u16 {
    8000
}
fn d_inference_url() -> String {
    "ws://localhost:9001".into()
}
fn d_jota_db_url() -> String {
    "http://localhost:9003".into()
}
fn d_true() -> bool {
    true
}
fn d_10000u() -> u64 {
    10_000
}
fn d_2() -> u32 {
    2
}
