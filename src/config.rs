use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_IMAGES: &str = "./images";
pub const DEFAULT_IMAGE_MODEL: &str = "llama3.2-vision";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DATABASE_FILE_NAME: &str = "images.db";

/// Settings as they come out of the layered sources, before paths and URLs are resolved.
#[derive(Debug, Deserialize)]
struct RawConfig {
    images: String,
    image_model: String,
    ollama_url: String,
    temperature: f64,
    request_timeout_secs: u64,
    database_file: Option<String>,
    bind_address: String,
    web_port: u16,
    log_level: String,
}

/// Resolved application configuration.
///
/// Built once in `main` and shared by reference with every component; nothing
/// below `main` looks at the process environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub catalog_root: PathBuf,
    pub image_model: String,
    pub ollama_url: Url,
    pub temperature: f64,
    pub request_timeout: Duration,
    pub database_file: PathBuf,
    pub bind_address: String,
    pub web_port: u16,
    pub log_level: String,
}

impl AppConfig {
    /// Loads `default`, `<RUN_MODE>` and `local` files from `config_dir` (all optional)
    /// and `MAIG_*` environment variables on top of the built-in defaults.
    pub fn new(config_dir: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let cwd = std::env::current_dir()
            .map_err(|e| ConfigError::Message(format!("cannot determine working directory: {}", e)))?;

        let s = Self::defaults()?
            .add_source(File::from(config_dir.join("default")).required(false))
            .add_source(File::from(config_dir.join(&env)).required(false))
            .add_source(File::from(config_dir.join("local")).required(false))
            .add_source(Environment::with_prefix("MAIG").try_parsing(true))
            .build()?;

        Self::from_settings(s, &cwd)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("images", DEFAULT_IMAGES)?
            .set_default("image_model", DEFAULT_IMAGE_MODEL)?
            .set_default("ollama_url", DEFAULT_OLLAMA_URL)?
            .set_default("temperature", 0.3)?
            .set_default("request_timeout_secs", 120)?
            .set_default("bind_address", "0.0.0.0")?
            .set_default("web_port", 8080)?
            .set_default("log_level", "info")
    }

    fn from_settings(settings: Config, cwd: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = settings.try_deserialize()?;

        let images = raw.images.trim();
        let images = if images.is_empty() { DEFAULT_IMAGES } else { images };
        let catalog_root = absolutize(cwd, Path::new(images));

        let image_model = match raw.image_model.trim() {
            "" => DEFAULT_IMAGE_MODEL.to_string(),
            model => model.to_string(),
        };

        let ollama_url = Url::parse(raw.ollama_url.trim()).map_err(|e| {
            ConfigError::Message(format!("invalid ollama_url '{}': {}", raw.ollama_url, e))
        })?;

        let database_file = match raw.database_file.as_deref().map(str::trim) {
            Some(file) if !file.is_empty() => absolutize(cwd, Path::new(file)),
            _ => catalog_root.join(DATABASE_FILE_NAME),
        };

        Ok(Self {
            catalog_root,
            image_model,
            ollama_url,
            temperature: raw.temperature,
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
            database_file,
            bind_address: raw.bind_address,
            web_port: raw.web_port,
            log_level: raw.log_level,
        })
    }

    /// Endpoint of the model service's non-chat completion call.
    pub fn generate_endpoint(&self) -> Result<Url, url::ParseError> {
        let mut base = self.ollama_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("api/generate")
    }
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_catalog(root: &Path, ollama_url: &str) -> Self {
        Self {
            catalog_root: root.to_path_buf(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            ollama_url: Url::parse(ollama_url).unwrap(),
            temperature: 0.3,
            request_timeout: Duration::from_secs(5),
            database_file: root.join(DATABASE_FILE_NAME),
            bind_address: "127.0.0.1".to_string(),
            web_port: 0,
            log_level: "debug".to_string(),
        }
    }
}
