use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:4000";
pub const SETTINGS_FILE_NAME: &str = "client.toml";

/// Runtime settings shared by the messenger and drive binaries.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the remote API, without a trailing slash.
    pub api_base_url: String,
    /// Directory holding the credential vault and the optional settings file.
    pub data_dir: PathBuf,
    /// Emit a debug line for every outgoing request.
    pub request_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: PathBuf::from("./data"),
            request_log: false,
        }
    }
}

impl Settings {
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn vault_database_url(&self) -> String {
        format!(
            "sqlite://{}",
            self.data_dir.join("credentials.sqlite3").display()
        )
    }
}

/// Loads settings for the given data directory: defaults, then the optional
/// `client.toml` inside it, then environment variables. Later sources win.
pub fn load_settings(data_dir: &Path) -> Result<Settings> {
    let mut settings = Settings {
        data_dir: data_dir.to_path_buf(),
        ..Settings::default()
    };

    if let Ok(raw) = fs::read_to_string(settings.settings_path()) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_settings) => apply_file_settings(&mut settings, &file_settings),
            Err(err) => tracing::warn!(
                path = %settings.settings_path().display(),
                error = %err,
                "config: ignoring unreadable settings file"
            ),
        }
    }

    for key in ["API_BASE_URL", "APP__API_BASE_URL"] {
        if let Ok(value) = std::env::var(key) {
            settings.api_base_url = value;
        }
    }
    for key in ["REQUEST_LOG", "APP__REQUEST_LOG"] {
        if let Ok(value) = std::env::var(key) {
            if let Ok(parsed) = value.parse::<bool>() {
                settings.request_log = parsed;
            }
        }
    }

    validate_base_url(&settings.api_base_url)
        .with_context(|| format!("invalid api_base_url '{}'", settings.api_base_url))?;
    Ok(settings)
}

fn apply_file_settings(settings: &mut Settings, file_settings: &HashMap<String, String>) {
    if let Some(value) = file_settings.get("api_base_url") {
        settings.api_base_url = value.clone();
    }
    if let Some(value) = file_settings.get("request_log") {
        if let Ok(parsed) = value.parse::<bool>() {
            settings.request_log = parsed;
        }
    }
}

/// Rejects base URLs that would produce nonsense endpoints later on.
pub fn validate_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).context("not a valid URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("api base url must use http or https");
    }
    Ok(url)
}
