use crate::annotation::{EmptyAnnotationPolicy, FetchMethod};
use crate::corpus::Variant;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
pub const APP_NAME: &str = "murajaah";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_arabic_edition")]
    pub arabic_edition: String,

    #[serde(default = "default_translation_edition")]
    pub translation_edition: String,

    /// Word-by-word site, also used for the study link.
    #[serde(default = "default_study_base_url")]
    pub study_base_url: String,

    #[serde(default)]
    pub variant: Variant,

    /// Chromium-compatible executable used for rendering.
    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_scrape_delay_ms")]
    pub scrape_delay_ms: u64,

    #[serde(default)]
    pub scrape_method: FetchMethod,

    #[serde(default)]
    pub empty_annotations: EmptyAnnotationPolicy,

    /// Overrides the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Overrides `<data_dir>/pages`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_api_base_url() -> String {
    "http://api.alquran.cloud/v1".to_string()
}

fn default_arabic_edition() -> String {
    "quran-uthmani".to_string()
}

fn default_translation_edition() -> String {
    "en.sahih".to_string()
}

fn default_study_base_url() -> String {
    "https://quranwbw.com".to_string()
}

fn default_browser() -> String {
    "chromium".to_string()
}

fn default_viewport_width() -> u32 {
    2400
}

fn default_viewport_height() -> u32 {
    3000
}

fn default_render_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_scrape_delay_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            api_base_url: default_api_base_url(),
            arabic_edition: default_arabic_edition(),
            translation_edition: default_translation_edition(),
            study_base_url: default_study_base_url(),
            variant: Variant::default(),
            browser: default_browser(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            render_timeout_secs: default_render_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            scrape_delay_ms: default_scrape_delay_ms(),
            scrape_method: FetchMethod::default(),
            empty_annotations: EmptyAnnotationPolicy::default(),
            data_dir: None,
            output_dir: None,
        }
    }
}

impl Settings {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scrape_delay(&self) -> Duration {
        Duration::from_millis(self.scrape_delay_ms)
    }

    /// Loads settings from `path` (or the platform default location),
    /// creating the file with defaults if it does not exist. Unreadable or
    /// invalid files fall back to defaults.
    pub fn load(path: Option<&Path>) -> Settings {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            warn!("Could not determine config directory, using default settings");
            return Settings::default();
        };

        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Settings::default();
            save_settings_to_file(&settings, &path);
            return settings;
        }

        match fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
                Ok(mut settings) => {
                    debug!("Loaded settings from {path:?}");
                    if settings.version < CURRENT_VERSION {
                        migrate_settings(&mut settings);
                        save_settings_to_file(&settings, &path);
                    }
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file {path:?}: {e}");
                    Settings::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file {path:?}: {e}");
                Settings::default()
            }
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            error!("Failed to create config directory {parent:?}: {e}");
            return;
        }
    }
    match serde_yaml::to_string(settings) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                error!("Failed to write settings file {path:?}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize settings: {e}"),
    }
}
