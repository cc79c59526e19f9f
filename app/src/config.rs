use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ui::WidgetConfig;

const CONFIG_DIR: &str = ".media-manager";

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

pub fn default_config_path() -> PathBuf {
    base_dir().join("config")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub upload_url: Option<String>,
    pub reorder_url: Option<String>,
    pub delete_url_template: Option<String>,
    pub csrf_token: Option<String>,
    pub upload_timeout_secs: Option<u64>,
}

#[derive(Default)]
pub struct AppConfigOverrides {
    pub log_level: Option<String>,
    pub upload_url: Option<String>,
    pub reorder_url: Option<String>,
    pub delete_url_template: Option<String>,
    pub csrf_token: Option<String>,
    pub upload_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(default_config_path);
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false))
            .build()
            .unwrap_or_default();

        let log_level = cfg
            .get_string("log_level")
            .unwrap_or_else(|_| "info".to_string());
        let log_dir = cfg
            .get_string("log_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir());
        let upload_timeout_secs = cfg
            .get_int("upload_timeout_secs")
            .ok()
            .and_then(|secs| u64::try_from(secs).ok());

        Self {
            log_level,
            log_dir,
            upload_url: cfg.get_string("upload_url").ok(),
            reorder_url: cfg.get_string("reorder_url").ok(),
            delete_url_template: cfg.get_string("delete_url_template").ok(),
            csrf_token: cfg.get_string("csrf_token").ok(),
            upload_timeout_secs,
        }
    }

    pub fn apply_overrides(mut self, ov: &AppConfigOverrides) -> Self {
        if let Some(l) = &ov.log_level {
            self.log_level = l.clone();
        }
        if let Some(u) = &ov.upload_url {
            self.upload_url = Some(u.clone());
        }
        if let Some(u) = &ov.reorder_url {
            self.reorder_url = Some(u.clone());
        }
        if let Some(t) = &ov.delete_url_template {
            self.delete_url_template = Some(t.clone());
        }
        if let Some(t) = &ov.csrf_token {
            self.csrf_token = Some(t.clone());
        }
        if let Some(s) = ov.upload_timeout_secs {
            self.upload_timeout_secs = Some(s);
        }
        self
    }

    pub fn widget_config(&self) -> WidgetConfig {
        WidgetConfig {
            upload_url: self.upload_url.clone(),
            reorder_url: self.reorder_url.clone(),
            delete_url_template: self.delete_url_template.clone(),
            csrf_token: self.csrf_token.clone(),
            upload_timeout_secs: self.upload_timeout_secs,
        }
    }

    pub fn save_to(&self, path: Option<PathBuf>) -> std::io::Result<()> {
        let path = path.unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, data)
    }
}
