//! Configuration management for the Flipbook server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::viewer::{BookSize, RendererConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub public: PublicConfig,
    pub http: HttpConfig,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicConfig {
    /// Public root; PDFs live in `<dir>/pdfs`
    pub dir: PathBuf,
    /// Origin used to fetch same-origin paths over HTTP
    pub origin: Option<Url>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    pub eager_pages: usize,
    pub window_before: usize,
    pub window_after: usize,
    pub jpeg_quality: u8,
    pub resize_debounce_ms: u64,
    pub initial_container_width: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            public: PublicConfig {
                dir: PathBuf::from("./public"),
                origin: None,
            },
            http: HttpConfig { timeout_secs: 30 },
            viewer: ViewerConfig {
                eager_pages: 4,
                window_before: 2,
                window_after: 3,
                jpeg_quality: 92,
                resize_debounce_ms: 150,
                initial_container_width: 720.0,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let origin = match env::var("PUBLIC_ORIGIN") {
            Ok(value) if !value.trim().is_empty() => {
                Some(Url::parse(value.trim()).map_err(|e| ConfigError::Invalid {
                    name: "PUBLIC_ORIGIN",
                    value: value.clone(),
                    reason: e.to_string(),
                })?)
            }
            _ => None,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            public: PublicConfig {
                dir: env::var("PUBLIC_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.public.dir),
                origin,
            },
            http: HttpConfig {
                timeout_secs: parse_var("HTTP_TIMEOUT_SECS", defaults.http.timeout_secs)?,
            },
            viewer: ViewerConfig {
                eager_pages: parse_var("EAGER_PAGES", defaults.viewer.eager_pages)?,
                window_before: parse_var("WINDOW_BEFORE", defaults.viewer.window_before)?,
                window_after: parse_var("WINDOW_AFTER", defaults.viewer.window_after)?,
                jpeg_quality: parse_var("JPEG_QUALITY", defaults.viewer.jpeg_quality)?,
                resize_debounce_ms: parse_var(
                    "RESIZE_DEBOUNCE_MS",
                    defaults.viewer.resize_debounce_ms,
                )?,
                initial_container_width: parse_var(
                    "INITIAL_CONTAINER_WIDTH",
                    defaults.viewer.initial_container_width,
                )?,
            },
        })
    }

    /// Directory served under `/pdfs`
    pub fn pdf_dir(&self) -> PathBuf {
        self.public.dir.join("pdfs")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.viewer.resize_debounce_ms)
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            eager_pages: self.viewer.eager_pages,
            window_before: self.viewer.window_before,
            window_after: self.viewer.window_after,
            jpeg_quality: self.viewer.jpeg_quality.clamp(1, 100),
            initial_size: BookSize::from_container_width(self.viewer.initial_container_width),
        }
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
