//! cuba-config - 配置加载库
//!
//! 加载顺序：`{dir}/default.toml` → `{dir}/{APP_ENV}.toml` → `APP_` 前缀环境变量，
//! 环境变量中用 `__` 表示嵌套，如 `APP_PERMISSION__MAX_CONCURRENT_CHECKS=20`。

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// 遥测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    /// 未配置时不启用外部缓存
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_name() -> String {
    "iam-permission".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

/// 组合各配置源
pub fn figment(config_dir: &str) -> Figment {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

    Figment::new()
        .merge(Toml::file(format!("{}/default.toml", config_dir)))
        .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
        .merge(Serialized::default("app_env", &env))
        .merge(Env::prefixed("APP_").split("__"))
}

/// 只加载某个配置段，缺失时使用 `T::default()`
pub fn load_section<T>(config_dir: &str, section: &str) -> Result<T, ConfigError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let value = Figment::from(Serialized::defaults(T::default()))
        .merge(figment(config_dir).focus(section))
        .extract()?;
    Ok(value)
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        Ok(figment(config_dir).extract()?)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
