use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::PartialOutput;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件格式错误: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// 整个请求的超时时间，不设置则不限制
    pub timeout_secs: Option<u64>,
    /// 是否使用环境变量里的代理设置
    pub use_system_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("dlmanager/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 15,
            timeout_secs: None,
            use_system_proxy: true,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    /// 取消下载时是否删除已经写入的部分文件
    pub partial_output: PartialOutput,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = tokio::fs::read(path.as_ref()).await?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = Config::from_json(b"{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.partial_output, PartialOutput::Keep);
        assert_eq!(config.http.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.http.timeout(), None);
        assert!(config.http.use_system_proxy);
    }

    #[test]
    fn test_partial_fields_override() {
        let json = br#"{ "partial_output": "remove", "http": { "timeout_secs": 30 } }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.partial_output, PartialOutput::Remove);
        assert_eq!(config.http.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.http.connect_timeout_secs, 15);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            Config::from_json(b"{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = Config::load("/definitely/not/here.json").await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
