use serde::{Deserialize, Serialize};

/// 数据源连接配置
///
/// dialect用于在策略注册表中选择方言实现（如"MYSQL"、"POSTGRESQL"）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub dialect: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// 连接获取超时（秒）
    pub connect_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dialect: "MYSQL".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: 30,
        }
    }
}
