use std::collections::HashMap;
use std::sync::Arc;

use vecsync_core::traits::DataSourceStrategy;
use vecsync_core::{SyncError, SyncResult};

use crate::mysql::MySqlStrategy;
use crate::postgres::PostgresStrategy;

/// 方言策略注册表
///
/// 启动时注册完毕后只读，可被任意多个worker并发查找。方言名
/// 不区分大小写。
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn DataSourceStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// 带内置方言（MySQL、PostgreSQL）的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MySqlStrategy::new()));
        registry.register(Arc::new(PostgresStrategy::new()));
        registry
    }

    /// 注册策略，方言名重复时后注册者覆盖
    pub fn register(&mut self, strategy: Arc<dyn DataSourceStrategy>) {
        self.strategies
            .insert(strategy.dialect().to_uppercase(), strategy);
    }

    pub fn get(&self, dialect: &str) -> SyncResult<Arc<dyn DataSourceStrategy>> {
        self.strategies
            .get(&dialect.to_uppercase())
            .cloned()
            .ok_or_else(|| SyncError::Configuration(format!("未注册的数据源方言: {dialect}")))
    }

    pub fn dialects(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dialects() {
        let registry = StrategyRegistry::with_builtin();
        assert!(registry.get("MYSQL").is_ok());
        assert!(registry.get("POSTGRESQL").is_ok());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = StrategyRegistry::with_builtin();
        assert!(registry.get("mysql").is_ok());
        assert!(registry.get("PostgreSql").is_ok());
    }

    #[test]
    fn test_unknown_dialect_is_configuration_error() {
        let registry = StrategyRegistry::with_builtin();
        let err = registry.get("ORACLE").err().unwrap();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}
