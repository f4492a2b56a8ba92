use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{SyncError, SyncResult};

/// 初始化日志系统
///
/// RUST_LOG优先；未设置时退回到传入的级别。format支持json/pretty/compact。
pub fn init_logging(log_level: &str, log_format: &str) -> SyncResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
    }
    .map_err(|e| SyncError::Configuration(format!("初始化日志失败: {e}")))?;

    Ok(())
}

/// 测试用初始化：重复调用不报错
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(tracing_subscriber::fmt::layer().compact().with_test_writer())
        .try_init();
}
