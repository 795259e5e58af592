//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者，过滤规则来自 `RUST_LOG`，
//! 未设置时使用给定的默认指令。`log` crate 的记录通过 `tracing-log` 转发。

use tracing_subscriber::EnvFilter;

/// 以 `info` 为默认级别初始化日志
///
/// 已经初始化过时什么也不做，返回 `false`。
pub fn init() -> bool {
    init_with_default("info")
}

/// 以给定的默认过滤指令初始化日志
pub fn init_with_default(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    // log -> tracing 桥接；其他库可能已经装了 logger，忽略失败
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge not installed: {}", e);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_is_idempotent() {
        // 第一次调用可能已被同进程的其他测试抢先
        let _ = init();
        assert!(!init());
        assert!(!init_with_default("debug"));

        log::info!("log records are bridged");
        tracing::info!("tracing records are emitted");
    }
}
