//! 日志初始化。库代码只使用 `tracing` 宏，订阅者由可执行程序安装。

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AsmError, Result};

/// 安装全局 fmt 订阅者。设置了 `RUST_LOG` 时以其为准，否则使用 `level`。
/// 重复调用返回错误而不是 panic。
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| AsmError::config(format!("invalid log level '{level}': {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AsmError::config(format!("logger already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_cleanly() {
        // 测试进程内可能已有订阅者，两次调用至多成功一次
        let first = init("warn").is_ok();
        let second = init("warn").is_ok();
        assert!(!(first && second));
    }
}
