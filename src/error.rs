//! 组装核心的错误类型。
//!
//! 可恢复的错误（索引未命中、索引处于 detach 状态）由调用方决定回退策略；
//! `InvariantViolation` 表示图或索引已经不一致，简化流程必须立即终止，
//! 错误信息中带上出问题的顶点 / 边编号。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsmError {
    /// k+1-mer 不在索引中
    #[error("k-mer {kmer} not found in index")]
    NotFound { kmer: String },

    /// 索引处于 detach 状态时被查询
    #[error("k-mer index is detached; query rejected until it is re-attached")]
    IndexUnavailable,

    /// 共轭对称性被破坏、索引与图不一致、非法的边替换等
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AsmError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn not_found(kmer: &[u8]) -> Self {
        Self::NotFound { kmer: String::from_utf8_lossy(kmer).into_owned() }
    }

    /// 是否为必须终止流程的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, AsmError>;
