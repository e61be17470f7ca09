//! k+1-mer 位置索引：k+1-mer -> 所在边及边内偏移。

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::EdgeId;

pub mod kmer;

pub use kmer::KmerIndex;

/// 索引项：边编号 + 边序列内 0 起始偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgePosition {
    pub edge: EdgeId,
    pub offset: u32,
}

/// 索引查询接口。索引 detach 期间所有查询返回 `IndexUnavailable`。
pub trait IndexLike {
    fn kmer_len(&self) -> usize;
    fn is_attached(&self) -> bool;
    fn contains(&self, kmer: &[u8]) -> Result<bool>;
    /// 不存在时返回 `NotFound`
    fn get(&self, kmer: &[u8]) -> Result<EdgePosition>;
    fn find_code(&self, code: u128) -> Result<Option<EdgePosition>>;
}
