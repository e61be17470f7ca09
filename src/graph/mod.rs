//! 压缩 de Bruijn 图：顶点 / 边标识、`GraphLike` 能力接口与共轭图实现。
//!
//! 图中每个顶点和每条边都有共轭（反向互补）对应物，所有结构修改都同时作用于
//! 对象本身和它的共轭，保证图始终共轭对称。

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AsmError, Result};

pub mod conjugate;
pub mod construct;

pub use conjugate::ConjugateGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl VertexId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// 图修改日志，索引据此做增量维护
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeEvent {
    Added(EdgeId),
    /// 被删除的边及其原序列（删除时移交所有权，无需拷贝）
    Removed(EdgeId, Vec<u8>),
}

/// 路径合并结果：新边与 旧边 -> 新边 的映射（含共轭）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub merged: EdgeId,
    pub replaced: Vec<(EdgeId, EdgeId)>,
}

/// 图能力接口。简化算法和长读段比对都只依赖这个 trait。
///
/// 只读访问器遇到不存在的编号会 panic（属于编程错误）；
/// 结构修改返回 `Result`，共轭对应物缺失时报 `InvariantViolation`。
pub trait GraphLike {
    fn k(&self) -> usize;
    /// 每次结构修改都会递增
    fn generation(&self) -> u64;

    fn vertex_ids(&self) -> Vec<VertexId>;
    fn edge_ids(&self) -> Vec<EdgeId>;
    fn vertex_count(&self) -> usize;
    fn edge_count(&self) -> usize;
    fn contains_vertex(&self, v: VertexId) -> bool;
    fn contains_edge(&self, e: EdgeId) -> bool;

    fn conjugate_vertex(&self, v: VertexId) -> VertexId;
    fn conjugate_edge(&self, e: EdgeId) -> EdgeId;
    fn edge_start(&self, e: EdgeId) -> VertexId;
    fn edge_end(&self, e: EdgeId) -> VertexId;
    fn outgoing_edges(&self, v: VertexId) -> &[EdgeId];
    fn edge_seq(&self, e: EdgeId) -> &[u8];
    fn coverage(&self, e: EdgeId) -> f64;
    fn vertex_kmer(&self, v: VertexId) -> Vec<u8>;

    fn set_coverage(&mut self, e: EdgeId, coverage: f64);
    fn add_edge(&mut self, seq: &[u8], coverage: f64) -> Result<EdgeId>;
    fn remove_edge(&mut self, e: EdgeId) -> Result<()>;
    /// 删除孤立顶点（及其共轭），顶点仍有边时返回 `Ok(false)`
    fn remove_isolated_vertex(&mut self, v: VertexId) -> Result<bool>;
    fn split_edge(&mut self, e: EdgeId, pos: usize) -> Result<(EdgeId, EdgeId)>;
    fn glue_vertices(&mut self, keep: VertexId, gone: VertexId) -> Result<()>;
    fn merge_path(&mut self, path: &[EdgeId]) -> Result<MergeResult>;
    fn take_journal(&mut self) -> Vec<EdgeEvent>;

    /// 边长 = 序列长度 - k
    fn edge_length(&self, e: EdgeId) -> usize {
        self.edge_seq(e).len() - self.k()
    }

    fn incoming_edges(&self, v: VertexId) -> Vec<EdgeId> {
        let cv = self.conjugate_vertex(v);
        self.outgoing_edges(cv)
            .iter()
            .map(|&e| self.conjugate_edge(e))
            .collect()
    }

    fn outgoing_count(&self, v: VertexId) -> usize {
        self.outgoing_edges(v).len()
    }

    fn incoming_count(&self, v: VertexId) -> usize {
        self.outgoing_edges(self.conjugate_vertex(v)).len()
    }

    fn is_self_conjugate(&self, e: EdgeId) -> bool {
        self.conjugate_edge(e) == e
    }

    /// 入度、出度均为 1 且不是自环
    fn is_compressible(&self, v: VertexId) -> bool {
        if self.outgoing_count(v) != 1 || self.incoming_count(v) != 1 {
            return false;
        }
        self.outgoing_edges(v)[0] != self.incoming_edges(v)[0]
    }

    /// 把经过 v 的极大 (1,1) 链合并成一条边
    fn compress_vertex(&mut self, v: VertexId) -> Result<Option<MergeResult>> {
        if !self.contains_vertex(v) || !self.is_compressible(v) {
            return Ok(None);
        }
        let first_in = self.incoming_edges(v)[0];
        let first_out = self.outgoing_edges(v)[0];
        let mut path: VecDeque<EdgeId> = VecDeque::from([first_in, first_out]);
        let mut used: HashSet<EdgeId> = path.iter().copied().collect();
        let mut seen: HashSet<VertexId> = HashSet::from([v]);

        let mut s = self.edge_start(first_in);
        while self.is_compressible(s) && seen.insert(s) {
            let e = self.incoming_edges(s)[0];
            if !used.insert(e) {
                break;
            }
            path.push_front(e);
            s = self.edge_start(e);
        }
        let mut t = self.edge_end(first_out);
        while self.is_compressible(t) && seen.insert(t) {
            let e = self.outgoing_edges(t)[0];
            if !used.insert(e) {
                break;
            }
            path.push_back(e);
            t = self.edge_end(e);
        }

        let path: Vec<EdgeId> = path.into();
        self.merge_path(&path).map(Some)
    }

    fn compress_chains(&mut self) -> Result<Vec<MergeResult>> {
        let mut merges = Vec::new();
        for v in self.vertex_ids() {
            if let Some(m) = self.compress_vertex(v)? {
                merges.push(m);
            }
        }
        Ok(merges)
    }

    /// 沿唯一出边前进，累计长度直到遇到分叉或达到 `limit`
    fn unique_forward_length(&self, e: EdgeId, limit: usize) -> usize {
        let mut total = self.edge_length(e);
        let mut cur = e;
        let mut seen = HashSet::from([e]);
        while total < limit {
            let v = self.edge_end(cur);
            if self.outgoing_count(v) != 1 || self.incoming_count(v) != 1 {
                break;
            }
            cur = self.outgoing_edges(v)[0];
            if !seen.insert(cur) {
                break;
            }
            total += self.edge_length(cur);
        }
        total
    }

    fn unique_backward_length(&self, e: EdgeId, limit: usize) -> usize {
        self.unique_forward_length(self.conjugate_edge(e), limit)
    }
}

/// 删除边后清理端点：孤立顶点删除，(1,1) 顶点压缩。返回压缩产生的合并。
pub fn remove_edge_and_compress<G: GraphLike>(graph: &mut G, e: EdgeId) -> Result<Vec<MergeResult>> {
    if !graph.contains_edge(e) {
        return Err(AsmError::invariant(format!("edge {e} removed twice")));
    }
    let start = graph.edge_start(e);
    let end = graph.edge_end(e);
    graph.remove_edge(e)?;
    cleanup_vertices(graph, &[start, end])
}

/// 对一组顶点做 孤立删除 / 链压缩
pub fn cleanup_vertices<G: GraphLike>(graph: &mut G, vertices: &[VertexId]) -> Result<Vec<MergeResult>> {
    let mut merges = Vec::new();
    for &v in vertices {
        if !graph.contains_vertex(v) {
            continue;
        }
        if graph.remove_isolated_vertex(v)? {
            continue;
        }
        if let Some(m) = graph.compress_vertex(v)? {
            merges.push(m);
        }
    }
    Ok(merges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph() -> ConjugateGraph {
        // 三条首尾相连（重叠 k=5）的边
        let mut g = ConjugateGraph::new(5).unwrap();
        g.add_edge(b"AACCTGA", 2.0).unwrap();
        g.add_edge(b"CCTGATT", 4.0).unwrap();
        g.add_edge(b"TGATTGC", 6.0).unwrap();
        g
    }

    #[test]
    fn compress_chains_merges_linear_run() {
        let mut g = chain_graph();
        assert_eq!(g.edge_count(), 6);
        let merges = g.compress_chains().unwrap();
        assert!(!merges.is_empty());
        assert_eq!(g.edge_count(), 2);
        let e = g
            .edge_ids()
            .into_iter()
            .find(|&e| g.edge_seq(e) == b"AACCTGATTGC")
            .expect("merged edge");
        assert_eq!(g.edge_length(e), 6);
        // 长度加权平均：(2*2 + 4*2 + 6*2) / 6
        assert!((g.coverage(e) - 4.0).abs() < 1e-9);
        g.check_symmetry().unwrap();
    }

    #[test]
    fn compress_is_idempotent() {
        let mut g = chain_graph();
        g.compress_chains().unwrap();
        assert!(g.compress_chains().unwrap().is_empty());
    }

    #[test]
    fn remove_edge_and_compress_drops_isolated_vertices() {
        let mut g = ConjugateGraph::new(5).unwrap();
        let e = g.add_edge(b"AACCTGA", 2.0).unwrap();
        assert_eq!(g.vertex_count(), 4);
        remove_edge_and_compress(&mut g, e).unwrap();
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.vertex_count(), 0);
    }

    #[test]
    fn unique_extension_lengths() {
        let g = chain_graph();
        let first = g
            .edge_ids()
            .into_iter()
            .find(|&e| g.edge_seq(e) == b"AACCTGA")
            .unwrap();
        assert_eq!(g.unique_forward_length(first, 100), 6);
        assert_eq!(g.unique_forward_length(first, 3), 4);
        let last = g
            .edge_ids()
            .into_iter()
            .find(|&e| g.edge_seq(e) == b"TGATTGC")
            .unwrap();
        assert_eq!(g.unique_backward_length(last, 100), 6);
    }
}
