use ahash::AHashMap;
use tracing::debug;

use super::{EdgePosition, IndexLike};
use crate::error::{AsmError, Result};
use crate::graph::{construct::canonical, EdgeEvent, GraphLike};
use crate::util::dna::{self, KmerIter};

/// 基于哈希表的定长 k-mer 位置索引。
///
/// 冲突策略为先写者胜出：重建时按边编号升序、边内偏移升序扫描，
/// 已存在的 k-mer 不会被覆盖。一旦出现过冲突，增量维护不再可靠，
/// 之后的 `apply_journal` 一律退化为全量重建。
#[derive(Debug, Clone)]
pub struct KmerIndex {
    kmer_len: usize,
    positions: AHashMap<u128, EdgePosition>,
    /// 构图时记录的规范 k-mer 出现次数，重建索引时保留
    counts: AHashMap<u128, u32>,
    attached: bool,
    generation: Option<u64>,
    collisions: bool,
}

impl KmerIndex {
    pub fn new(kmer_len: usize) -> Self {
        Self {
            kmer_len,
            positions: AHashMap::new(),
            counts: AHashMap::new(),
            attached: false,
            generation: None,
            collisions: false,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 最近一次同步时图的 generation
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn has_collisions(&self) -> bool {
        self.collisions
    }

    fn insert_edge<G: GraphLike>(&mut self, graph: &G, e: crate::graph::EdgeId) {
        for (off, code) in KmerIter::new(graph.edge_seq(e), self.kmer_len) {
            let pos = EdgePosition { edge: e, offset: off as u32 };
            match self.positions.entry(code) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(pos);
                }
                std::collections::hash_map::Entry::Occupied(slot) => {
                    if *slot.get() != pos {
                        self.collisions = true;
                    }
                }
            }
        }
    }

    /// 全量重建，O(边序列总长)
    pub fn refill<G: GraphLike>(&mut self, graph: &G) {
        self.positions.clear();
        self.collisions = false;
        for e in graph.edge_ids() {
            self.insert_edge(graph, e);
        }
        self.generation = Some(graph.generation());
        debug!(entries = self.positions.len(), collisions = self.collisions, "k-mer index refilled");
    }

    /// 重新接入；记录的 generation 过期时先重建
    pub fn attach<G: GraphLike>(&mut self, graph: &G) {
        if self.generation != Some(graph.generation()) {
            self.refill(graph);
        }
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// 按修改日志增量维护：先处理删除，再插入仍然存活的新边
    pub fn apply_journal<G: GraphLike>(&mut self, graph: &G, events: &[EdgeEvent]) {
        if events.is_empty() && self.generation == Some(graph.generation()) {
            return;
        }
        let touched: usize = events
            .iter()
            .map(|ev| match ev {
                EdgeEvent::Removed(_, seq) => seq.len(),
                EdgeEvent::Added(e) if graph.contains_edge(*e) => graph.edge_seq(*e).len(),
                EdgeEvent::Added(_) => 0,
            })
            .sum();
        if self.collisions || self.generation.is_none() || touched > self.positions.len() / 2 {
            self.refill(graph);
            return;
        }

        for ev in events {
            if let EdgeEvent::Removed(e, seq) = ev {
                for (off, code) in KmerIter::new(seq, self.kmer_len) {
                    let pos = EdgePosition { edge: *e, offset: off as u32 };
                    if self.positions.get(&code) == Some(&pos) {
                        self.positions.remove(&code);
                    }
                }
            }
        }
        for ev in events {
            if let EdgeEvent::Added(e) = ev {
                if graph.contains_edge(*e) {
                    self.insert_edge(graph, *e);
                }
            }
        }
        self.generation = Some(graph.generation());
    }

    /// 校验索引与图一致：每条边的每个 k-mer 都能查到，且每个索引项都指向
    /// 存活边上对应偏移处的同一 k-mer
    pub fn check_consistency<G: GraphLike>(&self, graph: &G) -> Result<()> {
        for e in graph.edge_ids() {
            for (off, code) in KmerIter::new(graph.edge_seq(e), self.kmer_len) {
                if !self.positions.contains_key(&code) {
                    return Err(AsmError::invariant(format!(
                        "k-mer at {e}:{off} missing from index"
                    )));
                }
            }
        }
        for (&code, pos) in &self.positions {
            if !graph.contains_edge(pos.edge) {
                return Err(AsmError::invariant(format!(
                    "index entry points at removed edge {}",
                    pos.edge
                )));
            }
            let seq = graph.edge_seq(pos.edge);
            let off = pos.offset as usize;
            let here = seq
                .get(off..off + self.kmer_len)
                .and_then(dna::encode_kmer);
            if here != Some(code) {
                return Err(AsmError::invariant(format!(
                    "index entry {}:{} does not hold its k-mer",
                    pos.edge, pos.offset
                )));
            }
        }
        Ok(())
    }

    pub fn set_counts(&mut self, counts: AHashMap<u128, u32>) {
        self.counts = counts;
    }

    pub fn counts(&self) -> &AHashMap<u128, u32> {
        &self.counts
    }

    /// k-mer（任意方向）的出现次数
    pub fn count(&self, code: u128) -> Option<u32> {
        self.counts.get(&canonical(code, self.kmer_len)).copied()
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.attached {
            Ok(())
        } else {
            Err(AsmError::IndexUnavailable)
        }
    }
}

impl IndexLike for KmerIndex {
    fn kmer_len(&self) -> usize {
        self.kmer_len
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn contains(&self, kmer: &[u8]) -> Result<bool> {
        self.ensure_attached()?;
        if kmer.len() != self.kmer_len {
            return Ok(false);
        }
        Ok(dna::encode_kmer(kmer).is_some_and(|c| self.positions.contains_key(&c)))
    }

    fn get(&self, kmer: &[u8]) -> Result<EdgePosition> {
        self.ensure_attached()?;
        let code = if kmer.len() == self.kmer_len { dna::encode_kmer(kmer) } else { None };
        code.and_then(|c| self.positions.get(&c).copied())
            .ok_or_else(|| AsmError::not_found(kmer))
    }

    fn find_code(&self, code: u128) -> Result<Option<EdgePosition>> {
        self.ensure_attached()?;
        Ok(self.positions.get(&code).copied())
    }
}
