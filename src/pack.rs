//! 图与索引的组合体。图只能通过 [`GraphPack::edit`] 修改，
//! 这样任何查询都看不到互相不一致的 图 / 索引 组合。

use std::io::Write;
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::graph::{ConjugateGraph, GraphLike};
use crate::index::KmerIndex;
use crate::io::fasta::write_fasta_record;

/// 保存文件中的构建信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackMeta {
    pub reads_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PackFile {
    meta: PackMeta,
    graph: ConjugateGraph,
    counts: Vec<(u128, u32)>,
}

pub struct GraphPack {
    graph: ConjugateGraph,
    index: KmerIndex,
    pub meta: PackMeta,
}

impl GraphPack {
    /// 接管图并建立 k+1-mer 索引
    pub fn new(mut graph: ConjugateGraph, counts: AHashMap<u128, u32>) -> Self {
        graph.take_journal();
        let mut index = KmerIndex::new(graph.k() + 1);
        index.set_counts(counts);
        index.attach(&graph);
        Self { graph, index, meta: PackMeta::default() }
    }

    pub fn k(&self) -> usize {
        self.graph.k()
    }

    pub fn graph(&self) -> &ConjugateGraph {
        &self.graph
    }

    pub fn index(&self) -> &KmerIndex {
        &self.index
    }

    /// 唯一的图修改入口：detach 索引 -> 修改 -> 按日志同步索引 -> 重新 attach。
    /// 闭包出错时索引同样会被同步后再返回错误。
    pub fn edit<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ConjugateGraph) -> Result<T>,
    {
        self.index.detach();
        let out = f(&mut self.graph);
        let journal = self.graph.take_journal();
        debug!(events = journal.len(), "syncing k-mer index");
        self.index.apply_journal(&self.graph, &journal);
        self.index.attach(&self.graph);
        out
    }

    /// 同 `edit`，闭包额外拿到构图时的 k+1-mer 计数（索引 detach 期间计数仍可读）
    pub fn edit_with_counts<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ConjugateGraph, &AHashMap<u128, u32>) -> Result<T>,
    {
        self.index.detach();
        let out = f(&mut self.graph, self.index.counts());
        let journal = self.graph.take_journal();
        self.index.apply_journal(&self.graph, &journal);
        self.index.attach(&self.graph);
        out
    }

    /// 强制全量重建索引
    pub fn refill_index(&mut self) {
        self.index.refill(&self.graph);
        self.index.attach(&self.graph);
    }

    /// 校验图的共轭对称性与索引一致性
    pub fn check_invariants(&self) -> Result<()> {
        self.graph.check_symmetry()?;
        self.index.check_consistency(&self.graph)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut counts: Vec<(u128, u32)> = self.index.counts().iter().map(|(&c, &n)| (c, n)).collect();
        counts.sort_unstable();
        let file = PackFile { meta: self.meta.clone(), graph: self.graph.clone(), counts };
        let f = std::io::BufWriter::new(std::fs::File::create(path)?);
        bincode::serialize_into(f, &file)?;
        info!(path = %path.display(), edges = self.graph.edge_count(), "graph pack saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let f = std::io::BufReader::new(std::fs::File::open(path)?);
        let file: PackFile = bincode::deserialize_from(f)?;
        let mut graph = file.graph;
        graph.rebuild_lookup();
        graph.check_symmetry()?;
        let mut pack = Self::new(graph, file.counts.into_iter().collect());
        pack.meta = file.meta;
        info!(path = %path.display(), edges = pack.graph.edge_count(), "graph pack loaded");
        Ok(pack)
    }

    /// 每对共轭边输出编号较小的一条
    pub fn write_edges_fasta<W: Write>(&self, out: &mut W) -> Result<usize> {
        let mut written = 0usize;
        for e in self.graph.edge_ids() {
            if self.graph.conjugate_edge(e) < e {
                continue;
            }
            let header = format!(
                "EDGE_{}_length_{}_cov_{:.3}",
                e.0,
                self.graph.edge_length(e),
                self.graph.coverage(e)
            );
            write_fasta_record(out, &header, self.graph.edge_seq(e))?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsmError;
    use crate::graph::construct::build_from_reads;
    use crate::index::IndexLike;

    fn pack() -> GraphPack {
        let reads = vec![b"ACCTGATTGCGAGT".to_vec(); 3];
        let (g, counts) = build_from_reads(&reads, 5, 1).unwrap();
        GraphPack::new(g, counts)
    }

    #[test]
    fn edit_keeps_index_in_sync() {
        let mut p = pack();
        p.check_invariants().unwrap();
        let e = p.graph().edge_ids()[0];
        p.edit(|g| g.split_edge(e, 3).map(|_| ())).unwrap();
        assert!(p.index().is_attached());
        p.check_invariants().unwrap();
        assert_eq!(p.graph().edge_count(), 4);
    }

    #[test]
    fn failed_edit_still_resyncs() {
        let mut p = pack();
        let e = p.graph().edge_ids()[0];
        let err = p
            .edit(|g| {
                g.remove_edge(e)?;
                g.remove_edge(e)
            })
            .unwrap_err();
        assert!(matches!(err, AsmError::InvariantViolation(_)));
        assert!(p.index().is_attached());
        p.check_invariants().unwrap();
    }

    #[test]
    fn save_and_load_roundtrip() {
        let mut p = pack();
        p.meta.build_timestamp = Some("2024-01-01T00:00:00Z".to_string());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.cdbg");
        p.save_to_file(&path).unwrap();

        let back = GraphPack::load_from_file(&path).unwrap();
        assert_eq!(back.meta, p.meta);
        assert_eq!(back.graph().edge_count(), p.graph().edge_count());
        assert_eq!(back.index().counts().len(), p.index().counts().len());
        back.check_invariants().unwrap();
        let e = back.graph().edge_ids()[0];
        let kmer = &back.graph().edge_seq(e)[..6];
        assert_eq!(back.index().get(kmer).unwrap().edge, e);
    }

    #[test]
    fn fasta_has_one_record_per_pair() {
        let p = pack();
        let mut out = Vec::new();
        assert_eq!(p.write_edges_fasta(&mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(">EDGE_"));
        assert!(text.contains("_length_9_cov_3.000"));
    }
}
