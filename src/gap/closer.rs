use std::io::Write;

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::consensus::consensus;
use super::resolve;
use super::storage::GapStorage;
use crate::config::GapCloserConfig;
use crate::error::{AsmError, Result};
use crate::graph::{EdgeId, GraphLike};
use crate::io::fasta::write_fasta_record;

/// 一个已求出共识的缺口；`seq` 是完整桥接序列（含两端顶点 k-mer）
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedGap {
    pub before: EdgeId,
    pub after: EdgeId,
    pub seq: Vec<u8>,
    pub support: usize,
}

pub struct GapCloser {
    config: GapCloserConfig,
}

impl GapCloser {
    pub fn new(config: GapCloserConfig) -> Self {
        Self { config }
    }

    /// 对支持数足够的缺口类并行求共识，支持不足的只记录日志。调用后 storage 被清空。
    pub fn construct_consensus(&self, worker_count: usize, storage: &mut GapStorage) -> Result<Vec<ClosedGap>> {
        if !storage.is_empty() && !storage.is_padded() {
            return Err(AsmError::invariant("gap fills must be padded before building consensus"));
        }
        let min_support = self.config.min_gap_support.max(1);
        let mut supported = Vec::new();
        for (&(before, after), fills) in storage.classes() {
            if fills.len() >= min_support {
                let seqs: Vec<Vec<u8>> = fills.iter().map(|f| f.seq.clone()).collect();
                supported.push((before, after, seqs));
            } else {
                warn!(%before, %after, support = fills.len(), "gap left unresolved: not enough supporting reads");
            }
        }

        let band = self.config.consensus_band;
        let pool = rayon::ThreadPoolBuilder::new().num_threads(worker_count.max(1)).build()?;
        let closed: Vec<ClosedGap> = pool.install(|| {
            supported
                .par_iter()
                .filter_map(|(before, after, fills)| {
                    consensus(fills, band).map(|seq| ClosedGap {
                        before: *before,
                        after: *after,
                        seq,
                        support: fills.len(),
                    })
                })
                .collect()
        });
        info!(classes = storage.len(), resolved = closed.len(), "gap consensus built");
        storage.clear();
        Ok(closed)
    }

    /// 用桥接边把 before 的死端和 after 的死起点连起来并合并成一条边。
    /// 合并产生的 旧边 -> 新边 记入 `replacement`（含共轭）。
    pub fn close_gaps_in_graph<G: GraphLike>(
        &self,
        graph: &mut G,
        gaps: &[ClosedGap],
        replacement: &mut AHashMap<EdgeId, EdgeId>,
    ) -> Result<usize> {
        let k = graph.k();
        let mut closed = 0usize;
        for gap in gaps {
            let before = resolve(replacement, gap.before);
            let after = resolve(replacement, gap.after);
            if !graph.contains_edge(before)
                || !graph.contains_edge(after)
                || before == after
                || before == graph.conjugate_edge(after)
            {
                debug!(%before, %after, "gap edges no longer usable");
                continue;
            }
            let from = graph.edge_end(before);
            let to = graph.edge_start(after);
            if graph.outgoing_count(from) != 0 || graph.incoming_count(to) != 0 {
                debug!(%before, %after, "gap ends are no longer dead ends");
                continue;
            }
            let seq = &gap.seq;
            if seq.len() <= k || seq[..k] != graph.vertex_kmer(from)[..] || seq[seq.len() - k..] != graph.vertex_kmer(to)[..]
            {
                warn!(%before, %after, "gap consensus does not match the vertices it should join");
                continue;
            }

            let coverage = (graph.coverage(before) + graph.coverage(after)) / 2.0;
            let bridge = graph.add_edge(seq, coverage)?;
            if graph.edge_start(bridge) != from || graph.edge_end(bridge) != to {
                graph.remove_edge(bridge)?;
                warn!(%before, %after, "bridge attached to unexpected vertices");
                continue;
            }
            let merged = graph.merge_path(&[before, bridge, after])?;
            for (old, new) in merged.replaced {
                replacement.insert(old, new);
            }
            debug!(%before, %after, merged = %merged.merged, "gap closed");
            closed += 1;
        }
        info!(closed, candidates = gaps.len(), "gap closing finished");
        Ok(closed)
    }
}

/// 已闭合缺口的桥接序列，FASTA 格式
pub fn write_closed_gaps<W: Write>(out: &mut W, gaps: &[ClosedGap]) -> Result<usize> {
    for gap in gaps {
        let header = format!("gap_{}_{}_support_{}", gap.before.0, gap.after.0, gap.support);
        write_fasta_record(out, &header, &gap.seq)?;
    }
    Ok(gaps.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::path::{PathCount, PathStorage};
    use crate::gap::storage::GapDescription;
    use crate::graph::ConjugateGraph;
    use crate::simplify::test_util::has_seq;

    fn setup() -> (ConjugateGraph, EdgeId, EdgeId) {
        let mut g = ConjugateGraph::new(5).unwrap();
        let a = g.add_edge(b"ACCTGATTG", 10.0).unwrap();
        let b = g.add_edge(b"GCGAGTCAT", 20.0).unwrap();
        g.take_journal();
        (g, a, b)
    }

    fn closer(min_support: usize) -> GapCloser {
        GapCloser::new(GapCloserConfig { min_gap_support: min_support, ..GapCloserConfig::default() })
    }

    #[test]
    fn supported_gap_is_closed() {
        let (mut g, a, b) = setup();
        let mut paths = PathStorage::new();
        paths.add_path(&g, &[a], true);
        paths.add_path(&g, &[b], false);
        paths.add_path(&g, &[a, b], true);
        let mut storage = GapStorage::new();
        for fill in [&b"AAC"[..], b"AAC", b"AGC"] {
            storage.add_gap(&g, &GapDescription::new(a, b, fill.to_vec()));
        }
        storage.pad_gap_strings(&g).unwrap();

        let c = closer(2);
        let gaps = c.construct_consensus(2, &mut storage).unwrap();
        assert!(storage.is_empty());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].support, 3);

        let mut replacement = AHashMap::new();
        assert_eq!(c.close_gaps_in_graph(&mut g, &gaps, &mut replacement).unwrap(), 1);
        assert_eq!(g.edge_count(), 2);
        assert!(has_seq(&g, b"ACCTGATTGAACGCGAGTCAT"));
        let merged = resolve(&replacement, a);
        assert_eq!(resolve(&replacement, b), merged);
        assert!((g.coverage(merged) - 15.0).abs() < 1e-9);
        g.check_symmetry().unwrap();

        // 路径改写到合并后的边上，[a, b] 压缩成 [merged]
        paths.replace_edges(&replacement);
        assert_eq!(paths.count(&[merged]), PathCount { reads: 3, high_quality: 2 });
        assert_eq!(paths.count(&[g.conjugate_edge(merged)]), PathCount { reads: 3, high_quality: 2 });
        assert_eq!(paths.count(&[a]).reads, 0);
        assert_eq!(paths.len(), 2);

        // 再闭合一次没有可用缺口
        assert_eq!(c.close_gaps_in_graph(&mut g, &gaps, &mut replacement).unwrap(), 0);
    }

    #[test]
    fn weak_gap_is_left_unresolved() {
        let (g, a, b) = setup();
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        storage.pad_gap_strings(&g).unwrap();
        let gaps = closer(2).construct_consensus(1, &mut storage).unwrap();
        assert!(gaps.is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn unpadded_storage_is_rejected() {
        let (g, a, b) = setup();
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        assert!(closer(1).construct_consensus(1, &mut storage).is_err());
    }

    #[test]
    fn closed_gaps_as_fasta() {
        let gap = ClosedGap { before: EdgeId(0), after: EdgeId(2), seq: b"ACGTACGT".to_vec(), support: 4 };
        let mut out = Vec::new();
        assert_eq!(write_closed_gaps(&mut out, &[gap]).unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), ">gap_0_2_support_4\nACGTACGT\n");
    }
}
