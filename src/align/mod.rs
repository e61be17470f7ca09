//! 长读段到图的比对：采样 k+1-mer 种子 -> 同边共线成链 -> 按读段顺序把链连成路径，
//! 无法在图中连通的相邻链之间记录缺口。

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{AssemblyConfig, GapCloserConfig};
use crate::error::{AsmError, Result};
use crate::gap::{GapDescription, GapStorage, PathStorage};
use crate::graph::{ConjugateGraph, EdgeId, GraphLike, VertexId};
use crate::index::{IndexLike, KmerIndex};
use crate::io::{SequenceRecord, SequenceSource};
use crate::pack::GraphPack;
use crate::util::dna;

pub mod chain;
pub mod seed;
pub mod sw;

use chain::{build_chains, filter_chains, Chain};
use seed::find_seeds;

/// 读段连续走过的一段边路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPath {
    pub edges: Vec<EdgeId>,
    /// 路径上每条链的得分都不低于两倍种子长度
    pub high_quality: bool,
}

/// 单条读段的比对结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadMapping {
    pub paths: Vec<MappedPath>,
    pub gaps: Vec<GapDescription>,
}

/// 长读段比对器。持有独立的种子索引，比对期间只读借用图。
pub struct LongReadAligner<'a> {
    graph: &'a ConjugateGraph,
    index: KmerIndex,
    config: GapCloserConfig,
}

impl<'a> LongReadAligner<'a> {
    pub fn new(graph: &'a ConjugateGraph, config: &GapCloserConfig) -> Result<Self> {
        let k = graph.k();
        let seed_len = config.seed_len(k);
        if seed_len == 0 || seed_len > k + 1 {
            return Err(AsmError::config(format!("seed length {seed_len} must be in 1..={}", k + 1)));
        }
        let mut index = KmerIndex::new(seed_len);
        index.refill(graph);
        index.attach(graph);
        Ok(Self { graph, index, config: config.clone() })
    }

    /// 读段在边 `e` 上比对区间投影出的整条边在读段上的起点
    fn projected_start(chain: &Chain) -> isize {
        chain.read_begin() as isize - chain.edge_begin() as isize
    }

    fn projected_end(&self, chain: &Chain) -> isize {
        let tail = self.graph.edge_seq(chain.edge).len() - chain.edge_end();
        (chain.read_end() + tail) as isize
    }

    /// 从 from 到 to 的最短路径（按边长），总长不超过 `max_path_search_length`
    fn connecting_path(&self, from: VertexId, to: VertexId) -> Option<Vec<EdgeId>> {
        if from == to {
            return Some(Vec::new());
        }
        let limit = self.config.max_path_search_length;
        let mut dist: AHashMap<VertexId, usize> = AHashMap::new();
        let mut via: AHashMap<VertexId, EdgeId> = AHashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(from, 0);
        heap.push(Reverse((0usize, from)));
        while let Some(Reverse((d, v))) = heap.pop() {
            if v == to {
                let mut path = Vec::new();
                let mut cur = to;
                while cur != from {
                    let &e = via.get(&cur)?;
                    path.push(e);
                    cur = self.graph.edge_start(e);
                }
                path.reverse();
                return Some(path);
            }
            if dist.get(&v).is_some_and(|&best| best < d) {
                continue;
            }
            for &e in self.graph.outgoing_edges(v) {
                let w = self.graph.edge_end(e);
                let nd = d + self.graph.edge_length(e);
                if nd > limit {
                    continue;
                }
                if dist.get(&w).map_or(true, |&best| nd < best) {
                    dist.insert(w, nd);
                    via.insert(w, e);
                    heap.push(Reverse((nd, w)));
                }
            }
        }
        None
    }

    fn is_confident(&self, chain: &Chain) -> bool {
        chain.score as usize >= 2 * self.index.kmer_len()
    }

    /// 相邻两条链之间的缺口：读段在 a 的末端附近离开、在 b 的起点附近进入
    fn gap_between(&self, read: &[u8], a: &Chain, b: &Chain) -> Option<GapDescription> {
        let tolerance = self.config.end_tolerance;
        let a_tail = self.graph.edge_seq(a.edge).len() - a.edge_end();
        if a_tail > tolerance || b.edge_begin() > tolerance {
            return None;
        }
        let fill_start = self.projected_end(a);
        let fill_end = Self::projected_start(b);
        if fill_start < 0 || fill_end < fill_start || fill_end as usize > read.len() {
            return None;
        }
        let fill = read[fill_start as usize..fill_end as usize].to_vec();
        Some(GapDescription::new(a.edge, b.edge, fill).with_quality(self.is_confident(a) && self.is_confident(b)))
    }

    pub fn get_read_alignment(&self, read: &[u8]) -> Result<ReadMapping> {
        let k = self.graph.k();
        let read = dna::normalize_seq(read);
        let seeds = find_seeds(&self.index, &read, self.config.seed_step)?;
        let mut chains = build_chains(&seeds, self.config.max_seed_gap);
        filter_chains(&mut chains, self.index.kmer_len() as u32, k);
        chains.sort_by_key(|c| (c.read_begin(), c.edge));

        let mut mapping = ReadMapping::default();
        let mut path: Vec<EdgeId> = Vec::new();
        let mut confident = true;
        let mut last: Option<&Chain> = None;
        for chain in &chains {
            let Some(prev) = last else {
                path.push(chain.edge);
                confident = self.is_confident(chain);
                last = Some(chain);
                continue;
            };
            if prev.edge == chain.edge {
                confident &= self.is_confident(chain);
                last = Some(chain);
                continue;
            }
            let from = self.graph.edge_end(prev.edge);
            let to = self.graph.edge_start(chain.edge);
            if let Some(between) = self.connecting_path(from, to) {
                path.extend(between);
                path.push(chain.edge);
                confident &= self.is_confident(chain);
            } else {
                if let Some(gap) = self.gap_between(&read, prev, chain) {
                    mapping.gaps.push(gap);
                }
                mapping.paths.push(MappedPath { edges: std::mem::take(&mut path), high_quality: confident });
                path.push(chain.edge);
                confident = self.is_confident(chain);
            }
            last = Some(chain);
        }
        if !path.is_empty() {
            mapping.paths.push(MappedPath { edges: path, high_quality: confident });
        }
        Ok(mapping)
    }
}

fn map_batch(
    aligner: &LongReadAligner<'_>,
    pool: &rayon::ThreadPool,
    batch: &[SequenceRecord],
) -> Result<(PathStorage, GapStorage)> {
    let graph = aligner.graph;
    pool.install(|| {
        batch
            .par_iter()
            .try_fold(
                || (PathStorage::new(), GapStorage::new()),
                |(mut paths, mut gaps), rec| {
                    let mapping = aligner.get_read_alignment(&rec.seq)?;
                    for p in &mapping.paths {
                        paths.add_path(graph, &p.edges, p.high_quality);
                    }
                    for g in &mapping.gaps {
                        gaps.add_gap(graph, g);
                    }
                    Ok::<_, AsmError>((paths, gaps))
                },
            )
            .try_reduce(
                || (PathStorage::new(), GapStorage::new()),
                |(mut p1, mut g1), (p2, g2)| {
                    p1.merge(p2);
                    g1.merge(g2);
                    Ok((p1, g1))
                },
            )
    })
}

/// 分批比对所有长读段。每批在 `threads` 个工作线程上并行，各线程持有私有存储，
/// 批次结束后在调用线程合并；失败的批次用同一缓冲区重试 `batch_retries` 次。
pub fn map_long_reads(
    pack: &GraphPack,
    source: &mut dyn SequenceSource,
    config: &AssemblyConfig,
) -> Result<(PathStorage, GapStorage)> {
    config.validate()?;
    let gc = &config.gap_closer;
    let aligner = LongReadAligner::new(pack.graph(), gc)?;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(config.threads.max(1)).build()?;
    let batch_size = gc.batch_size.max(1);

    let mut paths = PathStorage::new();
    let mut gaps = GapStorage::new();
    let mut batch: Vec<SequenceRecord> = Vec::with_capacity(batch_size.min(1 << 16));
    let mut reads = 0usize;
    let mut batches = 0usize;
    loop {
        batch.clear();
        while batch.len() < batch_size {
            match source.next_sequence()? {
                Some(rec) => batch.push(rec),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let mut attempt = 0usize;
        let (p, g) = loop {
            match map_batch(&aligner, &pool, &batch) {
                Ok(done) => break done,
                Err(e) if attempt < gc.batch_retries && !e.is_fatal() => {
                    attempt += 1;
                    warn!(batch = batches, attempt, error = %e, "retrying long read batch");
                }
                Err(e) => return Err(e),
            }
        };
        paths.merge(p);
        gaps.merge(g);
        reads += batch.len();
        batches += 1;
        info!(batch = batches, reads, gap_classes = gaps.len(), "long read batch mapped");
    }
    info!(reads, batches, paths = paths.len(), gaps = gaps.gap_count(), "long read mapping finished");
    Ok((paths, gaps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VecSource;
    use crate::simplify::test_util::random_seq;

    const K: usize = 21;

    /// 两条互不相连的长边 A、B
    fn split_graph() -> (ConjugateGraph, Vec<u8>, Vec<u8>) {
        let mut g = ConjugateGraph::new(K).unwrap();
        let a = random_seq(200, 501);
        let b = random_seq(200, 502);
        g.add_edge(&a, 20.0).unwrap();
        g.add_edge(&b, 20.0).unwrap();
        g.take_journal();
        (g, a, b)
    }

    fn edge_of(g: &ConjugateGraph, seq: &[u8]) -> EdgeId {
        g.edge_ids().into_iter().find(|&e| g.edge_seq(e) == seq).unwrap()
    }

    fn edges_of(m: &ReadMapping) -> Vec<Vec<EdgeId>> {
        m.paths.iter().map(|p| p.edges.clone()).collect()
    }

    #[test]
    fn read_across_missing_link_reports_gap() {
        let (g, a, b) = split_graph();
        let fill = random_seq(30, 503);
        let read = [&a[80..], &fill[..], &b[..120]].concat();

        let aligner = LongReadAligner::new(&g, &GapCloserConfig::default()).unwrap();
        let m = aligner.get_read_alignment(&read).unwrap();
        let (ea, eb) = (edge_of(&g, &a), edge_of(&g, &b));
        assert_eq!(edges_of(&m), vec![vec![ea], vec![eb]]);
        assert!(m.paths.iter().all(|p| p.high_quality));
        assert_eq!(m.gaps, vec![GapDescription::new(ea, eb, fill)]);
    }

    #[test]
    fn read_inside_one_edge_has_no_gap() {
        let (g, a, _) = split_graph();
        let aligner = LongReadAligner::new(&g, &GapCloserConfig::default()).unwrap();
        let m = aligner.get_read_alignment(&a[10..150]).unwrap();
        assert_eq!(edges_of(&m), vec![vec![edge_of(&g, &a)]]);
        assert!(m.gaps.is_empty());
    }

    #[test]
    fn adjacent_edges_form_one_path() {
        let mut g = ConjugateGraph::new(K).unwrap();
        let a = random_seq(150, 511);
        let b = [&a[a.len() - K..], &random_seq(150, 512)[..]].concat();
        let c = [&a[a.len() - K..], &random_seq(150, 513)[..]].concat();
        g.add_edge(&a, 10.0).unwrap();
        g.add_edge(&b, 10.0).unwrap();
        g.add_edge(&c, 10.0).unwrap();
        let read = [&a[20..], &b[K..100]].concat();

        let aligner = LongReadAligner::new(&g, &GapCloserConfig::default()).unwrap();
        let m = aligner.get_read_alignment(&read).unwrap();
        assert_eq!(edges_of(&m), vec![vec![edge_of(&g, &a), edge_of(&g, &b)]]);
        assert!(m.gaps.is_empty());
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let (g, _, _) = split_graph();
        let cfg = GapCloserConfig { seed_len: Some(K + 2), ..GapCloserConfig::default() };
        assert!(matches!(LongReadAligner::new(&g, &cfg), Err(AsmError::Config(_))));
    }

    #[test]
    fn batches_are_merged_across_workers() {
        let (g, a, b) = split_graph();
        let fill = random_seq(30, 503);
        let read = [&a[80..], &fill[..], &b[..120]].concat();
        let rc = dna::revcomp(&read);
        let pack = GraphPack::new(g, AHashMap::new());
        let mut config = AssemblyConfig { threads: 2, ..AssemblyConfig::default() };
        config.gap_closer.batch_size = 2;
        let mut source = VecSource::from_seqs(vec![read.clone(), rc, read.clone(), read]);

        let (paths, gaps) = map_long_reads(&pack, &mut source, &config).unwrap();
        // 正反链读段落在同一缺口类
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps.gap_count(), 4);
        let (_, fills) = gaps.classes().next().unwrap();
        assert!(fills.windows(2).all(|w| w[0].seq == w[1].seq));
        let (ea, eb) = (edge_of(pack.graph(), &a), edge_of(pack.graph(), &b));
        assert_eq!(gaps.support(pack.graph(), ea, eb), (4, 4));
        // A、B 各自的单边路径及其共轭
        assert_eq!(paths.len(), 4);
    }

    #[test]
    fn invalid_config_is_rejected_before_reading() {
        let (g, a, _) = split_graph();
        let pack = GraphPack::new(g, AHashMap::new());
        let mut config = AssemblyConfig { threads: 2, ..AssemblyConfig::default() };
        config.gap_closer.batch_size = 0;
        let mut source = VecSource::from_seqs(vec![a]);
        assert!(matches!(map_long_reads(&pack, &mut source, &config), Err(AsmError::Config(_))));
    }
}
