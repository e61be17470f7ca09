//! 从短读段构建压缩 de Bruijn 图。
//!
//! 统计所有 k+1-mer（正反链合并到规范形式），每个保留的 k+1-mer 作为一条
//! 长度为 1 的边加入图中，覆盖度即出现次数，最后把 (1,1) 链压缩成单条边。

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::info;

use super::{ConjugateGraph, GraphLike};
use crate::error::Result;
use crate::util::dna::{self, KmerIter};

/// 规范 k-mer：正向与反向互补编码中较小的一个
#[inline]
pub fn canonical(code: u128, len: usize) -> u128 {
    code.min(dna::revcomp_code(code, len))
}

/// 统计一批读段的规范 k+1-mer 出现次数
pub fn count_kmers(reads: &[Vec<u8>], kmer_len: usize) -> AHashMap<u128, u32> {
    reads
        .par_iter()
        .fold(AHashMap::new, |mut acc: AHashMap<u128, u32>, read| {
            for (_, code) in KmerIter::new(read, kmer_len) {
                *acc.entry(canonical(code, kmer_len)).or_insert(0) += 1;
            }
            acc
        })
        .reduce(AHashMap::new, |mut a, b| {
            for (code, n) in b {
                *a.entry(code).or_insert(0) += n;
            }
            a
        })
}

/// 由 k+1-mer 计数构图。计数不低于 `min_count` 的 k+1-mer 才成为边。
pub fn build_graph(counts: &AHashMap<u128, u32>, k: usize, min_count: u32) -> Result<ConjugateGraph> {
    let mut graph = ConjugateGraph::new(k)?;
    let mut kept: Vec<(u128, u32)> = counts
        .iter()
        .filter(|(_, &n)| n >= min_count)
        .map(|(&c, &n)| (c, n))
        .collect();
    // 按编码排序，保证边编号与运行无关
    kept.sort_unstable();

    for (code, n) in &kept {
        let seq = dna::decode_kmer(*code, k + 1);
        graph.add_edge(&seq, f64::from(*n))?;
    }
    let merges = graph.compress_chains()?;
    graph.take_journal();
    info!(
        kmers = kept.len(),
        merges = merges.len(),
        edges = graph.edge_count(),
        vertices = graph.vertex_count(),
        "condensed graph built"
    );
    Ok(graph)
}

/// 读段 -> (图, k+1-mer 计数)
pub fn build_from_reads(reads: &[Vec<u8>], k: usize, min_count: u32) -> Result<(ConjugateGraph, AHashMap<u128, u32>)> {
    let counts = count_kmers(reads, k + 1);
    let graph = build_graph(&counts, k, min_count)?;
    Ok((graph, counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_merge_strands() {
        let reads = vec![b"ACCTGAT".to_vec(), dna::revcomp(b"ACCTGAT")];
        let counts = count_kmers(&reads, 6);
        // 两条读段互为反向互补，每个规范 6-mer 出现两次
        assert_eq!(counts.len(), 2);
        assert!(counts.values().all(|&n| n == 2));
    }

    #[test]
    fn single_read_becomes_one_edge_pair() {
        let read = b"ACCTGATTGCGAGT".to_vec();
        let (g, counts) = build_from_reads(&[read.clone(), read.clone()], 5, 1).unwrap();
        assert_eq!(counts.len(), read.len() - 5);
        assert_eq!(g.edge_count(), 2);
        let e = g
            .edge_ids()
            .into_iter()
            .find(|&e| g.edge_seq(e) == read.as_slice())
            .expect("read spelled by one edge");
        assert_eq!(g.coverage(e), 2.0);
        g.check_symmetry().unwrap();
    }

    #[test]
    fn min_count_drops_rare_kmers() {
        let reads = vec![b"ACCTGATTGC".to_vec()];
        let (g, _) = build_from_reads(&reads, 5, 2).unwrap();
        assert_eq!(g.edge_count(), 0);
    }
}
