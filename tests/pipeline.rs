//! 构图 -> 简化 -> 长读段补缺口 的端到端流程

use cdbg_rust::config::AssemblyConfig;
use cdbg_rust::gap::run_gap_closing;
use cdbg_rust::graph::construct::build_from_reads;
use cdbg_rust::graph::{ConjugateGraph, GraphLike};
use cdbg_rust::io::VecSource;
use cdbg_rust::pack::GraphPack;
use cdbg_rust::simplify::Simplifier;
use cdbg_rust::util::dna;

fn reference(len: usize) -> Vec<u8> {
    let bases = [b'A', b'C', b'G', b'T'];
    let mut x: u32 = 2024;
    (0..len)
        .map(|_| {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            bases[(x >> 30) as usize]
        })
        .collect()
}

/// 每隔 `step` 取一条读段；每第 `error_every` 条在中间放一个替换错误
fn short_reads(region: &[u8], read_len: usize, step: usize, error_every: usize) -> Vec<Vec<u8>> {
    let mut reads = Vec::new();
    let mut n = 0usize;
    let mut start = 0usize;
    while start + read_len <= region.len() {
        let mut r = region[start..start + read_len].to_vec();
        if error_every > 0 && n % error_every == 0 {
            let p = read_len / 2;
            r[p] = if r[p] == b'A' { b'C' } else { b'A' };
        }
        reads.push(r);
        n += 1;
        start += step;
    }
    reads
}

fn has_edge(g: &ConjugateGraph, seq: &[u8]) -> bool {
    let rc = dna::revcomp(seq);
    g.edge_ids().into_iter().any(|e| g.edge_seq(e) == seq || g.edge_seq(e) == rc.as_slice())
}

fn config() -> AssemblyConfig {
    AssemblyConfig { k: 21, read_length: 100, threads: 2, ..AssemblyConfig::default() }
}

#[test]
fn sequencing_errors_are_simplified_away() {
    let cfg = config();
    cfg.validate().unwrap();
    let genome = reference(2_000);
    let reads = short_reads(&genome, 100, 2, 10);
    let (graph, counts) = build_from_reads(&reads, cfg.k, 1).unwrap();
    let mut pack = GraphPack::new(graph, counts);
    assert!(pack.graph().edge_count() > 2);

    let stats = Simplifier::new(&cfg).run(&mut pack).unwrap();
    assert!(stats.total_removed() > 0);
    assert_eq!(pack.graph().edge_count(), 2);
    assert!(has_edge(pack.graph(), &genome));
    pack.check_invariants().unwrap();

    // 简化结果是不动点
    let again = Simplifier::new(&cfg).run(&mut pack).unwrap();
    assert_eq!(again.total_removed(), 0);
}

#[test]
fn long_reads_bridge_an_uncovered_region() {
    let cfg = config();
    let genome = reference(2_000);
    let mut reads = short_reads(&genome[..900], 100, 2, 0);
    reads.extend(short_reads(&genome[1_000..], 100, 2, 0));
    let (graph, counts) = build_from_reads(&reads, cfg.k, 1).unwrap();
    let mut pack = GraphPack::new(graph, counts);
    assert_eq!(pack.graph().edge_count(), 4);
    assert!(has_edge(pack.graph(), &genome[..900]));
    assert!(has_edge(pack.graph(), &genome[1_000..]));

    let long = genome[500..1_500].to_vec();
    let mut source = VecSource::from_seqs(vec![long.clone(), dna::revcomp(&long), long]);
    let stats = run_gap_closing(&mut pack, &mut source, &cfg, None).unwrap();

    assert_eq!(stats.gap_classes, 1);
    assert_eq!(stats.closed, 1);
    assert_eq!(pack.graph().edge_count(), 2);
    assert!(has_edge(pack.graph(), &genome));
    pack.check_invariants().unwrap();
}
