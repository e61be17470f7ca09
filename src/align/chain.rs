use std::collections::BTreeMap;

use super::seed::Seed;
use crate::graph::EdgeId;

/// 同一条边上共线的种子链
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub edge: EdgeId,
    pub seeds: Vec<Seed>,
    pub score: u32,
}

impl Chain {
    pub fn read_begin(&self) -> usize {
        self.seeds.iter().map(|s| s.read_begin).min().unwrap_or(0)
    }

    pub fn read_end(&self) -> usize {
        self.seeds.iter().map(|s| s.read_end).max().unwrap_or(0)
    }

    pub fn edge_begin(&self) -> usize {
        self.seeds.iter().map(|s| s.edge_begin).min().unwrap_or(0)
    }

    pub fn edge_end(&self) -> usize {
        self.seeds.iter().map(|s| s.edge_end).max().unwrap_or(0)
    }
}

/// 单条边上的最佳链（DP）。相邻种子在 read 和边上都不能重叠，
/// 两侧间隔都不超过 `max_gap`，容忍少量插入缺失。
pub fn best_chain(seeds: &[Seed], max_gap: usize) -> Option<Chain> {
    if seeds.is_empty() {
        return None;
    }

    let mut idxs: Vec<usize> = (0..seeds.len()).collect();
    idxs.sort_by_key(|&i| {
        let s = &seeds[i];
        (s.edge, s.read_begin, s.edge_begin)
    });

    let n = idxs.len();
    let mut dp: Vec<u32> = vec![0; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    let mut best_t: Option<usize> = None;

    for (t, &i) in idxs.iter().enumerate() {
        let si = &seeds[i];
        let len_i = si.len() as u32;
        dp[t] = len_i;

        for (u, &j) in idxs[..t].iter().enumerate() {
            let sj = &seeds[j];
            if sj.edge != si.edge || sj.read_end > si.read_begin || sj.edge_end > si.edge_begin {
                continue;
            }
            let gap_read = si.read_begin - sj.read_end;
            let gap_edge = si.edge_begin - sj.edge_end;
            if gap_read > max_gap || gap_edge > max_gap {
                continue;
            }
            let cand = dp[u] + len_i;
            if cand > dp[t] {
                dp[t] = cand;
                prev[t] = Some(u);
            }
        }

        if best_t.map_or(true, |bt| dp[t] > dp[bt]) {
            best_t = Some(t);
        }
    }

    let best_t = best_t?;
    let mut chain_idxs: Vec<usize> = Vec::new();
    let mut cur = Some(best_t);
    while let Some(t) = cur {
        chain_idxs.push(idxs[t]);
        cur = prev[t];
    }
    chain_idxs.reverse();

    let edge = seeds[chain_idxs[0]].edge;
    Some(Chain { edge, seeds: chain_idxs.into_iter().map(|i| seeds[i]).collect(), score: dp[best_t] })
}

/// 按边分组，每条边贪心剥离出若干条链，按得分降序返回
pub fn build_chains(seeds: &[Seed], max_gap: usize) -> Vec<Chain> {
    let mut by_edge: BTreeMap<EdgeId, Vec<Seed>> = BTreeMap::new();
    for s in seeds {
        by_edge.entry(s.edge).or_default().push(*s);
    }

    let mut chains = Vec::new();
    for (_, mut remaining) in by_edge {
        for _ in 0..5 {
            let Some(chain) = best_chain(&remaining, max_gap) else { break };
            remaining.retain(|s| !chain.seeds.contains(s));
            chains.push(chain);
            if remaining.is_empty() {
                break;
            }
        }
    }

    chains.sort_by(|a, b| b.score.cmp(&a.score).then(a.read_begin().cmp(&b.read_begin())));
    chains
}

/// 去掉得分低于 `min_score` 的链，以及 read 上与更高分链高度重叠的链。
/// 相邻边在 read 上天然重叠 `allowed_overlap`（一个顶点 k-mer），这部分不计入重叠。
pub fn filter_chains(chains: &mut Vec<Chain>, min_score: u32, allowed_overlap: usize) {
    chains.retain(|c| c.score >= min_score);
    chains.sort_by(|a, b| b.score.cmp(&a.score).then(a.read_begin().cmp(&b.read_begin())));

    let mut keep = vec![true; chains.len()];
    for i in 0..chains.len() {
        if !keep[i] {
            continue;
        }
        let (qi_min, qi_max) = (chains[i].read_begin(), chains[i].read_end());
        for j in (i + 1)..chains.len() {
            if !keep[j] {
                continue;
            }
            let (qj_min, qj_max) = (chains[j].read_begin(), chains[j].read_end());
            let overlap = qi_max.min(qj_max).saturating_sub(qi_min.max(qj_min));
            let overlap = overlap.saturating_sub(allowed_overlap);
            let shorter = (qi_max - qi_min).min(qj_max - qj_min).saturating_sub(allowed_overlap);
            if overlap > 0 && (shorter == 0 || overlap as f64 / shorter as f64 > 0.8) {
                keep[j] = false;
            }
        }
    }

    let mut idx = 0;
    chains.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(edge: u32, rb: usize, re: usize, eb: usize) -> Seed {
        Seed { edge: EdgeId(edge), read_begin: rb, read_end: re, edge_begin: eb, edge_end: eb + (re - rb) }
    }

    #[test]
    fn best_chain_simple_diagonal() {
        let seeds = vec![seed(0, 0, 4, 0), seed(0, 4, 8, 4)];
        let chain = best_chain(&seeds, 10).expect("chain");
        assert_eq!(chain.edge, EdgeId(0));
        assert_eq!(chain.seeds.len(), 2);
        assert_eq!(chain.score, 8);
    }

    #[test]
    fn best_chain_avoids_overlapping_and_far_gaps() {
        let seeds = vec![seed(0, 0, 4, 0), seed(0, 3, 6, 3), seed(0, 20, 24, 20), seed(0, 4, 8, 4)];
        let chain = best_chain(&seeds, 10).expect("chain");
        assert_eq!(chain.seeds.len(), 2);
        assert_eq!(chain.seeds[0].read_begin, 0);
        assert_eq!(chain.seeds[1].read_begin, 4);
        assert_eq!(chain.score, 8);
    }

    #[test]
    fn chain_tolerates_small_indel() {
        // 边上多出 2 个碱基
        let seeds = vec![seed(0, 0, 30, 0), seed(0, 31, 60, 33)];
        let chain = best_chain(&seeds, 5).unwrap();
        assert_eq!(chain.seeds.len(), 2);
        assert_eq!((chain.edge_begin(), chain.edge_end()), (0, 62));
    }

    #[test]
    fn build_chains_per_edge() {
        let seeds = vec![seed(0, 0, 4, 0), seed(0, 4, 8, 4), seed(2, 10, 20, 0), seed(0, 0, 4, 100)];
        let chains = build_chains(&seeds, 10);
        assert_eq!(chains.len(), 3);
        assert_eq!(chains[0].edge, EdgeId(2));
        assert_eq!(chains[0].score, 10);
    }

    #[test]
    fn filter_chains_removes_weak_and_shadowed() {
        let mut chains = vec![
            Chain { edge: EdgeId(0), seeds: vec![seed(0, 0, 40, 0)], score: 40 },
            Chain { edge: EdgeId(2), seeds: vec![seed(2, 5, 30, 0)], score: 25 },
            Chain { edge: EdgeId(4), seeds: vec![seed(4, 100, 103, 0)], score: 3 },
        ];
        filter_chains(&mut chains, 6, 0);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].edge, EdgeId(0));
    }

    #[test]
    fn adjacent_edges_overlap_by_a_vertex() {
        let mut chains = vec![
            Chain { edge: EdgeId(0), seeds: vec![seed(0, 0, 40, 0)], score: 40 },
            // 只含一个 k+1-mer 的短边，与前一条边共享 k 个碱基
            Chain { edge: EdgeId(2), seeds: vec![seed(2, 35, 41, 0)], score: 6 },
        ];
        filter_chains(&mut chains, 6, 5);
        assert_eq!(chains.len(), 2);
    }
}
