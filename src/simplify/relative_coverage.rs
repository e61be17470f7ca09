use ahash::{AHashMap, AHashSet};
use tracing::debug;

use super::remove_edges_and_cleanup;
use crate::config::RelativeCoverageConfig;
use crate::error::Result;
use crate::graph::construct::canonical;
use crate::graph::{EdgeId, GraphLike, VertexId};
use crate::util::dna::KmerIter;

/// 边两端的侧翼覆盖度：起始 / 末尾 `range` 个 k+1-mer 的平均计数。
/// 计数表里没有的 k+1-mer 用边自身的覆盖度代替。
pub struct FlankingCoverage<'a> {
    counts: &'a AHashMap<u128, u32>,
    kmer_len: usize,
    range: usize,
}

impl<'a> FlankingCoverage<'a> {
    pub fn new(counts: &'a AHashMap<u128, u32>, kmer_len: usize, range: usize) -> Self {
        Self { counts, kmer_len, range: range.max(1) }
    }

    fn mean<G: GraphLike>(&self, graph: &G, e: EdgeId, at_start: bool) -> f64 {
        let seq = graph.edge_seq(e);
        let fallback = graph.coverage(e);
        if seq.len() < self.kmer_len {
            return fallback;
        }
        let positions = seq.len() - self.kmer_len + 1;
        let span = self.range.min(positions) + self.kmer_len - 1;
        let window = if at_start { &seq[..span] } else { &seq[seq.len() - span..] };

        let (sum, n) = KmerIter::new(window, self.kmer_len).fold((0.0, 0usize), |(sum, n), (_, code)| {
            let c = self
                .counts
                .get(&canonical(code, self.kmer_len))
                .map_or(fallback, |&c| c as f64);
            (sum + c, n + 1)
        });
        if n == 0 {
            fallback
        } else {
            sum / n as f64
        }
    }

    pub fn start_coverage<G: GraphLike>(&self, graph: &G, e: EdgeId) -> f64 {
        self.mean(graph, e, true)
    }

    pub fn end_coverage<G: GraphLike>(&self, graph: &G, e: EdgeId) -> f64 {
        self.mean(graph, e, false)
    }

    /// 与顶点 v 相邻一端的侧翼覆盖度
    fn at_vertex<G: GraphLike>(&self, graph: &G, e: EdgeId, v: VertexId) -> f64 {
        if graph.edge_start(e) == v {
            self.start_coverage(graph, e)
        } else {
            self.end_coverage(graph, e)
        }
    }
}

/// 删除相对周围覆盖度明显偏低的短边分量
pub struct RelativeCoverageComponentRemover {
    config: RelativeCoverageConfig,
}

impl RelativeCoverageComponentRemover {
    pub fn new(config: RelativeCoverageConfig) -> Self {
        Self { config }
    }

    /// 分量顶点上所有不在分量内的相邻边及其在该顶点一侧的侧翼覆盖度
    fn border<G: GraphLike>(
        graph: &G,
        flanking: &FlankingCoverage<'_>,
        vertices: &[VertexId],
        component: &AHashSet<EdgeId>,
    ) -> Vec<(EdgeId, VertexId, f64)> {
        let mut out = Vec::new();
        for &v in vertices {
            let adjacent = graph.outgoing_edges(v).iter().copied().chain(graph.incoming_edges(v));
            for b in adjacent {
                if !component.contains(&b) {
                    out.push((b, v, flanking.at_vertex(graph, b, v)));
                }
            }
        }
        out
    }

    /// 从边 e 出发生长分量，满足删除条件时返回分量中的边
    pub fn find_component<G: GraphLike>(
        &self,
        graph: &G,
        flanking: &FlankingCoverage<'_>,
        e: EdgeId,
    ) -> Option<Vec<EdgeId>> {
        let cfg = &self.config;
        let mut component: AHashSet<EdgeId> = AHashSet::new();
        component.insert(e);
        let mut vertices = vec![graph.edge_start(e)];
        if graph.edge_end(e) != graph.edge_start(e) {
            vertices.push(graph.edge_end(e));
        }
        let mut max_cov = graph.coverage(e);

        let border = loop {
            let border = Self::border(graph, flanking, &vertices, &component);
            let threshold = cfg.coverage_gap * max_cov;
            let Some(&(b, v, _)) = border.iter().find(|&&(_, _, flank)| flank < threshold) else {
                break border;
            };
            if graph.edge_length(b) > cfg.length_bound || component.len() >= cfg.max_component_edges {
                return None;
            }
            component.insert(b);
            let other = if graph.edge_start(b) == v { graph.edge_end(b) } else { graph.edge_start(b) };
            if !vertices.contains(&other) {
                vertices.push(other);
            }
            max_cov = max_cov.max(graph.coverage(b));
        };

        if border.is_empty() {
            return None;
        }
        let min_flank = cfg.min_border_coverage.max(cfg.coverage_gap * max_cov);
        if border.iter().any(|&(_, _, flank)| flank < min_flank) {
            return None;
        }
        let conj_in_component = component.iter().any(|&c| {
            let conj = graph.conjugate_edge(c);
            conj != c && component.contains(&conj)
        });
        if conj_in_component || border.iter().any(|&(b, _, _)| component.contains(&graph.conjugate_edge(b))) {
            return None;
        }
        let mut edges: Vec<EdgeId> = component.into_iter().collect();
        edges.sort_unstable();
        Some(edges)
    }

    pub fn run<G: GraphLike>(&self, graph: &mut G, flanking: &FlankingCoverage<'_>) -> Result<usize> {
        let bound = self.config.length_bound;
        let mut total = 0usize;
        loop {
            let mut candidates: Vec<EdgeId> = graph
                .edge_ids()
                .into_iter()
                .filter(|&e| graph.edge_length(e) <= bound && !graph.is_self_conjugate(e))
                .collect();
            candidates.sort_by(|&a, &b| graph.coverage(a).total_cmp(&graph.coverage(b)).then(a.cmp(&b)));

            let mut removed = 0usize;
            for e in candidates {
                if !graph.contains_edge(e) {
                    continue;
                }
                let Some(component) = self.find_component(graph, flanking, e) else { continue };
                debug!(edge = %e, size = component.len(), "removing relatively low coverage component");
                removed += remove_edges_and_cleanup(graph, &component)?;
            }
            total += removed;
            if removed == 0 {
                break;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConjugateGraph;
    use crate::simplify::test_util::{bridge, has_seq, random_seq};
    use crate::util::dna;

    const K: usize = 21;

    /// X -> u -> Y 与 V -> w -> Z 两条高覆盖路径，中间一条短边 u -> w
    fn island(link_cov: f64) -> (ConjugateGraph, Vec<u8>) {
        let mut g = ConjugateGraph::new(K).unwrap();
        let [x, u, y, v, w, z] = [101, 102, 103, 104, 105, 106].map(|s| random_seq(K, s));
        g.add_edge(&bridge(&x, &random_seq(120, 107), &u, K), 100.0).unwrap();
        g.add_edge(&bridge(&u, &random_seq(120, 108), &y, K), 100.0).unwrap();
        g.add_edge(&bridge(&v, &random_seq(120, 109), &w, K), 100.0).unwrap();
        g.add_edge(&bridge(&w, &random_seq(120, 110), &z, K), 100.0).unwrap();
        let link = bridge(&u, &random_seq(8, 112), &w, K);
        g.add_edge(&link, link_cov).unwrap();
        (g, link)
    }

    #[test]
    fn flanks_fall_back_to_edge_coverage() {
        let mut g = ConjugateGraph::new(5).unwrap();
        let e = g.add_edge(b"ACCTGATTG", 7.0).unwrap();
        let mut counts = AHashMap::new();
        for (kmer, n) in [(&b"ACCTGA"[..], 10), (&b"CCTGAT"[..], 20)] {
            let code = dna::encode_kmer(kmer).unwrap();
            counts.insert(canonical(code, 6), n);
        }
        let flanking = FlankingCoverage::new(&counts, 6, 2);
        assert!((flanking.start_coverage(&g, e) - 15.0).abs() < 1e-9);
        // 末尾两个 6-mer 都不在计数表中
        assert!((flanking.end_coverage(&g, e) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn removes_low_island_between_high_flanks() {
        let (mut g, link) = island(2.0);
        let counts = AHashMap::new();
        let flanking = FlankingCoverage::new(&counts, K + 1, 50);
        let r = RelativeCoverageComponentRemover::new(RelativeCoverageConfig::default());
        assert_eq!(r.run(&mut g, &flanking).unwrap(), 1);
        assert!(!has_seq(&g, &link));
        assert_eq!(g.edge_count(), 4);
        g.check_symmetry().unwrap();
        assert_eq!(r.run(&mut g, &flanking).unwrap(), 0);
    }

    #[test]
    fn comparable_coverage_is_kept() {
        let (mut g, link) = island(50.0);
        let counts = AHashMap::new();
        let flanking = FlankingCoverage::new(&counts, K + 1, 50);
        let r = RelativeCoverageComponentRemover::new(RelativeCoverageConfig::default());
        // 5 x 50 高于侧翼，需要吸收长边，超出长度上限
        assert_eq!(r.run(&mut g, &flanking).unwrap(), 0);
        assert!(has_seq(&g, &link));
    }
}
