//! 错误连接（erroneous connection）删除：短且低覆盖、把两条独立路径连在一起的边。

use tracing::debug;

use super::condition::{Condition, ConditionContext};
use crate::config::TopologyEcConfig;
use crate::error::Result;
use crate::graph::{remove_edge_and_compress, EdgeId, GraphLike};

/// 两端都另有出路的边：起点还有别的出边，终点还有别的入边
fn is_connection<G: GraphLike>(graph: &G, e: EdgeId) -> bool {
    let start = graph.edge_start(e);
    let end = graph.edge_end(e);
    start != end
        && !graph.is_self_conjugate(e)
        && graph.outgoing_count(start) >= 2
        && graph.incoming_count(end) >= 2
}

/// 按覆盖度条件删除错误连接，覆盖度低的先处理
pub struct CoverageEcRemover {
    condition: Condition,
    ctx: ConditionContext,
}

impl CoverageEcRemover {
    pub fn new(condition: Condition, ctx: ConditionContext) -> Self {
        Self { condition, ctx }
    }

    fn is_candidate<G: GraphLike>(&self, graph: &G, e: EdgeId) -> bool {
        is_connection(graph, e) && self.condition.check(graph, e, &self.ctx)
    }

    pub fn run<G: GraphLike>(&self, graph: &mut G) -> Result<usize> {
        let mut total = 0usize;
        loop {
            let mut candidates: Vec<EdgeId> =
                graph.edge_ids().into_iter().filter(|&e| self.is_candidate(graph, e)).collect();
            candidates.sort_by(|&a, &b| graph.coverage(a).total_cmp(&graph.coverage(b)).then(a.cmp(&b)));

            let mut removed = 0usize;
            for e in candidates {
                if !graph.contains_edge(e) || !self.is_candidate(graph, e) {
                    continue;
                }
                debug!(edge = %e, len = graph.edge_length(e), cov = graph.coverage(e), "removing low coverage connection");
                remove_edge_and_compress(graph, e)?;
                removed += 1;
            }
            total += removed;
            if removed == 0 {
                break;
            }
        }
        Ok(total)
    }
}

/// 按拓扑删除错误连接：e 的两端各连着一条唯一的长路径，
/// 同时各有一条可信的分支，而 e 本身无法延伸成可信路径。
pub struct TopologyEcRemover {
    config: TopologyEcConfig,
    k: usize,
}

impl TopologyEcRemover {
    pub fn new(config: TopologyEcConfig, k: usize) -> Self {
        Self { config, k }
    }

    pub fn is_erroneous<G: GraphLike>(&self, graph: &G, e: EdgeId) -> bool {
        let cfg = &self.config;
        if graph.edge_length(e) > self.k + cfg.max_ec_length_coefficient || !is_connection(graph, e) {
            return false;
        }
        let start = graph.edge_start(e);
        let end = graph.edge_end(e);
        let conj = graph.conjugate_edge(e);

        let incoming = graph.incoming_edges(start);
        let unique_before = incoming.len() == 1
            && graph.unique_backward_length(incoming[0], cfg.uniqueness_length) >= cfg.uniqueness_length;
        let plausible_sibling = graph.outgoing_edges(start).iter().any(|&g| {
            g != e && g != conj && graph.unique_forward_length(g, cfg.plausibility_length) >= cfg.plausibility_length
        });

        let outgoing = graph.outgoing_edges(end);
        let unique_after = outgoing.len() == 1
            && graph.unique_forward_length(outgoing[0], cfg.uniqueness_length) >= cfg.uniqueness_length;
        let plausible_rival = graph.incoming_edges(end).into_iter().any(|g| {
            g != e && g != conj && graph.unique_backward_length(g, cfg.plausibility_length) >= cfg.plausibility_length
        });

        let implausible = graph.unique_forward_length(e, cfg.plausibility_length) < cfg.plausibility_length
            && graph.unique_backward_length(e, cfg.plausibility_length) < cfg.plausibility_length;

        unique_before && plausible_sibling && unique_after && plausible_rival && implausible
    }

    /// 一轮删除一批，直到没有变化或达到迭代上限
    pub fn run<G: GraphLike>(&self, graph: &mut G) -> Result<usize> {
        let mut total = 0usize;
        for _ in 0..self.config.max_iterations.max(1) {
            let mut candidates: Vec<EdgeId> =
                graph.edge_ids().into_iter().filter(|&e| self.is_erroneous(graph, e)).collect();
            candidates.sort_by(|&a, &b| graph.coverage(a).total_cmp(&graph.coverage(b)).then(a.cmp(&b)));

            let mut removed = 0usize;
            for e in candidates {
                if !graph.contains_edge(e) || !self.is_erroneous(graph, e) {
                    continue;
                }
                debug!(edge = %e, len = graph.edge_length(e), "removing topologically erroneous connection");
                remove_edge_and_compress(graph, e)?;
                removed += 1;
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

    const K: usize = 21;

    /// X -> u -> Y 与 V -> w -> Z 两条长路径，长度 8 的短边 u -> w 连接二者；
    /// w 与 u 重叠 k - 8 个碱基
    fn connected_paths(link_cov: f64) -> (ConjugateGraph, Vec<u8>) {
        let mut g = ConjugateGraph::new(K).unwrap();
        let [x, u, y, v, z] = [101, 102, 103, 104, 106].map(|s| random_seq(K, s));
        let link = [&u[..], &random_seq(8, 112)[..]].concat();
        let w = link[8..].to_vec();
        g.add_edge(&bridge(&x, &random_seq(120, 107), &u, K), 100.0).unwrap();
        g.add_edge(&bridge(&u, &random_seq(120, 108), &y, K), 100.0).unwrap();
        g.add_edge(&bridge(&v, &random_seq(120, 109), &w, K), 100.0).unwrap();
        g.add_edge(&bridge(&w, &random_seq(120, 110), &z, K), 100.0).unwrap();
        let e = g.add_edge(&link, link_cov).unwrap();
        assert_eq!(g.edge_length(e), 8);
        (g, link)
    }

    fn coverage_remover() -> CoverageEcRemover {
        let cond: Condition = "{ cb 20 , ec_lb 20 }".parse().unwrap();
        CoverageEcRemover::new(cond, ConditionContext::new(K, 100))
    }

    fn topology_remover() -> TopologyEcRemover {
        let cfg = TopologyEcConfig {
            uniqueness_length: 100,
            plausibility_length: 50,
            ..TopologyEcConfig::default()
        };
        TopologyEcRemover::new(cfg, K)
    }

    #[test]
    fn low_coverage_connection_is_removed() {
        let (mut g, link) = connected_paths(15.0);
        assert_eq!(coverage_remover().run(&mut g).unwrap(), 1);
        assert!(!has_seq(&g, &link));
        // 两端压缩后只剩两条长边
        assert_eq!(g.edge_count(), 4);
        g.check_symmetry().unwrap();
        assert_eq!(coverage_remover().run(&mut g).unwrap(), 0);
    }

    #[test]
    fn connection_above_cutoff_is_kept() {
        let (mut g, link) = connected_paths(25.0);
        assert_eq!(coverage_remover().run(&mut g).unwrap(), 0);
        assert!(has_seq(&g, &link));
    }

    #[test]
    fn iterative_bound_grows_with_round() {
        let (mut g, link) = connected_paths(15.0);
        let cond: Condition = "{ icb 40 , ec_lb 20 }".parse().unwrap();
        // 第 0 轮（共 4 轮）阈值 10
        let first = CoverageEcRemover::new(cond.clone(), ConditionContext::new(K, 100).at_iteration(0, 4));
        assert_eq!(first.run(&mut g).unwrap(), 0);
        // 第 1 轮阈值 20
        let second = CoverageEcRemover::new(cond, ConditionContext::new(K, 100).at_iteration(1, 4));
        assert_eq!(second.run(&mut g).unwrap(), 1);
        assert!(!has_seq(&g, &link));
    }

    #[test]
    fn topology_removes_link_between_unique_paths() {
        // 覆盖度很高也会删，只看拓扑
        let (mut g, link) = connected_paths(80.0);
        let r = topology_remover();
        assert_eq!(r.run(&mut g).unwrap(), 1);
        assert!(!has_seq(&g, &link));
        assert_eq!(g.edge_count(), 4);
        g.check_symmetry().unwrap();
        assert_eq!(r.run(&mut g).unwrap(), 0);
    }

    #[test]
    fn topology_needs_unique_flanks() {
        let (mut g, link) = connected_paths(80.0);
        let cfg = TopologyEcConfig { uniqueness_length: 1500, plausibility_length: 50, ..TopologyEcConfig::default() };
        assert_eq!(TopologyEcRemover::new(cfg, K).run(&mut g).unwrap(), 0);
        assert!(has_seq(&g, &link));
    }
}
