//! 图简化：剪尖端、去气泡、去错误连接、按相对覆盖度删除低覆盖分量。
//!
//! 每个 pass 都在自身循环到不动点后返回删除的边数，对结果再跑一次返回 0。
//! 所有删除共用同一原语：删边 -> 删除孤立端点 -> 压缩端点处的 (1,1) 链。

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AssemblyConfig;
use crate::error::Result;
use crate::graph::{cleanup_vertices, EdgeId, GraphLike, VertexId};
use crate::pack::GraphPack;

pub mod bulge;
pub mod complex_bulge;
pub mod condition;
pub mod ec;
pub mod max_flow;
pub mod relative_coverage;
pub mod tip;

pub use bulge::BulgeRemover;
pub use complex_bulge::ComplexBulgeRemover;
pub use condition::{Condition, ConditionContext};
pub use ec::{CoverageEcRemover, TopologyEcRemover};
pub use max_flow::MaxFlowEcRemover;
pub use relative_coverage::{FlankingCoverage, RelativeCoverageComponentRemover};
pub use tip::TipClipper;

/// 删除一组边（已不存在的跳过），最后统一清理涉及的端点。返回实际删除的边对数。
pub fn remove_edges_and_cleanup<G: GraphLike>(graph: &mut G, edges: &[EdgeId]) -> Result<usize> {
    let mut touched: Vec<VertexId> = Vec::with_capacity(edges.len() * 2);
    let mut removed = 0usize;
    for &e in edges {
        if !graph.contains_edge(e) {
            continue;
        }
        touched.push(graph.edge_start(e));
        touched.push(graph.edge_end(e));
        graph.remove_edge(e)?;
        removed += 1;
    }
    touched.sort_unstable();
    touched.dedup();
    cleanup_vertices(graph, &touched)?;
    Ok(removed)
}

/// 把被删除材料的覆盖度投影到保留路径上：每条保留边增加
/// `removed_coverage * removed_length / path_length`，按边编号升序处理。
/// 路径同时经过一条边和它的共轭边时，这一对只增加一次
pub fn project_coverage<G: GraphLike>(graph: &mut G, removed_coverage: f64, removed_length: usize, path: &[EdgeId]) {
    let path_len: usize = path.iter().map(|&e| graph.edge_length(e)).sum();
    if path_len == 0 {
        return;
    }
    let delta = removed_coverage * removed_length as f64 / path_len as f64;
    // 共轭边共享覆盖度，同一对只加一次
    let mut ordered: Vec<EdgeId> = path.iter().map(|&e| e.min(graph.conjugate_edge(e))).collect();
    ordered.sort_unstable();
    ordered.dedup();
    for e in ordered {
        let cov = graph.coverage(e);
        graph.set_coverage(e, cov + delta);
    }
}

/// 路径的长度加权平均覆盖度
pub fn path_coverage<G: GraphLike>(graph: &G, path: &[EdgeId]) -> f64 {
    let len: usize = path.iter().map(|&e| graph.edge_length(e)).sum();
    if len == 0 {
        return 0.0;
    }
    path.iter()
        .map(|&e| graph.coverage(e) * graph.edge_length(e) as f64)
        .sum::<f64>()
        / len as f64
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplificationStats {
    pub rounds: usize,
    pub tips: usize,
    pub bulges: usize,
    pub complex_bulges: usize,
    pub ec_coverage: usize,
    pub ec_topology: usize,
    pub ec_max_flow: usize,
    pub relative_coverage: usize,
    pub edges_left: usize,
}

impl SimplificationStats {
    pub fn total_removed(&self) -> usize {
        self.tips
            + self.bulges
            + self.complex_bulges
            + self.ec_coverage
            + self.ec_topology
            + self.ec_max_flow
            + self.relative_coverage
    }
}

/// 简化外层循环：tip -> bulge -> EC（覆盖度）-> 拓扑 EC -> 最大流 EC
/// -> 复杂气泡 -> 相对覆盖度，直到一轮没有任何变化或达到轮数上限，最后再剪一次尖端
pub struct Simplifier<'a> {
    config: &'a AssemblyConfig,
}

impl<'a> Simplifier<'a> {
    pub fn new(config: &'a AssemblyConfig) -> Self {
        Self { config }
    }

    /// 参数非法时直接返回 `AsmError::Config`，图保持原样
    pub fn run(&self, pack: &mut GraphPack) -> Result<SimplificationStats> {
        self.config.validate()?;
        let cfg = &self.config.simplification;
        let k = pack.k();
        let base_ctx = ConditionContext::new(k, self.config.read_length);
        let iterations = cfg.max_iterations.max(1);

        let tips = TipClipper::new(Condition::parse_bounded(&cfg.tip_clipper.condition)?, base_ctx);
        let bulges = BulgeRemover::new(cfg.bulge_remover.clone(), k);
        let complex = ComplexBulgeRemover::new(cfg.complex_bulge_remover.clone(), k);
        let ec_condition = Condition::parse_bounded(&cfg.erroneous_connections.condition)?;
        let topology = TopologyEcRemover::new(cfg.topology_ec.clone(), k);
        let max_flow = MaxFlowEcRemover::new(cfg.max_flow_ec.clone(), k);
        let relative = RelativeCoverageComponentRemover::new(cfg.relative_coverage.clone());

        let mut stats = SimplificationStats::default();
        for round in 0..iterations {
            let before = stats.total_removed();
            let ctx = base_ctx.at_iteration(round, iterations);

            stats.tips += pack.edit(|g| tips.run(g))?;
            if cfg.bulge_remover.enabled {
                stats.bulges += pack.edit(|g| bulges.run(g))?;
            }
            let ec = CoverageEcRemover::new(ec_condition.clone(), ctx);
            stats.ec_coverage += pack.edit(|g| ec.run(g))?;
            if cfg.topology_ec.enabled {
                stats.ec_topology += pack.edit(|g| topology.run(g))?;
            }
            if cfg.max_flow_ec.enabled {
                stats.ec_max_flow += pack.edit(|g| max_flow.run(g))?;
            }
            if cfg.complex_bulge_remover.enabled {
                stats.complex_bulges += pack.edit(|g| complex.run(g))?;
            }
            if cfg.relative_coverage.enabled {
                stats.relative_coverage += pack.edit_with_counts(|g, counts| {
                    let flanking = FlankingCoverage::new(counts, k + 1, cfg.relative_coverage.flanking_range);
                    relative.run(g, &flanking)
                })?;
            }

            stats.rounds = round + 1;
            if cfg.check_invariants {
                pack.check_invariants()?;
            }
            let removed = stats.total_removed() - before;
            info!(round, removed, edges = pack.graph().edge_count(), "simplification round finished");
            if removed == 0 {
                break;
            }
        }
        stats.tips += pack.edit(|g| tips.run(g))?;
        if cfg.check_invariants {
            pack.check_invariants()?;
        }
        stats.edges_left = pack.graph().edge_count();
        info!(?stats, "simplification finished");
        Ok(stats)
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::random_seq;
    use super::*;
    use crate::error::AsmError;
    use crate::graph::ConjugateGraph;
    use ahash::AHashMap;

    #[test]
    fn invalid_config_leaves_graph_untouched() {
        let mut g = ConjugateGraph::new(21).unwrap();
        g.add_edge(&random_seq(60, 611), 1.0).unwrap();
        g.add_edge(&random_seq(80, 612), 40.0).unwrap();
        let mut pack = GraphPack::new(g, AHashMap::new());
        let generation = pack.graph().generation();
        let edges = pack.graph().edge_count();

        let mut cfg = AssemblyConfig { k: 21, read_length: 10, ..AssemblyConfig::default() };
        cfg.simplification.relative_coverage.coverage_gap = -1.0;
        cfg.simplification.bulge_remover.max_relative_coverage = -2.0;
        cfg.simplification.complex_bulge_remover.max_length_multiplier = 0.0;

        let res = Simplifier::new(&cfg).run(&mut pack);
        assert!(matches!(res, Err(AsmError::Config(_))));
        assert_eq!(pack.graph().generation(), generation);
        assert_eq!(pack.graph().edge_count(), edges);

        // 只有一项非法也同样拒绝
        let mut cfg = AssemblyConfig { k: 21, read_length: 100, ..AssemblyConfig::default() };
        cfg.simplification.relative_coverage.coverage_gap = -1.0;
        assert!(matches!(Simplifier::new(&cfg).run(&mut pack), Err(AsmError::Config(_))));
        assert_eq!(pack.graph().generation(), generation);
    }

    #[test]
    fn coverage_is_projected_once_per_conjugate_pair() {
        let mut g = ConjugateGraph::new(21).unwrap();
        let x = g.add_edge(&random_seq(61, 621), 10.0).unwrap();
        let y = g.add_edge(&random_seq(61, 622), 10.0).unwrap();
        let cx = g.conjugate_edge(x);
        // 路径长度 40 + 40 + 40 = 120，delta = 6 * 40 / 120 = 2
        project_coverage(&mut g, 6.0, 40, &[cx, y, x]);
        assert!((g.coverage(x) - 12.0).abs() < 1e-9);
        assert!((g.coverage(cx) - 12.0).abs() < 1e-9);
        assert!((g.coverage(y) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn path_coverage_is_length_weighted() {
        let mut g = ConjugateGraph::new(21).unwrap();
        let x = g.add_edge(&random_seq(31, 631), 10.0).unwrap();
        let y = g.add_edge(&random_seq(51, 632), 40.0).unwrap();
        // (10 * 10 + 40 * 30) / 40
        assert!((path_coverage(&g, &[x, y]) - 32.5).abs() < 1e-9);
        assert_eq!(path_coverage(&g, &[]), 0.0);
    }
}
