use tracing::debug;

use super::condition::{Condition, ConditionContext};
use crate::error::Result;
use crate::graph::{remove_edge_and_compress, EdgeId, GraphLike};

/// 剪除尖端（死胡同短边）。
///
/// 尖端：终点出度 0、入度 1，起点出度 >= 2。反向尖端是正向尖端的共轭，
/// 删除正向尖端时随之删除，不需要单独处理。
pub struct TipClipper {
    condition: Condition,
    ctx: ConditionContext,
}

impl TipClipper {
    pub fn new(condition: Condition, ctx: ConditionContext) -> Self {
        Self { condition, ctx }
    }

    pub fn is_tip<G: GraphLike>(graph: &G, e: EdgeId) -> bool {
        let start = graph.edge_start(e);
        let end = graph.edge_end(e);
        start != end
            && graph.outgoing_count(end) == 0
            && graph.incoming_count(end) == 1
            && graph.outgoing_count(start) >= 2
    }

    /// 候选按 长度、覆盖度、编号 升序处理，删除前重新检查
    pub fn run<G: GraphLike>(&self, graph: &mut G) -> Result<usize> {
        let max_len = self.condition.max_length(&self.ctx).unwrap_or(usize::MAX);
        let mut total = 0usize;
        loop {
            let mut candidates: Vec<EdgeId> = graph
                .edge_ids()
                .into_iter()
                .filter(|&e| graph.edge_length(e) <= max_len && Self::is_tip(graph, e))
                .collect();
            candidates.sort_by(|&a, &b| {
                graph
                    .edge_length(a)
                    .cmp(&graph.edge_length(b))
                    .then(graph.coverage(a).total_cmp(&graph.coverage(b)))
                    .then(a.cmp(&b))
            });

            let mut removed = 0usize;
            for e in candidates {
                if !graph.contains_edge(e) || !Self::is_tip(graph, e) || !self.condition.check(graph, e, &self.ctx) {
                    continue;
                }
                debug!(edge = %e, len = graph.edge_length(e), cov = graph.coverage(e), "clipping tip");
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
