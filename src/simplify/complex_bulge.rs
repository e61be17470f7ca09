use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use super::{path_coverage, project_coverage, remove_edges_and_cleanup};
use crate::config::ComplexBulgeRemoverConfig;
use crate::error::Result;
use crate::graph::{EdgeId, GraphLike, VertexId};

/// 复杂气泡：从一个分叉点出发、在另一个顶点重新汇合的有向无环封闭区域。
/// 只保留区域内 覆盖度 x 长度 之和最大的路径，其余边的覆盖度投影到该路径后删除。
pub struct ComplexBulgeRemover {
    config: ComplexBulgeRemoverConfig,
    k: usize,
}

/// 待折叠的区域
#[derive(Debug, Clone, PartialEq)]
pub struct BulgeRegion {
    pub source: VertexId,
    pub sink: VertexId,
    pub dominant: Vec<EdgeId>,
    pub others: Vec<EdgeId>,
}

impl ComplexBulgeRemover {
    pub fn new(config: ComplexBulgeRemoverConfig, k: usize) -> Self {
        Self { config, k }
    }

    pub fn max_length(&self) -> usize {
        (self.k as f64 * self.config.max_length_multiplier).round() as usize
    }

    /// 从 `source` 出发按最短距离探索，返回可达顶点及距离，顶点数超限时返回 None
    fn explore<G: GraphLike>(&self, graph: &G, source: VertexId, limit: usize) -> Option<Vec<(usize, VertexId)>> {
        let mut dist: AHashMap<VertexId, usize> = AHashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(source, 0);
        heap.push(Reverse((0usize, source)));
        let mut settled = Vec::new();
        while let Some(Reverse((d, v))) = heap.pop() {
            if dist.get(&v).is_some_and(|&best| best < d) {
                continue;
            }
            settled.push((d, v));
            if settled.len() > self.config.max_vertices {
                return None;
            }
            for &e in graph.outgoing_edges(v) {
                let w = graph.edge_end(e);
                let nd = d + graph.edge_length(e);
                if nd > limit {
                    continue;
                }
                if dist.get(&w).map_or(true, |&best| nd < best) {
                    dist.insert(w, nd);
                    heap.push(Reverse((nd, w)));
                }
            }
        }
        Some(settled)
    }

    /// 以 `source` 为起点的最近一个可折叠区域
    pub fn find_region<G: GraphLike>(&self, graph: &G, source: VertexId) -> Option<BulgeRegion> {
        if graph.outgoing_count(source) < 2 {
            return None;
        }
        let limit = self.max_length();
        let reached = self.explore(graph, source, limit)?;
        let reachable: AHashSet<VertexId> = reached.iter().map(|&(_, v)| v).collect();

        for &(_, sink) in reached.iter().skip(1) {
            if graph.incoming_count(sink) < 2 {
                continue;
            }
            let Some(members) = Self::closed_members(graph, source, sink, &reachable) else {
                continue;
            };
            if let Some(region) = self.evaluate(graph, source, sink, &members, limit) {
                return Some(region);
            }
        }
        None
    }

    /// 能到达 sink 的可达顶点集合；要求区域封闭：
    /// 内部顶点的入边和出边、source 的出边、sink 的入边都留在区域内
    fn closed_members<G: GraphLike>(
        graph: &G,
        source: VertexId,
        sink: VertexId,
        reachable: &AHashSet<VertexId>,
    ) -> Option<Vec<VertexId>> {
        let mut members: AHashSet<VertexId> = AHashSet::new();
        let mut stack = vec![sink];
        members.insert(sink);
        while let Some(v) = stack.pop() {
            if v == source {
                continue;
            }
            for e in graph.incoming_edges(v) {
                let u = graph.edge_start(e);
                if !reachable.contains(&u) {
                    return None;
                }
                if members.insert(u) {
                    stack.push(u);
                }
            }
        }
        if !members.contains(&source) {
            return None;
        }
        for &v in &members {
            if members.contains(&graph.conjugate_vertex(v)) {
                return None;
            }
            if v != sink && graph.outgoing_edges(v).iter().any(|&e| !members.contains(&graph.edge_end(e))) {
                return None;
            }
        }
        let mut out: Vec<VertexId> = members.into_iter().collect();
        out.sort_unstable();
        Some(out)
    }

    fn evaluate<G: GraphLike>(
        &self,
        graph: &G,
        source: VertexId,
        sink: VertexId,
        members: &[VertexId],
        limit: usize,
    ) -> Option<BulgeRegion> {
        let edges: Vec<EdgeId> = members
            .iter()
            .filter(|&&v| v != sink)
            .flat_map(|&v| graph.outgoing_edges(v).iter().copied())
            .collect();

        // Kahn 拓扑排序，有环则放弃
        let mut indeg: AHashMap<VertexId, usize> = members.iter().map(|&v| (v, 0)).collect();
        for &e in &edges {
            *indeg.entry(graph.edge_end(e)).or_insert(0) += 1;
        }
        if indeg.get(&source).copied().unwrap_or(0) != 0 {
            return None;
        }
        let mut order = Vec::with_capacity(members.len());
        let mut ready = vec![source];
        while let Some(v) = ready.pop() {
            order.push(v);
            if v == sink {
                continue;
            }
            for &e in graph.outgoing_edges(v) {
                let w = graph.edge_end(e);
                if let Some(d) = indeg.get_mut(&w) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(w);
                    }
                }
            }
        }
        if order.len() != members.len() {
            return None;
        }

        // 最短 / 最长路径长度与 覆盖度 x 长度 最大的路径
        struct Best {
            min_len: usize,
            max_len: usize,
            score: f64,
            via: Option<EdgeId>,
        }
        let mut best: AHashMap<VertexId, Best> = AHashMap::new();
        best.insert(source, Best { min_len: 0, max_len: 0, score: 0.0, via: None });
        for &v in &order {
            if v == sink {
                continue;
            }
            let Some(&Best { min_len, max_len, score, .. }) = best.get(&v) else { continue };
            for &e in graph.outgoing_edges(v) {
                let len = graph.edge_length(e);
                let cand_score = score + graph.coverage(e) * len as f64;
                let entry = best.entry(graph.edge_end(e)).or_insert(Best {
                    min_len: usize::MAX,
                    max_len: 0,
                    score: f64::NEG_INFINITY,
                    via: None,
                });
                entry.min_len = entry.min_len.min(min_len + len);
                entry.max_len = entry.max_len.max(max_len + len);
                if cand_score > entry.score || (cand_score == entry.score && entry.via.is_some_and(|f| e < f)) {
                    entry.score = cand_score;
                    entry.via = Some(e);
                }
            }
        }
        let end = best.get(&sink)?;
        if end.max_len > limit || end.max_len - end.min_len > self.config.max_length_difference {
            return None;
        }

        let mut dominant = Vec::new();
        let mut v = sink;
        while let Some(e) = best.get(&v).and_then(|b| b.via) {
            dominant.push(e);
            v = graph.edge_start(e);
        }
        dominant.reverse();

        let mut others: Vec<EdgeId> = edges.into_iter().filter(|e| !dominant.contains(e)).collect();
        others.sort_unstable();
        if others.is_empty() {
            return None;
        }
        let dominant_cov = path_coverage(graph, &dominant);
        if others.iter().any(|&e| graph.coverage(e) > dominant_cov) {
            return None;
        }
        Some(BulgeRegion { source, sink, dominant, others })
    }

    pub fn run<G: GraphLike>(&self, graph: &mut G) -> Result<usize> {
        let mut total = 0usize;
        loop {
            let mut removed = 0usize;
            for v in graph.vertex_ids() {
                if !graph.contains_vertex(v) {
                    continue;
                }
                let Some(region) = self.find_region(graph, v) else { continue };
                debug!(
                    source = %region.source,
                    sink = %region.sink,
                    kept = region.dominant.len(),
                    dropped = region.others.len(),
                    "collapsing complex bulge"
                );
                for &e in &region.others {
                    let (cov, len) = (graph.coverage(e), graph.edge_length(e));
                    project_coverage(graph, cov, len, &region.dominant);
                }
                removed += remove_edges_and_cleanup(graph, &region.others)?;
            }
            total += removed;
            if removed == 0 {
                break;
            }
        }
        Ok(total)
    }
}
