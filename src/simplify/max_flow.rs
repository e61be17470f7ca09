use std::collections::VecDeque;

use ahash::AHashMap;
use tracing::debug;

use crate::config::MaxFlowEcConfig;
use crate::error::Result;
use crate::graph::{remove_edge_and_compress, EdgeId, GraphLike, VertexId};

/// 基于最大流的错误连接删除。
///
/// 长度不小于 `uniqueness_length` 的边视为唯一边。短边 e 周围由非唯一边构成的局部区域是一个流网络：
/// 进入区域的唯一边从源点各提供容量 1，离开区域的唯一边各向汇点提供容量 1，
/// 区域内部的边容量不限。去掉 e 后最大流不变，且 e 不能延伸成可信路径，则删除 e。
pub struct MaxFlowEcRemover {
    config: MaxFlowEcConfig,
    k: usize,
}

struct FlowNetwork {
    cap: Vec<Vec<i64>>,
    source: usize,
    sink: usize,
}

impl FlowNetwork {
    fn new(inner: usize) -> Self {
        Self { cap: vec![vec![0; inner + 2]; inner + 2], source: inner, sink: inner + 1 }
    }

    /// Edmonds–Karp
    fn max_flow(&self) -> i64 {
        let n = self.cap.len();
        let mut residual = self.cap.clone();
        let mut flow = 0i64;
        loop {
            let mut parent = vec![usize::MAX; n];
            parent[self.source] = self.source;
            let mut queue = VecDeque::from([self.source]);
            while let Some(u) = queue.pop_front() {
                if u == self.sink {
                    break;
                }
                for v in 0..n {
                    if parent[v] == usize::MAX && residual[u][v] > 0 {
                        parent[v] = u;
                        queue.push_back(v);
                    }
                }
            }
            if parent[self.sink] == usize::MAX {
                return flow;
            }
            let mut push = i64::MAX;
            let mut v = self.sink;
            while v != self.source {
                let u = parent[v];
                push = push.min(residual[u][v]);
                v = u;
            }
            let mut v = self.sink;
            while v != self.source {
                let u = parent[v];
                residual[u][v] -= push;
                residual[v][u] += push;
                v = u;
            }
            flow += push;
        }
    }
}

impl MaxFlowEcRemover {
    pub fn new(config: MaxFlowEcConfig, k: usize) -> Self {
        Self { config, k }
    }

    fn is_unique<G: GraphLike>(&self, graph: &G, e: EdgeId) -> bool {
        graph.edge_length(e) >= self.config.uniqueness_length
    }

    fn is_candidate<G: GraphLike>(&self, graph: &G, e: EdgeId) -> bool {
        let plausibility = self.config.plausibility_length;
        graph.edge_length(e) <= self.k + self.config.max_ec_length_coefficient
            && !self.is_unique(graph, e)
            && graph.edge_start(e) != graph.edge_end(e)
            && !graph.is_self_conjugate(e)
            && graph.unique_forward_length(e, plausibility) < plausibility
            && graph.unique_backward_length(e, plausibility) < plausibility
    }

    /// e 周围经非唯一边可达的顶点，超过上限返回 None
    fn component<G: GraphLike>(&self, graph: &G, e: EdgeId) -> Option<Vec<VertexId>> {
        let mut seen: AHashMap<VertexId, usize> = AHashMap::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        for v in [graph.edge_start(e), graph.edge_end(e)] {
            if !seen.contains_key(&v) {
                seen.insert(v, order.len());
                order.push(v);
                queue.push_back(v);
            }
        }
        while let Some(v) = queue.pop_front() {
            let neighbours = graph
                .outgoing_edges(v)
                .iter()
                .map(|&f| (f, graph.edge_end(f)))
                .chain(graph.incoming_edges(v).into_iter().map(|f| (f, graph.edge_start(f))));
            for (f, w) in neighbours {
                if self.is_unique(graph, f) || seen.contains_key(&w) {
                    continue;
                }
                if order.len() >= self.config.max_component_vertices {
                    return None;
                }
                seen.insert(w, order.len());
                order.push(w);
                queue.push_back(w);
            }
        }
        Some(order)
    }

    /// 去掉 e 前后的最大流
    pub fn flows<G: GraphLike>(&self, graph: &G, e: EdgeId) -> Option<(i64, i64)> {
        let vertices = self.component(graph, e)?;
        let slot: AHashMap<VertexId, usize> = vertices.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let mut net = FlowNetwork::new(vertices.len());
        let unbounded = (vertices.len() * vertices.len() + 1) as i64 * 2;
        let conj = graph.conjugate_edge(e);
        let mut removable = Vec::new();

        for (i, &v) in vertices.iter().enumerate() {
            for &f in graph.outgoing_edges(v) {
                if self.is_unique(graph, f) {
                    net.cap[i][net.sink] += 1;
                } else if let Some(&j) = slot.get(&graph.edge_end(f)) {
                    net.cap[i][j] += unbounded;
                    if f == e || f == conj {
                        removable.push((i, j));
                    }
                }
            }
            for f in graph.incoming_edges(v) {
                if self.is_unique(graph, f) {
                    net.cap[net.source][i] += 1;
                }
            }
        }
        let with = net.max_flow();
        for (i, j) in removable {
            net.cap[i][j] -= unbounded;
        }
        let without = net.max_flow();
        Some((with, without))
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
                let Some((with, without)) = self.flows(graph, e) else { continue };
                if with != without {
                    continue;
                }
                debug!(edge = %e, flow = with, "removing connection not needed by max flow");
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
