use tracing::debug;

use super::{path_coverage, project_coverage};
use crate::config::BulgeRemoverConfig;
use crate::error::Result;
use crate::graph::{remove_edge_and_compress, EdgeId, GraphLike, VertexId};

/// 单次候选边上 DFS 访问的顶点上限
const SEARCH_BUDGET: usize = 1000;

/// 简单气泡：短边 e 与一条起止点相同、长度相近、覆盖度明显更高的路径平行。
/// e 的覆盖度投影到该路径上后删除 e。
pub struct BulgeRemover {
    config: BulgeRemoverConfig,
    k: usize,
}

struct Search {
    target: VertexId,
    forbidden: [EdgeId; 2],
    lo: usize,
    hi: usize,
    budget: usize,
    path: Vec<EdgeId>,
    on_path: Vec<VertexId>,
    best: Option<(f64, Vec<EdgeId>)>,
}

impl Search {
    fn dfs<G: GraphLike>(&mut self, graph: &G, v: VertexId, len: usize) {
        if self.budget == 0 {
            return;
        }
        self.budget -= 1;
        for &f in graph.outgoing_edges(v) {
            if self.forbidden.contains(&f) {
                continue;
            }
            let next_len = len + graph.edge_length(f);
            if next_len > self.hi {
                continue;
            }
            let w = graph.edge_end(f);
            self.path.push(f);
            if w == self.target {
                if next_len >= self.lo {
                    let cov = path_coverage(graph, &self.path);
                    let better = match &self.best {
                        None => true,
                        Some((best_cov, best_path)) => {
                            cov > *best_cov || (cov == *best_cov && self.path < *best_path)
                        }
                    };
                    if better {
                        self.best = Some((cov, self.path.clone()));
                    }
                }
            } else if !self.on_path.contains(&w) {
                self.on_path.push(w);
                self.dfs(graph, w, next_len);
                self.on_path.pop();
            }
            self.path.pop();
        }
    }
}

impl BulgeRemover {
    pub fn new(config: BulgeRemoverConfig, k: usize) -> Self {
        Self { config, k }
    }

    pub fn max_length(&self) -> usize {
        let by_coef = (self.k as f64 * self.config.max_bulge_length_coefficient).round() as usize;
        by_coef.max(self.k + self.config.max_additive_length_coefficient)
    }

    /// 与 e 平行、长度差在容差内、覆盖度最高的替代路径
    pub fn find_alternative<G: GraphLike>(&self, graph: &G, e: EdgeId) -> Option<Vec<EdgeId>> {
        let len = graph.edge_length(e);
        let delta = self
            .config
            .max_delta
            .max((self.config.max_relative_delta * len as f64).round() as usize);
        let start = graph.edge_start(e);
        let mut search = Search {
            target: graph.edge_end(e),
            forbidden: [e, graph.conjugate_edge(e)],
            lo: len.saturating_sub(delta),
            hi: len + delta,
            budget: SEARCH_BUDGET,
            path: Vec::new(),
            on_path: vec![start],
            best: None,
        };
        search.dfs(graph, start, 0);
        search.best.map(|(_, path)| path)
    }

    fn is_candidate<G: GraphLike>(&self, graph: &G, e: EdgeId, max_len: usize) -> bool {
        graph.edge_length(e) <= max_len
            && !graph.is_self_conjugate(e)
            && graph.edge_start(e) != graph.edge_end(e)
            && graph.outgoing_count(graph.edge_start(e)) >= 2
    }

    pub fn run<G: GraphLike>(&self, graph: &mut G) -> Result<usize> {
        let max_len = self.max_length();
        let mut total = 0usize;
        loop {
            let mut candidates: Vec<EdgeId> = graph
                .edge_ids()
                .into_iter()
                .filter(|&e| self.is_candidate(graph, e, max_len))
                .collect();
            candidates.sort_by(|&a, &b| graph.coverage(a).total_cmp(&graph.coverage(b)).then(a.cmp(&b)));

            let mut removed = 0usize;
            for e in candidates {
                if !graph.contains_edge(e) || !self.is_candidate(graph, e, max_len) {
                    continue;
                }
                let Some(path) = self.find_alternative(graph, e) else { continue };
                let cov = graph.coverage(e);
                let alt_cov = path_coverage(graph, &path);
                if alt_cov < self.config.max_relative_coverage * cov || alt_cov > self.config.max_coverage {
                    continue;
                }
                debug!(edge = %e, cov, alt_cov, path_edges = path.len(), "removing bulge");
                project_coverage(graph, cov, graph.edge_length(e), &path);
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
