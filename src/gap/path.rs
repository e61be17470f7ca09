use std::collections::BTreeMap;
use std::io::Write;

use ahash::AHashMap;

use super::resolve;
use crate::error::Result;
use crate::graph::{EdgeId, GraphLike};

/// 同一路径的读段数，其中高置信的单独计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathCount {
    pub reads: usize,
    pub high_quality: usize,
}

impl PathCount {
    fn add(&mut self, other: PathCount) {
        self.reads += other.reads;
        self.high_quality += other.high_quality;
    }
}

/// 长读段在图上走过的边路径及其出现次数。每条路径同时记录它的共轭路径。
#[derive(Debug, Clone, Default)]
pub struct PathStorage {
    paths: BTreeMap<Vec<EdgeId>, PathCount>,
}

impl PathStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_path<G: GraphLike>(&mut self, graph: &G, path: &[EdgeId], high_quality: bool) {
        if path.is_empty() {
            return;
        }
        let one = PathCount { reads: 1, high_quality: usize::from(high_quality) };
        let conj: Vec<EdgeId> = path.iter().rev().map(|&e| graph.conjugate_edge(e)).collect();
        self.paths.entry(path.to_vec()).or_default().add(one);
        if conj.as_slice() != path {
            self.paths.entry(conj).or_default().add(one);
        }
    }

    pub fn merge(&mut self, other: PathStorage) {
        for (path, n) in other.paths {
            self.paths.entry(path).or_default().add(n);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn count(&self, path: &[EdgeId]) -> PathCount {
        self.paths.get(path).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<EdgeId>, PathCount)> {
        self.paths.iter().map(|(p, &n)| (p, n))
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// 按替换表改写边，压缩连续重复的边；改写后相同的路径合并计数
    pub fn replace_edges(&mut self, replacement: &AHashMap<EdgeId, EdgeId>) {
        let old = std::mem::take(&mut self.paths);
        for (path, n) in old {
            let mut rewritten: Vec<EdgeId> = path.iter().map(|&e| resolve(replacement, e)).collect();
            rewritten.dedup();
            self.paths.entry(rewritten).or_default().add(n);
        }
    }

    /// 每行一条：读段数 \t 高置信数 \t 逗号分隔的边编号
    pub fn dump<W: Write>(&self, out: &mut W, replacement: &AHashMap<EdgeId, EdgeId>) -> Result<()> {
        for (path, n) in &self.paths {
            let mut edges: Vec<EdgeId> = path.iter().map(|&e| resolve(replacement, e)).collect();
            edges.dedup();
            let joined: Vec<String> = edges.iter().map(|e| e.0.to_string()).collect();
            writeln!(out, "{}\t{}\t{}", n.reads, n.high_quality, joined.join(","))?;
        }
        Ok(())
    }
}
