use std::collections::BTreeMap;
use std::io::Write;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::resolve;
use crate::error::{AsmError, Result};
use crate::graph::{EdgeId, GraphLike};
use crate::util::dna;

/// 一条长读段在 `before` 末端离开、在 `after` 起点进入，中间读段序列为 `fill`。
/// 两侧比对都足够长时标记为高置信。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapDescription {
    pub before: EdgeId,
    pub after: EdgeId,
    pub fill: Vec<u8>,
    pub high_quality: bool,
}

impl GapDescription {
    pub fn new(before: EdgeId, after: EdgeId, fill: Vec<u8>) -> Self {
        Self { before, after, fill, high_quality: true }
    }

    pub fn with_quality(mut self, high_quality: bool) -> Self {
        self.high_quality = high_quality;
        self
    }

    pub fn conjugate<G: GraphLike>(&self, graph: &G) -> Self {
        Self {
            before: graph.conjugate_edge(self.after),
            after: graph.conjugate_edge(self.before),
            fill: dna::revcomp(&self.fill),
            high_quality: self.high_quality,
        }
    }

    /// 共轭等价类的代表：(before, after) 较小的一个方向
    pub fn canonical<G: GraphLike>(&self, graph: &G) -> Self {
        let conj = self.conjugate(graph);
        if (conj.before, conj.after) < (self.before, self.after) {
            conj
        } else {
            self.clone()
        }
    }
}

/// 一条填充记录，置信标记随序列一起保存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFill {
    pub seq: Vec<u8>,
    pub high_quality: bool,
}

/// 按 (before, after) 归类的缺口填充序列；同一缺口和它的共轭算作一类
#[derive(Debug, Clone, Default)]
pub struct GapStorage {
    classes: BTreeMap<(EdgeId, EdgeId), Vec<GapFill>>,
    padded: bool,
}

impl GapStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_gap<G: GraphLike>(&mut self, graph: &G, gap: &GapDescription) {
        let c = gap.canonical(graph);
        self.classes
            .entry((c.before, c.after))
            .or_default()
            .push(GapFill { seq: c.fill, high_quality: c.high_quality });
    }

    pub fn merge(&mut self, other: GapStorage) {
        for (key, mut fills) in other.classes {
            self.classes.entry(key).or_default().append(&mut fills);
        }
    }

    /// (全部记录数, 高置信记录数)；`before`/`after` 可以是任一方向
    pub fn support<G: GraphLike>(&self, graph: &G, before: EdgeId, after: EdgeId) -> (usize, usize) {
        let key = GapDescription::new(before, after, Vec::new()).canonical(graph);
        match self.classes.get(&(key.before, key.after)) {
            Some(fills) => (fills.len(), fills.iter().filter(|f| f.high_quality).count()),
            None => (0, 0),
        }
    }

    /// 缺口类数
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn gap_count(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    pub fn is_padded(&self) -> bool {
        self.padded
    }

    pub fn classes(&self) -> impl Iterator<Item = (&(EdgeId, EdgeId), &Vec<GapFill>)> {
        self.classes.iter()
    }

    pub fn clear(&mut self) {
        self.classes.clear();
        self.padded = false;
    }

    /// 把填充序列变成桥接序列：before 的末尾 k 个碱基 + fill + after 的开头 k 个碱基。
    /// 桥接序列的首尾 k-mer 恰好是两个待连接的顶点。
    pub fn pad_gap_strings<G: GraphLike>(&mut self, graph: &G) -> Result<()> {
        if self.padded {
            return Ok(());
        }
        let k = graph.k();
        for (&(before, after), fills) in self.classes.iter_mut() {
            if !graph.contains_edge(before) || !graph.contains_edge(after) {
                return Err(AsmError::invariant(format!("gap {before} -> {after} refers to a removed edge")));
            }
            let head = graph.edge_seq(before);
            let head = &head[head.len() - k..];
            let tail = &graph.edge_seq(after)[..k];
            for fill in fills.iter_mut() {
                let mut bridge = Vec::with_capacity(fill.seq.len() + 2 * k);
                bridge.extend_from_slice(head);
                bridge.extend_from_slice(&fill.seq);
                bridge.extend_from_slice(tail);
                fill.seq = bridge;
            }
        }
        self.padded = true;
        Ok(())
    }

    /// 按替换表改写边编号；每条记录带着自己的置信标记重新规范化，落到同一类的合并
    pub fn replace_edges<G: GraphLike>(&mut self, graph: &G, replacement: &AHashMap<EdgeId, EdgeId>) {
        let old = std::mem::take(&mut self.classes);
        for ((before, after), fills) in old {
            let (before, after) = (resolve(replacement, before), resolve(replacement, after));
            for fill in fills {
                let gap = GapDescription::new(before, after, fill.seq).with_quality(fill.high_quality);
                self.add_gap(graph, &gap);
            }
        }
    }

    /// 每类一行表头：before \t after \t 记录数 \t 高置信数，随后每条填充序列一行
    pub fn dump<W: Write>(&self, out: &mut W, replacement: &AHashMap<EdgeId, EdgeId>) -> Result<()> {
        for (key, fills) in &self.classes {
            let (before, after) = (resolve(replacement, key.0), resolve(replacement, key.1));
            let high = fills.iter().filter(|f| f.high_quality).count();
            writeln!(out, "{}\t{}\t{}\t{}", before.0, after.0, fills.len(), high)?;
            for fill in fills {
                writeln!(out, "{}", String::from_utf8_lossy(&fill.seq))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConjugateGraph;

    fn two_edges() -> (ConjugateGraph, EdgeId, EdgeId) {
        let mut g = ConjugateGraph::new(5).unwrap();
        let a = g.add_edge(b"ACCTGATTG", 1.0).unwrap();
        let b = g.add_edge(b"GCGAGTCAT", 1.0).unwrap();
        (g, a, b)
    }

    #[test]
    fn gap_and_conjugate_share_a_class() {
        let (g, a, b) = two_edges();
        let gap = GapDescription::new(a, b, b"AAC".to_vec());
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &gap);
        storage.add_gap(&g, &gap.conjugate(&g));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.gap_count(), 2);
        let (_, fills) = storage.classes().next().unwrap();
        assert_eq!(fills[0], fills[1]);
    }

    #[test]
    fn padding_adds_vertex_kmers() {
        let (g, a, b) = two_edges();
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        storage.pad_gap_strings(&g).unwrap();
        assert!(storage.is_padded());
        let (&key, fills) = storage.classes().next().unwrap();
        let expected: Vec<u8> = if key == (a, b) {
            b"GATTGAACGCGAG".to_vec()
        } else {
            dna::revcomp(b"GATTGAACGCGAG")
        };
        assert_eq!(fills[0].seq, expected);
    }

    #[test]
    fn dump_follows_replacements() {
        let (g, a, b) = two_edges();
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        let mut replacement = AHashMap::new();
        replacement.insert(a, EdgeId(40));
        replacement.insert(EdgeId(40), EdgeId(42));
        replacement.insert(g.conjugate_edge(a), EdgeId(43));

        let mut out = Vec::new();
        storage.dump(&mut out, &replacement).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("42\t") || lines[0].contains("\t43\t"));
        assert!(lines[0].ends_with("\t1\t1"));
    }

    #[test]
    fn quality_tags_are_counted_per_class() {
        let (g, a, b) = two_edges();
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        let weak = GapDescription::new(a, b, b"AAG".to_vec()).with_quality(false);
        storage.add_gap(&g, &weak.conjugate(&g));

        let mut other = GapStorage::new();
        other.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        storage.merge(other);

        assert_eq!(storage.support(&g, a, b), (3, 2));
        assert_eq!(storage.support(&g, g.conjugate_edge(b), g.conjugate_edge(a)), (3, 2));
        storage.clear();
        assert_eq!(storage.support(&g, a, b), (0, 0));
    }

    #[test]
    fn replacement_keeps_quality_of_each_fill() {
        let mut g = ConjugateGraph::new(5).unwrap();
        let a = g.add_edge(b"ACCTGATTG", 1.0).unwrap();
        let b = g.add_edge(b"GCGAGTCAT", 1.0).unwrap();
        let c = g.add_edge(b"TTCAGGCAA", 1.0).unwrap();
        let mut storage = GapStorage::new();
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAG".to_vec()).with_quality(false));
        storage.add_gap(&g, &GapDescription::new(a, b, b"AAC".to_vec()));
        storage.add_gap(&g, &GapDescription::new(c, b, b"AAC".to_vec()));
        assert_eq!(storage.len(), 2);

        // a 换成 c 之后 a -> b 变成 c -> b，重新规范化后和原有的 c -> b 归到一类
        let mut replacement = AHashMap::new();
        replacement.insert(a, c);
        replacement.insert(g.conjugate_edge(a), g.conjugate_edge(c));
        storage.replace_edges(&g, &replacement);

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.gap_count(), 3);
        assert_eq!(storage.support(&g, c, b), (3, 2));
        assert_eq!(storage.support(&g, a, b), (0, 0));
        let (&key, fills) = storage.classes().next().unwrap();
        let weak: Vec<&GapFill> = fills.iter().filter(|f| !f.high_quality).collect();
        assert_eq!(weak.len(), 1);
        let expected = if key == (c, b) { b"AAG".to_vec() } else { dna::revcomp(b"AAG") };
        assert_eq!(weak[0].seq, expected);
    }
}
