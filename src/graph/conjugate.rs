use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::{EdgeEvent, EdgeId, GraphLike, MergeResult, VertexId};
use crate::error::{AsmError, Result};
use crate::util::dna;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VertexData {
    /// 顶点代表的 k-mer（2 bit 打包）
    kmer: u128,
    conj: VertexId,
    outgoing: Vec<EdgeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeData {
    seq: Vec<u8>,
    start: VertexId,
    end: VertexId,
    conj: EdgeId,
    /// 平均 k+1-mer 覆盖度
    coverage: f64,
}

/// 共轭对称的压缩 de Bruijn 图。
///
/// - 顶点、边存放在按编号索引的槽位中，删除后槽位置空，编号不复用，
///   因此按编号遍历的顺序是确定的；
/// - 顶点只存出边，入边由共轭顶点的出边取共轭得到，天然对称；
/// - 每次结构修改都会写入 `journal` 并递增 `generation`，供索引增量维护。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConjugateGraph {
    k: usize,
    vertices: Vec<Option<VertexData>>,
    edges: Vec<Option<EdgeData>>,
    live_vertices: usize,
    live_edges: usize,
    generation: u64,
    #[serde(skip)]
    vertex_by_kmer: AHashMap<u128, VertexId>,
    #[serde(skip)]
    journal: Vec<EdgeEvent>,
}

impl ConjugateGraph {
    /// k 必须为奇数（保证没有自反向互补的 k-mer）且 k+1 <= 64
    pub fn new(k: usize) -> Result<Self> {
        if k % 2 == 0 || k >= dna::MAX_KMER_LEN {
            return Err(AsmError::config(format!(
                "k = {k} must be odd and below {}",
                dna::MAX_KMER_LEN
            )));
        }
        Ok(Self {
            k,
            vertices: Vec::new(),
            edges: Vec::new(),
            live_vertices: 0,
            live_edges: 0,
            generation: 0,
            vertex_by_kmer: AHashMap::new(),
            journal: Vec::new(),
        })
    }

    fn vertex(&self, v: VertexId) -> &VertexData {
        self.vertices
            .get(v.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("vertex {v} is not in the graph"))
    }

    fn vertex_mut(&mut self, v: VertexId) -> &mut VertexData {
        self.vertices
            .get_mut(v.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("vertex {v} is not in the graph"))
    }

    fn edge(&self, e: EdgeId) -> &EdgeData {
        self.edges
            .get(e.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("edge {e} is not in the graph"))
    }

    fn edge_mut(&mut self, e: EdgeId) -> &mut EdgeData {
        self.edges
            .get_mut(e.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("edge {e} is not in the graph"))
    }

    fn try_edge(&self, e: EdgeId) -> Result<&EdgeData> {
        self.edges
            .get(e.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| AsmError::invariant(format!("edge {e} is not in the graph")))
    }

    fn try_vertex(&self, v: VertexId) -> Result<&VertexData> {
        self.vertices
            .get(v.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| AsmError::invariant(format!("vertex {v} is not in the graph")))
    }

    /// 按 k-mer 查找顶点
    pub fn find_vertex(&self, kmer: &[u8]) -> Option<VertexId> {
        let code = dna::encode_kmer(kmer)?;
        self.vertex_by_kmer.get(&code).copied()
    }

    /// 新建一对共轭顶点，返回正向那个
    fn create_vertex_pair(&mut self, kmer: u128) -> VertexId {
        let v = VertexId(self.vertices.len() as u32);
        let cv = VertexId(v.0 + 1);
        let rc = dna::revcomp_code(kmer, self.k);
        self.vertices.push(Some(VertexData { kmer, conj: cv, outgoing: Vec::new() }));
        self.vertices.push(Some(VertexData { kmer: rc, conj: v, outgoing: Vec::new() }));
        self.vertex_by_kmer.entry(kmer).or_insert(v);
        self.vertex_by_kmer.entry(rc).or_insert(cv);
        self.live_vertices += 2;
        self.generation += 1;
        v
    }

    fn get_or_create_vertex(&mut self, kmer: u128) -> VertexId {
        match self.vertex_by_kmer.get(&kmer) {
            Some(&v) => v,
            None => self.create_vertex_pair(kmer),
        }
    }

    /// 在给定端点之间加边（同时加入共轭边）。回文序列且端点互为共轭时得到自共轭边。
    fn add_edge_between(&mut self, start: VertexId, end: VertexId, seq: Vec<u8>, coverage: f64) -> EdgeId {
        let rc = dna::revcomp(&seq);
        let id = EdgeId(self.edges.len() as u32);
        let cstart = self.vertex(end).conj;
        let cend = self.vertex(start).conj;
        if start == cstart && rc == seq {
            self.edges.push(Some(EdgeData { seq, start, end, conj: id, coverage }));
            self.vertex_mut(start).outgoing.push(id);
            self.journal.push(EdgeEvent::Added(id));
            self.live_edges += 1;
        } else {
            let cid = EdgeId(id.0 + 1);
            self.edges.push(Some(EdgeData { seq, start, end, conj: cid, coverage }));
            self.edges.push(Some(EdgeData { seq: rc, start: cstart, end: cend, conj: id, coverage }));
            self.vertex_mut(start).outgoing.push(id);
            self.vertex_mut(cstart).outgoing.push(cid);
            self.journal.push(EdgeEvent::Added(id));
            self.journal.push(EdgeEvent::Added(cid));
            self.live_edges += 2;
        }
        self.generation += 1;
        id
    }

    /// 只摘除单条边（不处理共轭）
    fn detach_edge(&mut self, e: EdgeId) -> Result<()> {
        let data = self.edges[e.index()]
            .take()
            .ok_or_else(|| AsmError::invariant(format!("edge {e} is not in the graph")))?;
        let start = data.start;
        let outgoing = &mut self
            .vertices
            .get_mut(start.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| AsmError::invariant(format!("edge {e} starts at missing vertex {start}")))?
            .outgoing;
        let pos = outgoing
            .iter()
            .position(|&x| x == e)
            .ok_or_else(|| AsmError::invariant(format!("edge {e} missing from outgoing list of {start}")))?;
        outgoing.remove(pos);
        self.journal.push(EdgeEvent::Removed(e, data.seq));
        self.live_edges -= 1;
        Ok(())
    }

    fn remove_vertex_slot(&mut self, v: VertexId) {
        if let Some(data) = self.vertices[v.index()].take() {
            if self.vertex_by_kmer.get(&data.kmer) == Some(&v) {
                self.vertex_by_kmer.remove(&data.kmer);
            }
            self.live_vertices -= 1;
        }
    }

    /// 反序列化后重建 k-mer -> 顶点 查找表
    pub fn rebuild_lookup(&mut self) {
        self.vertex_by_kmer.clear();
        for (i, slot) in self.vertices.iter().enumerate() {
            if let Some(data) = slot {
                self.vertex_by_kmer.entry(data.kmer).or_insert(VertexId(i as u32));
            }
        }
    }

    /// 所有边序列长度之和
    pub fn total_sequence_length(&self) -> usize {
        self.edges.iter().flatten().map(|d| d.seq.len()).sum()
    }

    /// 检查全部共轭不变式，失败时返回带编号信息的 `InvariantViolation`
    pub fn check_symmetry(&self) -> Result<()> {
        let k = self.k;
        let mut edges_seen = 0usize;
        for (i, slot) in self.edges.iter().enumerate() {
            let Some(d) = slot else { continue };
            edges_seen += 1;
            let e = EdgeId(i as u32);
            let c = self.try_edge(d.conj)?;
            if c.conj != e {
                return Err(AsmError::invariant(format!("conj(conj({e})) = {} != {e}", c.conj)));
            }
            let start = self.try_vertex(d.start)?;
            let end = self.try_vertex(d.end)?;
            if c.start != end.conj || c.end != start.conj {
                return Err(AsmError::invariant(format!(
                    "endpoints of {e} and its conjugate {} are not conjugate",
                    d.conj
                )));
            }
            if c.seq != dna::revcomp(&d.seq) {
                return Err(AsmError::invariant(format!(
                    "sequence of {} is not the reverse complement of {e}",
                    d.conj
                )));
            }
            if (c.coverage - d.coverage).abs() > 1e-9 * d.coverage.abs().max(1.0) {
                return Err(AsmError::invariant(format!(
                    "coverage of {e} ({}) differs from its conjugate {} ({})",
                    d.coverage, d.conj, c.coverage
                )));
            }
            if d.seq.len() <= k {
                return Err(AsmError::invariant(format!("edge {e} is shorter than k+1")));
            }
            if dna::encode_kmer(&d.seq[..k]) != Some(start.kmer)
                || dna::encode_kmer(&d.seq[d.seq.len() - k..]) != Some(end.kmer)
            {
                return Err(AsmError::invariant(format!(
                    "sequence of {e} does not agree with the k-mers of {} / {}",
                    d.start, d.end
                )));
            }
            if !start.outgoing.contains(&e) {
                return Err(AsmError::invariant(format!(
                    "edge {e} missing from outgoing list of {}",
                    d.start
                )));
            }
        }
        if edges_seen != self.live_edges {
            return Err(AsmError::invariant(format!(
                "edge counter {} disagrees with {} live edges",
                self.live_edges, edges_seen
            )));
        }

        let mut vertices_seen = 0usize;
        for (i, slot) in self.vertices.iter().enumerate() {
            let Some(d) = slot else { continue };
            vertices_seen += 1;
            let v = VertexId(i as u32);
            if d.conj == v {
                return Err(AsmError::invariant(format!("vertex {v} is its own conjugate")));
            }
            let c = self.try_vertex(d.conj)?;
            if c.conj != v || c.kmer != dna::revcomp_code(d.kmer, k) {
                return Err(AsmError::invariant(format!(
                    "vertex {v} and {} are not a conjugate pair",
                    d.conj
                )));
            }
            for &e in &d.outgoing {
                if self.try_edge(e)?.start != v {
                    return Err(AsmError::invariant(format!("edge {e} listed under {v} starts elsewhere")));
                }
            }
        }
        if vertices_seen != self.live_vertices {
            return Err(AsmError::invariant(format!(
                "vertex counter {} disagrees with {} live vertices",
                self.live_vertices, vertices_seen
            )));
        }
        Ok(())
    }
}

impl GraphLike for ConjugateGraph {
    fn k(&self) -> usize {
        self.k
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| VertexId(i as u32))
            .collect()
    }

    fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| EdgeId(i as u32))
            .collect()
    }

    fn vertex_count(&self) -> usize {
        self.live_vertices
    }

    fn edge_count(&self) -> usize {
        self.live_edges
    }

    fn contains_vertex(&self, v: VertexId) -> bool {
        matches!(self.vertices.get(v.index()), Some(Some(_)))
    }

    fn contains_edge(&self, e: EdgeId) -> bool {
        matches!(self.edges.get(e.index()), Some(Some(_)))
    }

    fn conjugate_vertex(&self, v: VertexId) -> VertexId {
        self.vertex(v).conj
    }

    fn conjugate_edge(&self, e: EdgeId) -> EdgeId {
        self.edge(e).conj
    }

    fn edge_start(&self, e: EdgeId) -> VertexId {
        self.edge(e).start
    }

    fn edge_end(&self, e: EdgeId) -> VertexId {
        self.edge(e).end
    }

    fn outgoing_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.vertex(v).outgoing
    }

    fn edge_seq(&self, e: EdgeId) -> &[u8] {
        &self.edge(e).seq
    }

    fn coverage(&self, e: EdgeId) -> f64 {
        self.edge(e).coverage
    }

    fn vertex_kmer(&self, v: VertexId) -> Vec<u8> {
        dna::decode_kmer(self.vertex(v).kmer, self.k)
    }

    fn set_coverage(&mut self, e: EdgeId, coverage: f64) {
        let c = self.edge(e).conj;
        self.edge_mut(e).coverage = coverage;
        self.edge_mut(c).coverage = coverage;
    }

    fn add_edge(&mut self, seq: &[u8], coverage: f64) -> Result<EdgeId> {
        let k = self.k;
        let seq: Vec<u8> = seq.iter().map(u8::to_ascii_uppercase).collect();
        if seq.len() <= k {
            return Err(AsmError::InvalidSequence(format!(
                "edge sequence of length {} is shorter than k+1 = {}",
                seq.len(),
                k + 1
            )));
        }
        if !dna::is_acgt(&seq) {
            return Err(AsmError::InvalidSequence(format!(
                "edge sequence {} contains non-ACGT symbols",
                String::from_utf8_lossy(&seq)
            )));
        }
        let (Some(prefix), Some(suffix)) = (
            dna::encode_kmer(&seq[..k]),
            dna::encode_kmer(&seq[seq.len() - k..]),
        ) else {
            return Err(AsmError::InvalidSequence("cannot encode edge end k-mers".to_string()));
        };
        let start = self.get_or_create_vertex(prefix);
        let end = self.get_or_create_vertex(suffix);
        Ok(self.add_edge_between(start, end, seq, coverage))
    }

    fn remove_edge(&mut self, e: EdgeId) -> Result<()> {
        let c = self.try_edge(e)?.conj;
        self.try_edge(c)
            .map_err(|_| AsmError::invariant(format!("conjugate {c} of edge {e} is missing")))?;
        self.detach_edge(e)?;
        if c != e {
            self.detach_edge(c)?;
        }
        self.generation += 1;
        Ok(())
    }

    fn remove_isolated_vertex(&mut self, v: VertexId) -> Result<bool> {
        let data = self.try_vertex(v)?;
        let cv = data.conj;
        let c = self
            .try_vertex(cv)
            .map_err(|_| AsmError::invariant(format!("conjugate {cv} of vertex {v} is missing")))?;
        if !data.outgoing.is_empty() || !c.outgoing.is_empty() {
            return Ok(false);
        }
        self.remove_vertex_slot(v);
        self.remove_vertex_slot(cv);
        self.generation += 1;
        Ok(true)
    }

    fn split_edge(&mut self, e: EdgeId, pos: usize) -> Result<(EdgeId, EdgeId)> {
        let k = self.k;
        let data = self.try_edge(e)?;
        let len = data.seq.len() - k;
        if pos == 0 || pos >= len {
            return Err(AsmError::InvalidSequence(format!(
                "split position {pos} outside 1..{len} of edge {e}"
            )));
        }
        if data.conj == e {
            return Err(AsmError::invariant(format!("cannot split self-conjugate edge {e}")));
        }
        let seq = data.seq.clone();
        let (start, end, coverage) = (data.start, data.end, data.coverage);
        let mid_code = dna::encode_kmer(&seq[pos..pos + k])
            .ok_or_else(|| AsmError::invariant(format!("edge {e} holds non-ACGT sequence")))?;

        self.remove_edge(e)?;
        let mid = self.create_vertex_pair(mid_code);
        let e1 = self.add_edge_between(start, mid, seq[..pos + k].to_vec(), coverage);
        let e2 = self.add_edge_between(mid, end, seq[pos..].to_vec(), coverage);
        Ok((e1, e2))
    }

    fn glue_vertices(&mut self, keep: VertexId, gone: VertexId) -> Result<()> {
        let kd = self.try_vertex(keep)?;
        let gd = self.try_vertex(gone)?;
        if keep == gone || gd.conj == keep {
            return Err(AsmError::invariant(format!("cannot glue {gone} onto {keep}")));
        }
        if kd.kmer != gd.kmer {
            return Err(AsmError::invariant(format!(
                "cannot glue {gone} onto {keep}: different k-mers"
            )));
        }
        let (ck, cg) = (kd.conj, gd.conj);

        let moved = std::mem::take(&mut self.vertex_mut(gone).outgoing);
        for &e in &moved {
            self.edge_mut(e).start = keep;
            let c = self.edge(e).conj;
            self.edge_mut(c).end = ck;
        }
        self.vertex_mut(keep).outgoing.extend(moved);

        let moved = std::mem::take(&mut self.vertex_mut(cg).outgoing);
        for &e in &moved {
            self.edge_mut(e).start = ck;
            let c = self.edge(e).conj;
            self.edge_mut(c).end = keep;
        }
        self.vertex_mut(ck).outgoing.extend(moved);

        let (kmer, rc) = (self.vertex(keep).kmer, self.vertex(ck).kmer);
        self.remove_vertex_slot(gone);
        self.remove_vertex_slot(cg);
        self.vertex_by_kmer.insert(kmer, keep);
        self.vertex_by_kmer.insert(rc, ck);
        self.generation += 1;
        Ok(())
    }

    fn merge_path(&mut self, path: &[EdgeId]) -> Result<MergeResult> {
        let k = self.k;
        let Some(&first) = path.first() else {
            return Err(AsmError::invariant("cannot merge an empty path"));
        };
        for (i, &e) in path.iter().enumerate() {
            self.try_edge(e)?;
            if path[..i].contains(&e) {
                return Err(AsmError::invariant(format!("edge {e} appears twice in merged path")));
            }
            if i > 0 && self.edge(path[i - 1]).end != self.edge(e).start {
                return Err(AsmError::invariant(format!(
                    "edges {} and {e} are not consecutive",
                    path[i - 1]
                )));
            }
        }
        if path.len() == 1 {
            return Ok(MergeResult { merged: first, replaced: Vec::new() });
        }

        let mut seq = self.edge(first).seq.clone();
        let mut weighted = 0.0;
        let mut total_len = 0usize;
        for (i, &e) in path.iter().enumerate() {
            let d = self.edge(e);
            if i > 0 {
                seq.extend_from_slice(&d.seq[k..]);
            }
            let len = d.seq.len() - k;
            weighted += d.coverage * len as f64;
            total_len += len;
        }
        let coverage = weighted / total_len as f64;
        let start = self.edge(first).start;
        let last = path[path.len() - 1];
        let end = self.edge(last).end;
        let conjugates: Vec<EdgeId> = path.iter().map(|&e| self.edge(e).conj).collect();
        let inner: Vec<VertexId> = path[..path.len() - 1].iter().map(|&e| self.edge(e).end).collect();

        let merged = self.add_edge_between(start, end, seq, coverage);
        let merged_conj = self.edge(merged).conj;
        for &e in path {
            if self.contains_edge(e) {
                self.remove_edge(e)?;
            }
        }
        for v in inner {
            if v != start && v != end && self.contains_vertex(v) {
                self.remove_isolated_vertex(v)?;
            }
        }

        let mut replaced: Vec<(EdgeId, EdgeId)> = Vec::with_capacity(path.len() * 2);
        for (&e, &c) in path.iter().zip(&conjugates) {
            replaced.push((e, merged));
            if c != e {
                replaced.push((c, merged_conj));
            }
        }
        replaced.sort_unstable();
        replaced.dedup();
        Ok(MergeResult { merged, replaced })
    }

    fn take_journal(&mut self) -> Vec<EdgeEvent> {
        std::mem::take(&mut self.journal)
    }
}
