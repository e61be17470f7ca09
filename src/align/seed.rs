use crate::error::Result;
use crate::graph::EdgeId;
use crate::index::{IndexLike, KmerIndex};
use crate::util::dna::KmerIter;

/// 精确匹配种子：read 区间 [read_begin, read_end) 与边序列区间 [edge_begin, edge_end) 完全相同
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Seed {
    pub edge: EdgeId,
    pub read_begin: usize,
    pub read_end: usize,
    pub edge_begin: usize,
    pub edge_end: usize,
}

impl Seed {
    pub fn len(&self) -> usize {
        self.read_end - self.read_begin
    }

    pub fn is_empty(&self) -> bool {
        self.read_end == self.read_begin
    }

    /// 对角线：边坐标减 read 坐标
    fn diagonal(&self) -> isize {
        self.edge_begin as isize - self.read_begin as isize
    }
}

/// 每隔 `step` 个位置取一个 k-mer 查索引，把同一条边同一对角线上
/// 首尾相接的命中延伸成一个种子
pub fn find_seeds(index: &KmerIndex, read: &[u8], step: usize) -> Result<Vec<Seed>> {
    let len = index.kmer_len();
    let step = step.max(1);
    let mut seeds: Vec<Seed> = Vec::new();
    let mut current: Option<Seed> = None;

    for (pos, code) in KmerIter::new(read, len) {
        if pos % step != 0 {
            continue;
        }
        let Some(hit) = index.find_code(code)? else { continue };
        let off = hit.offset as usize;
        let next = Seed { edge: hit.edge, read_begin: pos, read_end: pos + len, edge_begin: off, edge_end: off + len };
        match current.as_mut() {
            Some(cur) if cur.edge == next.edge && cur.diagonal() == next.diagonal() && next.read_begin <= cur.read_end => {
                cur.read_end = next.read_end;
                cur.edge_end = next.edge_end;
            }
            _ => {
                if let Some(done) = current.replace(next) {
                    seeds.push(done);
                }
            }
        }
    }
    seeds.extend(current);

    filter_contained(&mut seeds);
    seeds.sort_unstable_by_key(|s| (s.read_begin, s.edge, s.edge_begin));
    seeds.dedup();
    Ok(seeds)
}

/// 去掉 read 区间被更长种子完全包含的种子
fn filter_contained(seeds: &mut Vec<Seed>) {
    if seeds.len() <= 1 {
        return;
    }
    seeds.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut keep = vec![true; seeds.len()];
    for i in 0..seeds.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..seeds.len() {
            if keep[j]
                && seeds[i].read_begin <= seeds[j].read_begin
                && seeds[i].read_end >= seeds[j].read_end
                && seeds[i] != seeds[j]
            {
                keep[j] = false;
            }
        }
    }

    let mut idx = 0;
    seeds.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
}
