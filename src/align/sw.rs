use std::fmt::Write as _;

const INF: u32 = u32::MAX / 4;

/// 带状全局比对结果（单位代价编辑距离）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalAlignment {
    pub distance: u32,
    /// 'M' 匹配或错配，'I' 仅消耗 query，'D' 仅消耗 reference
    pub ops: Vec<char>,
}

impl GlobalAlignment {
    pub fn cigar(&self) -> String {
        ops_to_cigar(&self.ops)
    }
}

/// DP 工作缓冲区，可跨调用复用
#[derive(Default)]
pub struct AlignBuffer {
    h: Vec<u32>,
}

impl AlignBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, size: usize) {
        self.h.clear();
        self.h.resize(size, INF);
    }
}

/// 带状全局比对：只计算 |i - j| <= band 的单元，长度差超过带宽时返回 None
pub fn banded_global(query: &[u8], reference: &[u8], band: usize) -> Option<GlobalAlignment> {
    banded_global_with_buf(query, reference, band, &mut AlignBuffer::new())
}

pub fn banded_global_with_buf(
    query: &[u8],
    reference: &[u8],
    band: usize,
    buf: &mut AlignBuffer,
) -> Option<GlobalAlignment> {
    let m = query.len();
    let n = reference.len();
    if m.abs_diff(n) > band {
        return None;
    }
    let cols = n + 1;
    buf.reset((m + 1) * cols);
    let h = &mut buf.h;

    for i in 0..=m {
        let j_start = i.saturating_sub(band);
        let j_end = (i + band).min(n);
        for j in j_start..=j_end {
            let idx = i * cols + j;
            if i == 0 {
                h[idx] = j as u32;
                continue;
            }
            if j == 0 {
                h[idx] = i as u32;
                continue;
            }
            let subst = u32::from(query[i - 1] != reference[j - 1]);
            let diag = h[(i - 1) * cols + (j - 1)].saturating_add(subst);
            let up = h[(i - 1) * cols + j].saturating_add(1);
            let left = h[i * cols + (j - 1)].saturating_add(1);
            h[idx] = diag.min(up).min(left);
        }
    }

    let distance = h[m * cols + n];
    if distance >= INF {
        return None;
    }

    // 回溯，优先对角线
    let mut ops = Vec::with_capacity(m.max(n));
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        let here = h[i * cols + j];
        if i > 0 && j > 0 {
            let subst = u32::from(query[i - 1] != reference[j - 1]);
            if h[(i - 1) * cols + (j - 1)].saturating_add(subst) == here {
                ops.push('M');
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && h[(i - 1) * cols + j].saturating_add(1) == here {
            ops.push('I');
            i -= 1;
        } else {
            ops.push('D');
            j -= 1;
        }
    }
    ops.reverse();
    Some(GlobalAlignment { distance, ops })
}

/// 带状编辑距离；长度差超出带宽时返回较长序列的长度（一个上界）
pub fn edit_distance(a: &[u8], b: &[u8], band: usize, buf: &mut AlignBuffer) -> u32 {
    banded_global_with_buf(a, b, band, buf)
        .map(|aln| aln.distance)
        .unwrap_or((a.len().max(b.len())) as u32)
}

pub fn ops_to_cigar(ops: &[char]) -> String {
    let mut cigar = String::new();
    let Some((&first, rest)) = ops.split_first() else {
        return cigar;
    };
    let mut cur = first;
    let mut len = 1usize;
    for &op in rest {
        if op == cur {
            len += 1;
        } else {
            let _ = write!(&mut cigar, "{}{}", len, cur);
            cur = op;
            len = 1;
        }
    }
    let _ = write!(&mut cigar, "{}{}", len, cur);
    cigar
}
