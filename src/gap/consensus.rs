//! 同一缺口多条填充序列的共识：长度中位数过滤 -> 编辑距离 medoid -> 多数投票打磨。

use ahash::AHashMap;

use crate::align::sw::{banded_global_with_buf, edit_distance, AlignBuffer};
use crate::util::dna;

/// 长度偏离中位数不超过 max(10, 0.1 * 中位数) 的填充序列
pub fn filter_by_median_length(fills: &[Vec<u8>]) -> Vec<&[u8]> {
    if fills.is_empty() {
        return Vec::new();
    }
    let mut lens: Vec<usize> = fills.iter().map(Vec::len).collect();
    lens.sort_unstable();
    let median = lens[(lens.len() - 1) / 2];
    let tolerance = 10usize.max((median as f64 * 0.1).round() as usize);
    fills
        .iter()
        .filter(|f| f.len().abs_diff(median) <= tolerance)
        .map(Vec::as_slice)
        .collect()
}

/// 与其余序列编辑距离之和最小的序列下标，平局取下标小的
pub fn medoid(seqs: &[&[u8]], band: usize) -> Option<usize> {
    let mut buf = AlignBuffer::new();
    let mut best: Option<(u64, usize)> = None;
    for (i, a) in seqs.iter().enumerate() {
        let total: u64 = seqs
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, b)| u64::from(edit_distance(a, b, band, &mut buf)))
            .sum();
        if best.map_or(true, |(t, _)| total < t) {
            best = Some((total, i));
        }
    }
    best.map(|(_, i)| i)
}

/// 把每条序列全局比对到 `template` 上逐位投票：
/// 每个位置取票数最多的碱基或删除（平局保留模板碱基），
/// 超过半数序列在同一位置插入时采用最常见的插入串
pub fn polish(template: &[u8], seqs: &[&[u8]], band: usize) -> Vec<u8> {
    let n = template.len();
    // 0..4 为 ACGT，4 为删除
    let mut votes = vec![[0u32; 5]; n];
    let mut insertions: Vec<AHashMap<Vec<u8>, u32>> = vec![AHashMap::new(); n + 1];
    let mut aligned = 0u32;
    let mut buf = AlignBuffer::new();

    for seq in seqs {
        let Some(aln) = banded_global_with_buf(seq, template, band, &mut buf) else { continue };
        aligned += 1;
        let (mut i, mut j) = (0usize, 0usize);
        let mut pending: Vec<u8> = Vec::new();
        for op in aln.ops {
            match op {
                'I' => {
                    pending.push(seq[i]);
                    i += 1;
                }
                _ => {
                    if !pending.is_empty() {
                        *insertions[j].entry(std::mem::take(&mut pending)).or_insert(0) += 1;
                    }
                    if op == 'M' {
                        if let Some(c) = dna::to_code(seq[i]) {
                            votes[j][c as usize] += 1;
                        }
                        i += 1;
                    } else {
                        votes[j][4] += 1;
                    }
                    j += 1;
                }
            }
        }
        if !pending.is_empty() {
            *insertions[n].entry(pending).or_insert(0) += 1;
        }
    }

    let mut out = Vec::with_capacity(n + 8);
    for j in 0..=n {
        if let Some((ins, &count)) = insertions[j].iter().max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0))) {
            if count * 2 > aligned {
                out.extend_from_slice(ins);
            }
        }
        if j == n {
            break;
        }
        let own = dna::to_code(template[j]).map_or(4, usize::from);
        let mut winner = own;
        for (c, &v) in votes[j].iter().enumerate() {
            if v > votes[j][winner] {
                winner = c;
            }
        }
        match winner {
            4 => {}
            c if c == own => out.push(template[j]),
            c => out.push(dna::from_code(c as u8)),
        }
    }
    out
}

/// 完整共识流程；没有序列时返回 None
pub fn consensus(fills: &[Vec<u8>], band: usize) -> Option<Vec<u8>> {
    let kept = filter_by_median_length(fills);
    let center = medoid(&kept, band)?;
    Some(polish(kept[center], &kept, band))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &[u8] = b"ACGTTGCAAGCTAGCTTACGGATCCATGCAAGTCCGATGA";

    fn with_edit(pos: usize, op: char) -> Vec<u8> {
        let mut s = TARGET.to_vec();
        match op {
            'S' => s[pos] = if s[pos] == b'A' { b'C' } else { b'A' },
            'D' => {
                s.remove(pos);
            }
            _ => s.insert(pos, b'T'),
        }
        s
    }

    #[test]
    fn median_filter_drops_outliers() {
        let fills = vec![vec![b'A'; 50], vec![b'A'; 52], vec![b'A'; 48], vec![b'A'; 200], vec![b'A'; 5]];
        let kept = filter_by_median_length(&fills);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|f| (48..=52).contains(&f.len())));
    }

    #[test]
    fn medoid_prefers_central_sequence() {
        let a: &[u8] = b"ACGTACGTAC";
        let b: &[u8] = b"ACGTACGTAA";
        let c: &[u8] = b"TTTTACGTAC";
        assert_eq!(medoid(&[c, a, b], 10), Some(1));
        assert_eq!(medoid(&[], 10), None);
    }

    #[test]
    fn majority_fixes_every_single_error() {
        let fills = vec![
            with_edit(5, 'S'),
            with_edit(12, 'D'),
            with_edit(20, 'I'),
            with_edit(30, 'S'),
            with_edit(35, 'D'),
        ];
        assert_eq!(consensus(&fills, 10).unwrap(), TARGET.to_vec());
    }

    #[test]
    fn shared_insertion_is_kept() {
        let fills = vec![with_edit(20, 'I'), with_edit(20, 'I'), with_edit(20, 'I'), TARGET.to_vec()];
        assert_eq!(consensus(&fills, 10).unwrap(), with_edit(20, 'I'));
    }

    #[test]
    fn empty_input_has_no_consensus() {
        assert!(consensus(&[], 10).is_none());
    }
}
