/// 打包后 k-mer 的最大长度（2 bit/碱基，u128）
pub const MAX_KMER_LEN: usize = 64;

/// 碱基 -> 2 bit 编码 {A:0, C:1, G:2, T:3}，其余（含 N）返回 None
#[inline]
pub fn to_code(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn from_code(c: u8) -> u8 {
    match c & 3 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

pub fn normalize_seq(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq {
        let up = b.to_ascii_uppercase();
        let nb = match up {
            b'A' | b'C' | b'G' | b'T' | b'N' => up,
            b'U' => b'T',
            _ => b'N',
        };
        out.push(nb);
    }
    out
}

/// 序列是否只包含 ACGT
pub fn is_acgt(seq: &[u8]) -> bool {
    seq.iter().all(|&b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq.iter().rev() {
        out.push(complement(b));
    }
    out
}

#[inline]
fn kmer_mask(len: usize) -> u128 {
    if len >= MAX_KMER_LEN {
        u128::MAX
    } else {
        (1u128 << (2 * len)) - 1
    }
}

/// 将长度 <= 64 的序列打包成 u128；遇到非 ACGT 返回 None
pub fn encode_kmer(seq: &[u8]) -> Option<u128> {
    if seq.len() > MAX_KMER_LEN {
        return None;
    }
    let mut code = 0u128;
    for &b in seq {
        code = (code << 2) | to_code(b)? as u128;
    }
    Some(code)
}

pub fn decode_kmer(code: u128, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| from_code(((code >> (2 * (len - 1 - i))) & 3) as u8))
        .collect()
}

/// 打包 k-mer 的反向互补
pub fn revcomp_code(code: u128, len: usize) -> u128 {
    let mut src = code;
    let mut out = 0u128;
    for _ in 0..len {
        out = (out << 2) | (3 - (src & 3));
        src >>= 2;
    }
    out
}

/// 滚动 k-mer 迭代器：依次产出 (offset, code)，跳过包含 N 的窗口。
/// 每步 O(1)，整条序列 O(n)。
pub struct KmerIter<'a> {
    seq: &'a [u8],
    len: usize,
    mask: u128,
    pos: usize,
    code: u128,
    valid: usize,
}

impl<'a> KmerIter<'a> {
    pub fn new(seq: &'a [u8], len: usize) -> Self {
        Self { seq, len, mask: kmer_mask(len), pos: 0, code: 0, valid: 0 }
    }
}

impl Iterator for KmerIter<'_> {
    type Item = (usize, u128);

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 || self.len > MAX_KMER_LEN {
            return None;
        }
        while self.pos < self.seq.len() {
            let b = self.seq[self.pos];
            self.pos += 1;
            match to_code(b) {
                Some(c) => {
                    self.code = ((self.code << 2) | c as u128) & self.mask;
                    self.valid += 1;
                }
                None => {
                    self.valid = 0;
                    self.code = 0;
                    continue;
                }
            }
            if self.valid >= self.len {
                return Some((self.pos - self.len, self.code));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_kmer() {
        let code = encode_kmer(b"ACGTTGCA").unwrap();
        assert_eq!(decode_kmer(code, 8), b"ACGTTGCA");
        assert!(encode_kmer(b"ACNT").is_none());
    }

    #[test]
    fn revcomp_code_matches_revcomp() {
        let seq = b"AACGTGGTCA";
        let rc = revcomp(seq);
        let code = encode_kmer(seq).unwrap();
        assert_eq!(revcomp_code(code, seq.len()), encode_kmer(&rc).unwrap());
    }

    #[test]
    fn rolling_iter_skips_ambiguous_windows() {
        let seq = b"ACGTNACGTA";
        let got: Vec<(usize, Vec<u8>)> = KmerIter::new(seq, 4)
            .map(|(o, c)| (o, decode_kmer(c, 4)))
            .collect();
        assert_eq!(
            got,
            vec![
                (0, b"ACGT".to_vec()),
                (5, b"ACGT".to_vec()),
                (6, b"CGTA".to_vec()),
            ]
        );
    }

    #[test]
    fn rolling_iter_full_width() {
        let seq: Vec<u8> = b"ACGT".iter().cycle().take(70).copied().collect();
        let n = KmerIter::new(&seq, 64).count();
        assert_eq!(n, 7);
        let (_, first) = KmerIter::new(&seq, 64).next().unwrap();
        assert_eq!(decode_kmer(first, 64), &seq[..64]);
    }

    #[test]
    fn normalize_and_complement() {
        assert_eq!(normalize_seq(b"acgu*"), b"ACGTN");
        assert_eq!(revcomp(b"AACG"), b"CGTT");
        assert!(is_acgt(b"ACGT"));
        assert!(!is_acgt(b"ACGN"));
    }
}
