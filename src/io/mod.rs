//! 序列输入输出：FASTA / FASTQ 读取器与统一的 `SequenceSource` 接口。

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{AsmError, Result};

pub mod fasta;
pub mod fastq;

pub use fasta::{write_fasta_record, FastaReader};
pub use fastq::FastqReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub seq: Vec<u8>,
}

/// 可重放的序列来源。长读段比对分批读取，失败的批次需要从头重放。
pub trait SequenceSource {
    /// 来源耗尽后返回 false
    fn has_more(&self) -> bool;
    fn next_sequence(&mut self) -> Result<Option<SequenceRecord>>;
    fn reset(&mut self) -> Result<()>;
}

/// 内存中的序列集合，测试和小数据直接使用
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: Vec<SequenceRecord>,
    pos: usize,
}

impl VecSource {
    pub fn new(records: Vec<SequenceRecord>) -> Self {
        Self { records, pos: 0 }
    }

    pub fn from_seqs<I, S>(seqs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let records = seqs
            .into_iter()
            .enumerate()
            .map(|(i, s)| SequenceRecord { id: format!("read{i}"), seq: s.as_ref().to_vec() })
            .collect();
        Self::new(records)
    }
}

impl SequenceSource for VecSource {
    fn has_more(&self) -> bool {
        self.pos < self.records.len()
    }

    fn next_sequence(&mut self) -> Result<Option<SequenceRecord>> {
        let rec = self.records.get(self.pos).cloned();
        if rec.is_some() {
            self.pos += 1;
        }
        Ok(rec)
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

/// 按扩展名打开序列文件：`.fq` / `.fastq` 为 FASTQ，其余按 FASTA 处理
pub fn open_sequence_file(path: &Path) -> Result<Box<dyn SequenceSource>> {
    let fh = File::open(path).map_err(|e| {
        AsmError::Io(std::io::Error::new(e.kind(), format!("cannot open '{}': {e}", path.display())))
    })?;
    let buf = BufReader::new(fh);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("fq" | "fastq") => Ok(Box::new(FastqReader::new(buf))),
        _ => Ok(Box::new(FastaReader::new(buf))),
    }
}

/// 读取来源中的全部序列
pub fn read_all(source: &mut dyn SequenceSource) -> Result<Vec<SequenceRecord>> {
    let mut out = Vec::new();
    while let Some(rec) = source.next_sequence()? {
        out.push(rec);
    }
    Ok(out)
}
