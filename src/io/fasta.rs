use std::io::{BufRead, Seek, SeekFrom, Write};

use super::{SequenceRecord, SequenceSource};
use crate::error::Result;

/// FASTA 每行碱基数
pub const LINE_WIDTH: usize = 60;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl FastaRecord {
    fn from_header(header: &str) -> Self {
        let (id, desc) = match header.split_once(char::is_whitespace) {
            Some((id, rest)) => (id, Some(rest.trim()).filter(|d| !d.is_empty())),
            None => (header, None),
        };
        Self { id: id.to_string(), desc: desc.map(str::to_string), seq: Vec::new() }
    }
}

/// 流式 FASTA 读取；多行序列拼接，空白字符丢弃，碱基转大写
pub struct FastaReader<R: BufRead> {
    reader: R,
    line: String,
    done: bool,
    // 上一条记录读到的下一条表头
    pending: Option<String>,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: String::new(), done: false, pending: None }
    }

    /// 读一行到 `self.line`；到文件尾返回 false
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let more = self.reader.read_line(&mut self.line)? > 0;
        if !more {
            self.done = true;
        }
        Ok(more)
    }

    fn header_of_line(&self) -> Option<String> {
        self.line.strip_prefix('>').map(|h| h.trim().to_string())
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done && self.pending.is_none() {
            return Ok(None);
        }
        let header = match self.pending.take() {
            Some(h) => h,
            None => loop {
                if !self.read_line()? {
                    return Ok(None);
                }
                if let Some(h) = self.header_of_line() {
                    break h;
                }
            },
        };

        let mut rec = FastaRecord::from_header(&header);
        while self.read_line()? {
            if let Some(next) = self.header_of_line() {
                self.pending = Some(next);
                break;
            }
            rec.seq.extend(
                self.line
                    .bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|b| b.to_ascii_uppercase()),
            );
        }
        Ok(Some(rec))
    }
}

impl<R: BufRead + Seek> SequenceSource for FastaReader<R> {
    fn has_more(&self) -> bool {
        !self.done || self.pending.is_some()
    }

    fn next_sequence(&mut self) -> Result<Option<SequenceRecord>> {
        Ok(self.next_record()?.map(|r| SequenceRecord { id: r.id, seq: r.seq }))
    }

    fn reset(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.line.clear();
        self.done = false;
        self.pending = None;
        Ok(())
    }
}

/// 写出一条 FASTA 记录，序列按 `LINE_WIDTH` 折行
pub fn write_fasta_record<W: Write>(out: &mut W, header: &str, seq: &[u8]) -> Result<()> {
    writeln!(out, ">{header}")?;
    for line in seq.chunks(LINE_WIDTH) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
