use std::io::{BufRead, Seek, SeekFrom};

use super::{SequenceRecord, SequenceSource};
use crate::error::{AsmError, Result};

#[derive(Debug, Clone)]
pub struct FastqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
}

fn malformed(msg: &str) -> AsmError {
    AsmError::InvalidSequence(format!("malformed FASTQ: {msg}"))
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), done: false }
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        if self.done { return Ok(None); }

        // 跳过记录之间的空行
        let mut n;
        loop {
            self.buf.clear();
            n = self.reader.read_line(&mut self.buf)?;
            if n == 0 { self.done = true; return Ok(None); }
            if !self.buf.trim().is_empty() { break; }
        }
        if !self.buf.starts_with('@') {
            return Err(malformed("header not starting with '@'"));
        }
        let header = self.buf[1..].trim_end().to_string();
        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        self.buf.clear();
        n = self.reader.read_line(&mut self.buf)?;
        if n == 0 { return Err(malformed("unexpected EOF after header")); }
        let seq: Vec<u8> = self.buf.trim_end().bytes().map(|b| b.to_ascii_uppercase()).collect();

        self.buf.clear();
        n = self.reader.read_line(&mut self.buf)?;
        if n == 0 || !self.buf.starts_with('+') { return Err(malformed("missing '+' line")); }

        self.buf.clear();
        n = self.reader.read_line(&mut self.buf)?;
        if n == 0 { return Err(malformed("missing quality line")); }
        let qual = self.buf.trim_end().as_bytes().to_vec();

        // 不支持折行的 FASTQ
        if qual.len() != seq.len() { return Err(malformed("seq/qual length mismatch")); }

        Ok(Some(FastqRecord { id, desc, seq, qual }))
    }
}

impl<R: BufRead + Seek> SequenceSource for FastqReader<R> {
    fn has_more(&self) -> bool {
        !self.done
    }

    fn next_sequence(&mut self) -> Result<Option<SequenceRecord>> {
        Ok(self
            .next_record()?
            .map(|r| SequenceRecord { id: r.id, seq: r.seq }))
    }

    fn reset(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.buf.clear();
        self.done = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_two_records() {
        let data = b"@r1 lane=1\nacgt\n+\nIIII\n\n@r2\nGG\n+r2\n##\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "r1");
        assert_eq!(r1.desc.as_deref(), Some("lane=1"));
        assert_eq!(r1.seq, b"ACGT");
        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.qual, b"##");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn rejects_length_mismatch() {
        let data = b"@r1\nACGT\n+\nII\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        assert!(matches!(r.next_record(), Err(AsmError::InvalidSequence(_))));
    }

    #[test]
    fn reset_replays() {
        let data = b"@r1\nACGT\n+\nIIII\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        assert!(r.next_sequence().unwrap().is_some());
        assert!(r.next_sequence().unwrap().is_none());
        r.reset().unwrap();
        assert_eq!(r.next_sequence().unwrap().unwrap().seq, b"ACGT");
    }
}
