//! 长读段缺口闭合：收集缺口 -> 补齐顶点 k-mer -> 共识 -> 桥接并合并边。

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ahash::AHashMap;
use tracing::info;

use crate::align::map_long_reads;
use crate::config::AssemblyConfig;
use crate::error::Result;
use crate::graph::{EdgeId, GraphLike};
use crate::io::SequenceSource;
use crate::pack::GraphPack;

pub mod closer;
pub mod consensus;
pub mod path;
pub mod storage;

pub use closer::{write_closed_gaps, ClosedGap, GapCloser};
pub use path::PathStorage;
pub use storage::{GapDescription, GapFill, GapStorage};

/// 沿替换链找到边当前的编号；链上出现环时停在环内
pub fn resolve(replacement: &AHashMap<EdgeId, EdgeId>, e: EdgeId) -> EdgeId {
    let mut cur = e;
    let mut steps = 0usize;
    while let Some(&next) = replacement.get(&cur) {
        if next == cur || steps > replacement.len() {
            break;
        }
        cur = next;
        steps += 1;
    }
    cur
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapClosingStats {
    pub gap_classes: usize,
    pub gaps: usize,
    pub paths: usize,
    pub resolved: usize,
    pub closed: usize,
}

fn dump_to<F>(out_dir: Option<&Path>, name: &str, f: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(dir) = out_dir {
        let mut out = BufWriter::new(File::create(dir.join(name))?);
        f(&mut out)?;
    }
    Ok(())
}

/// 完整的缺口闭合流程。给出 `out_dir` 时写出中间结果：
/// `gaps.mpr`、`long_reads_before_rep.mpr`、`gaps_padded.mpr`、`long_reads.mpr` 和 `closed_gaps.fasta`
pub fn run_gap_closing(
    pack: &mut GraphPack,
    source: &mut dyn SequenceSource,
    config: &AssemblyConfig,
    out_dir: Option<&Path>,
) -> Result<GapClosingStats> {
    config.validate()?;
    let (mut paths, mut gaps) = map_long_reads(pack, source, config)?;
    let mut stats = GapClosingStats {
        gap_classes: gaps.len(),
        gaps: gaps.gap_count(),
        paths: paths.len(),
        ..GapClosingStats::default()
    };
    let none = AHashMap::new();
    dump_to(out_dir, "gaps.mpr", |out| gaps.dump(out, &none))?;
    dump_to(out_dir, "long_reads_before_rep.mpr", |out| paths.dump(out, &none))?;

    gaps.pad_gap_strings(pack.graph())?;
    dump_to(out_dir, "gaps_padded.mpr", |out| gaps.dump(out, &none))?;

    let closer = GapCloser::new(config.gap_closer.clone());
    let closed = closer.construct_consensus(config.threads, &mut gaps)?;
    stats.resolved = closed.len();

    let mut replacement = AHashMap::new();
    stats.closed = pack.edit(|g| closer.close_gaps_in_graph(g, &closed, &mut replacement))?;
    paths.replace_edges(&replacement);
    dump_to(out_dir, "long_reads.mpr", |out| paths.dump(out, &none))?;
    dump_to(out_dir, "closed_gaps.fasta", |out| write_closed_gaps(out, &closed).map(|_| ()))?;

    info!(
        classes = stats.gap_classes,
        resolved = stats.resolved,
        closed = stats.closed,
        edges = pack.graph().edge_count(),
        "gap closing done"
    );
    Ok(stats)
}
