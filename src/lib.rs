//! # cdbg-rust
//!
//! 压缩 de Bruijn 图组装核心：共轭对称的组装图、k+1-mer 索引、图简化与长读段缺口闭合。
//!
//! 图中每条边都有一条反向互补的共轭边，所有修改成对进行；
//! 索引只在 [`pack::GraphPack`] 内部与图同步，外部无法看到不一致的状态。
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use cdbg_rust::config::AssemblyConfig;
//! use cdbg_rust::graph::construct::build_from_reads;
//! use cdbg_rust::pack::GraphPack;
//! use cdbg_rust::simplify::Simplifier;
//!
//! let reads = vec![b"ACGTACGTAGCTGATCGTAGGCTAGCTAGGATCCA".to_vec()];
//! let config = AssemblyConfig { k: 21, read_length: 35, ..AssemblyConfig::default() };
//! let (graph, counts) = build_from_reads(&reads, config.k, 1).unwrap();
//! let mut pack = GraphPack::new(graph, counts);
//! let stats = Simplifier::new(&config).run(&mut pack).unwrap();
//! println!("{} edges left", stats.edges_left);
//! ```
//!
//! ## 模块说明
//!
//! - [`graph`]：共轭对称图、构图与链压缩
//! - [`index`]：k+1-mer 到 (边, 偏移) 的索引
//! - [`pack`]：图 + 索引的组合体，唯一的修改入口
//! - [`simplify`]：尖端、气泡、错误连接与低覆盖度组件的移除
//! - [`align`]：长读段到图的种子 / 链比对
//! - [`gap`]：缺口收集、共识与闭合
//! - [`io`]：FASTA / FASTQ 读取与输出
//! - [`config`] / [`logging`] / [`error`]：配置、日志与错误类型

pub mod align;
pub mod config;
pub mod error;
pub mod gap;
pub mod graph;
pub mod index;
pub mod io;
pub mod logging;
pub mod pack;
pub mod simplify;
pub mod util;
