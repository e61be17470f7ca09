//! 组装参数。所有字段都有默认值，可从 TOML / JSON 文件加载（按扩展名区分），
//! 加载后必须先 `validate`，任何图修改都发生在校验通过之后。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AsmError, Result};
use crate::simplify::condition::Condition;
use crate::util::dna::MAX_KMER_LEN;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblyConfig {
    /// 顶点 k-mer 长度，必须为奇数
    pub k: usize,
    /// 短读段长度，用于 `tc_lb` 条件
    pub read_length: usize,
    pub threads: usize,
    /// 构图时 k+1-mer 的最小出现次数
    pub min_kmer_count: u32,
    pub simplification: SimplificationConfig,
    pub gap_closer: GapCloserConfig,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            k: 55,
            read_length: 100,
            threads: 1,
            min_kmer_count: 1,
            simplification: SimplificationConfig::default(),
            gap_closer: GapCloserConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimplificationConfig {
    pub max_iterations: usize,
    /// 每轮结束后校验共轭对称性与索引一致性
    pub check_invariants: bool,
    pub tip_clipper: TipClipperConfig,
    pub bulge_remover: BulgeRemoverConfig,
    pub complex_bulge_remover: ComplexBulgeRemoverConfig,
    pub erroneous_connections: EcRemoverConfig,
    pub topology_ec: TopologyEcConfig,
    pub max_flow_ec: MaxFlowEcConfig,
    pub relative_coverage: RelativeCoverageConfig,
}

impl Default for SimplificationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            check_invariants: true,
            tip_clipper: TipClipperConfig::default(),
            bulge_remover: BulgeRemoverConfig::default(),
            complex_bulge_remover: ComplexBulgeRemoverConfig::default(),
            erroneous_connections: EcRemoverConfig::default(),
            topology_ec: TopologyEcConfig::default(),
            max_flow_ec: MaxFlowEcConfig::default(),
            relative_coverage: RelativeCoverageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TipClipperConfig {
    pub condition: String,
}

impl Default for TipClipperConfig {
    fn default() -> Self {
        Self { condition: "{ tc_lb 2.5 , cb 1000. } { tc_lb 2.5 , rctc 1.2 }".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BulgeRemoverConfig {
    pub enabled: bool,
    pub max_bulge_length_coefficient: f64,
    pub max_additive_length_coefficient: usize,
    pub max_coverage: f64,
    pub max_relative_coverage: f64,
    pub max_delta: usize,
    pub max_relative_delta: f64,
}

impl Default for BulgeRemoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bulge_length_coefficient: 4.0,
            max_additive_length_coefficient: 0,
            max_coverage: 1000.0,
            max_relative_coverage: 1.2,
            max_delta: 3,
            max_relative_delta: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplexBulgeRemoverConfig {
    pub enabled: bool,
    pub max_length_multiplier: f64,
    pub max_length_difference: usize,
    /// 单个区域探索的顶点上限
    pub max_vertices: usize,
}

impl Default for ComplexBulgeRemoverConfig {
    fn default() -> Self {
        Self { enabled: true, max_length_multiplier: 5.0, max_length_difference: 5, max_vertices: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EcRemoverConfig {
    pub condition: String,
}

impl Default for EcRemoverConfig {
    fn default() -> Self {
        Self { condition: "{ cb 30 , ec_lb 20 }".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopologyEcConfig {
    pub enabled: bool,
    pub max_ec_length_coefficient: usize,
    pub uniqueness_length: usize,
    pub plausibility_length: usize,
    pub max_iterations: usize,
}

impl Default for TopologyEcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_ec_length_coefficient: 20,
            uniqueness_length: 1500,
            plausibility_length: 200,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaxFlowEcConfig {
    pub enabled: bool,
    pub max_ec_length_coefficient: usize,
    pub uniqueness_length: usize,
    pub plausibility_length: usize,
    pub max_component_vertices: usize,
}

impl Default for MaxFlowEcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_ec_length_coefficient: 20,
            uniqueness_length: 3000,
            plausibility_length: 200,
            max_component_vertices: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelativeCoverageConfig {
    pub enabled: bool,
    pub coverage_gap: f64,
    pub length_bound: usize,
    pub max_component_edges: usize,
    pub min_border_coverage: f64,
    /// 计算侧翼覆盖度的窗口长度
    pub flanking_range: usize,
}

impl Default for RelativeCoverageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            coverage_gap: 5.0,
            length_bound: 100,
            max_component_edges: 20,
            min_border_coverage: 0.0,
            flanking_range: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GapCloserConfig {
    /// 种子长度，缺省为 k + 1
    pub seed_len: Option<usize>,
    /// 每隔多少个位置取一个种子
    pub seed_step: usize,
    pub batch_size: usize,
    pub min_gap_support: usize,
    /// 同一条链上相邻种子允许的最大间隔
    pub max_seed_gap: usize,
    /// 读段离开 / 进入边时距边端点的容差
    pub end_tolerance: usize,
    /// 连接相邻比对边时图中路径的最大长度
    pub max_path_search_length: usize,
    /// 共识打磨时带状比对的带宽
    pub consensus_band: usize,
    pub batch_retries: usize,
}

impl Default for GapCloserConfig {
    fn default() -> Self {
        Self {
            seed_len: None,
            seed_step: 1,
            batch_size: 50_000,
            min_gap_support: 2,
            max_seed_gap: 100,
            end_tolerance: 100,
            max_path_search_length: 200,
            consensus_band: 50,
            batch_retries: 1,
        }
    }
}

impl GapCloserConfig {
    pub fn seed_len(&self, k: usize) -> usize {
        self.seed_len.unwrap_or(k + 1)
    }
}

fn non_negative(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v < 0.0 {
        return Err(AsmError::config(format!("{name} must be a non-negative number, got {v}")));
    }
    Ok(())
}

fn positive(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(AsmError::config(format!("{name} must be positive, got {v}")));
    }
    Ok(())
}

impl AssemblyConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let cfg: Self = match ext.as_deref() {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| AsmError::config(format!("cannot parse '{}': {e}", path.display())))?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| AsmError::config(format!("cannot parse '{}': {e}", path.display())))?,
            _ => {
                return Err(AsmError::config(format!(
                    "unsupported config format '{}', use .toml or .json",
                    path.display()
                )))
            }
        };
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AsmError::config(e.to_string()))
    }

    /// 参数校验，失败时不应进行任何图修改
    pub fn validate(&self) -> Result<()> {
        if self.k % 2 == 0 || !(3..MAX_KMER_LEN).contains(&self.k) {
            return Err(AsmError::config(format!("k = {} must be odd and within 3..=63", self.k)));
        }
        if self.k >= self.read_length {
            return Err(AsmError::config(format!(
                "k = {} must be shorter than read_length = {}",
                self.k, self.read_length
            )));
        }
        if self.threads == 0 {
            return Err(AsmError::config("threads must be at least 1"));
        }

        let s = &self.simplification;
        Condition::parse_bounded(&s.tip_clipper.condition)?;
        Condition::parse_bounded(&s.erroneous_connections.condition)?;

        let br = &s.bulge_remover;
        non_negative("bulge_remover.max_bulge_length_coefficient", br.max_bulge_length_coefficient)?;
        non_negative("bulge_remover.max_coverage", br.max_coverage)?;
        non_negative("bulge_remover.max_relative_coverage", br.max_relative_coverage)?;
        non_negative("bulge_remover.max_relative_delta", br.max_relative_delta)?;

        positive("complex_bulge_remover.max_length_multiplier", s.complex_bulge_remover.max_length_multiplier)?;

        let rc = &s.relative_coverage;
        positive("relative_coverage.coverage_gap", rc.coverage_gap)?;
        non_negative("relative_coverage.min_border_coverage", rc.min_border_coverage)?;
        if rc.flanking_range == 0 {
            return Err(AsmError::config("relative_coverage.flanking_range must be at least 1"));
        }

        let gc = &self.gap_closer;
        let seed_len = gc.seed_len(self.k);
        if seed_len == 0 || seed_len > self.k + 1 {
            return Err(AsmError::config(format!(
                "gap_closer.seed_len = {seed_len} must be within 1..={}",
                self.k + 1
            )));
        }
        if gc.seed_step == 0 {
            return Err(AsmError::config("gap_closer.seed_step must be at least 1"));
        }
        if gc.batch_size == 0 {
            return Err(AsmError::config("gap_closer.batch_size must be at least 1"));
        }
        Ok(())
    }
}
