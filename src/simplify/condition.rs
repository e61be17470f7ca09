//! 边删除条件的小语言：`"{ tc_lb 2.5 , cb 1000. } { tc_lb 2.5 , rctc 1.2 }"`。
//!
//! 花括号内的项之间为 AND，各组之间为 OR。支持的项：
//!
//! | 项 | 含义 |
//! |----|------|
//! | `tc_lb c` | 长度 <= round(min(k, read_length / 2) * c) |
//! | `lb n` | 长度 <= n |
//! | `ec_lb n` | 长度 <= k + n |
//! | `cb c` | 覆盖度 <= c |
//! | `icb c` | 覆盖度 <= c * (i + 1) / N，i 为当前轮次，N 为总轮数 |
//! | `ncb c` | 覆盖度 * 长度 <= c |
//! | `rctc r` | 覆盖度 * r < 相邻竞争边的最大覆盖度 |

use std::fmt;
use std::str::FromStr;

use crate::error::{AsmError, Result};
use crate::graph::{EdgeId, GraphLike};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term {
    TipLengthBound(f64),
    LengthBound(usize),
    EcLengthBound(usize),
    CoverageBound(f64),
    IterativeCoverageBound(f64),
    NormalizedCoverageBound(f64),
    RelativeCoverageTip(f64),
}

/// 条件求值所需的外部参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionContext {
    pub k: usize,
    pub read_length: usize,
    /// 外层简化循环当前轮次（0 起始）
    pub iteration: usize,
    pub iterations: usize,
}

impl ConditionContext {
    pub fn new(k: usize, read_length: usize) -> Self {
        Self { k, read_length, iteration: 0, iterations: 1 }
    }

    pub fn at_iteration(self, iteration: usize, iterations: usize) -> Self {
        Self { iteration, iterations: iterations.max(1), ..self }
    }
}

impl Term {
    fn parse(name: &str, value: &str) -> Result<Self> {
        let float = || -> Result<f64> {
            let v: f64 = value
                .parse()
                .map_err(|_| AsmError::config(format!("bad value '{value}' for condition term '{name}'")))?;
            if !v.is_finite() || v < 0.0 {
                return Err(AsmError::config(format!("condition term '{name}' needs a non-negative value, got {value}")));
            }
            Ok(v)
        };
        let int = || -> Result<usize> {
            value
                .parse()
                .map_err(|_| AsmError::config(format!("condition term '{name}' needs a non-negative integer, got {value}")))
        };
        Ok(match name {
            "tc_lb" => Term::TipLengthBound(float()?),
            "lb" => Term::LengthBound(int()?),
            "ec_lb" => Term::EcLengthBound(int()?),
            "cb" => Term::CoverageBound(float()?),
            "icb" => Term::IterativeCoverageBound(float()?),
            "ncb" => Term::NormalizedCoverageBound(float()?),
            "rctc" => Term::RelativeCoverageTip(float()?),
            other => return Err(AsmError::config(format!("unknown condition term '{other}'"))),
        })
    }

    /// 长度类项给出的长度上限
    fn length_bound(&self, ctx: &ConditionContext) -> Option<usize> {
        match *self {
            Term::TipLengthBound(c) => {
                let base = ctx.k.min(ctx.read_length / 2) as f64;
                Some((base * c).round() as usize)
            }
            Term::LengthBound(n) => Some(n),
            Term::EcLengthBound(n) => Some(ctx.k + n),
            _ => None,
        }
    }

    fn check<G: GraphLike>(&self, graph: &G, e: EdgeId, ctx: &ConditionContext) -> bool {
        let cov = graph.coverage(e);
        let len = graph.edge_length(e);
        match *self {
            Term::TipLengthBound(_) | Term::LengthBound(_) | Term::EcLengthBound(_) => {
                self.length_bound(ctx).is_some_and(|bound| len <= bound)
            }
            Term::CoverageBound(c) => cov <= c,
            Term::IterativeCoverageBound(c) => {
                cov <= c * (ctx.iteration + 1) as f64 / ctx.iterations as f64
            }
            Term::NormalizedCoverageBound(c) => cov * len as f64 <= c,
            Term::RelativeCoverageTip(r) => {
                let best = max_competitor_coverage(graph, e);
                best.is_some_and(|m| cov * r < m)
            }
        }
    }
}

/// 与 e 共享起点或终点的其他边中最大的覆盖度
pub fn max_competitor_coverage<G: GraphLike>(graph: &G, e: EdgeId) -> Option<f64> {
    let start = graph.edge_start(e);
    let end = graph.edge_end(e);
    let conj = graph.conjugate_edge(e);
    graph
        .outgoing_edges(start)
        .iter()
        .copied()
        .chain(graph.incoming_edges(end))
        .filter(|&x| x != e && x != conj)
        .map(|x| graph.coverage(x))
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::TipLengthBound(c) => write!(f, "tc_lb {c}"),
            Term::LengthBound(n) => write!(f, "lb {n}"),
            Term::EcLengthBound(n) => write!(f, "ec_lb {n}"),
            Term::CoverageBound(c) => write!(f, "cb {c}"),
            Term::IterativeCoverageBound(c) => write!(f, "icb {c}"),
            Term::NormalizedCoverageBound(c) => write!(f, "ncb {c}"),
            Term::RelativeCoverageTip(r) => write!(f, "rctc {r}"),
        }
    }
}

/// 解析后的条件：组间 OR，组内 AND
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    groups: Vec<Vec<Term>>,
}

impl Condition {
    pub fn groups(&self) -> &[Vec<Term>] {
        &self.groups
    }

    /// 每个组都带长度项
    pub fn is_length_bounded(&self) -> bool {
        self.groups.iter().all(|g| {
            g.iter().any(|t| {
                matches!(t, Term::TipLengthBound(_) | Term::LengthBound(_) | Term::EcLengthBound(_))
            })
        })
    }

    /// 任何满足条件的边长度都不超过该值；存在无长度限制的组时返回 None
    pub fn max_length(&self, ctx: &ConditionContext) -> Option<usize> {
        let mut best = 0usize;
        for group in &self.groups {
            let bound = group.iter().filter_map(|t| t.length_bound(ctx)).min()?;
            best = best.max(bound);
        }
        Some(best)
    }

    pub fn check<G: GraphLike>(&self, graph: &G, e: EdgeId, ctx: &ConditionContext) -> bool {
        self.groups
            .iter()
            .any(|group| group.iter().all(|t| t.check(graph, e, ctx)))
    }

    /// 解析并要求每个组都有长度上限
    pub fn parse_bounded(text: &str) -> Result<Self> {
        let cond: Self = text.parse()?;
        if !cond.is_length_bounded() {
            return Err(AsmError::config(format!(
                "condition '{text}' has a group without a length bound"
            )));
        }
        Ok(cond)
    }
}

impl FromStr for Condition {
    type Err = AsmError;

    fn from_str(text: &str) -> Result<Self> {
        let spaced = text
            .replace('{', " { ")
            .replace('}', " } ")
            .replace(',', " , ");
        let mut tokens = spaced.split_whitespace().peekable();
        let mut groups = Vec::new();

        while let Some(tok) = tokens.next() {
            if tok != "{" {
                return Err(AsmError::config(format!("expected '{{' in condition '{text}', got '{tok}'")));
            }
            let mut group = Vec::new();
            loop {
                let name = tokens
                    .next()
                    .ok_or_else(|| AsmError::config(format!("unterminated group in condition '{text}'")))?;
                if name == "}" && group.is_empty() {
                    return Err(AsmError::config(format!("empty group in condition '{text}'")));
                }
                let value = tokens
                    .next()
                    .ok_or_else(|| AsmError::config(format!("missing value for '{name}' in condition '{text}'")))?;
                group.push(Term::parse(name, value)?);
                match tokens.next() {
                    Some(",") => continue,
                    Some("}") => break,
                    Some(other) => {
                        return Err(AsmError::config(format!("unexpected '{other}' in condition '{text}'")))
                    }
                    None => return Err(AsmError::config(format!("unterminated group in condition '{text}'"))),
                }
            }
            groups.push(group);
        }
        if groups.is_empty() {
            return Err(AsmError::config("empty condition"));
        }
        Ok(Self { groups })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{{ ")?;
            for (j, t) in group.iter().enumerate() {
                if j > 0 {
                    write!(f, " , ")?;
                }
                write!(f, "{t}")?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConjugateGraph;

    #[test]
    fn parse_default_tip_condition() {
        let c: Condition = "{ tc_lb 2.5 , cb 1000. } { tc_lb 2.5 , rctc 1.2 }".parse().unwrap();
        assert_eq!(c.groups().len(), 2);
        assert_eq!(c.groups()[0], vec![Term::TipLengthBound(2.5), Term::CoverageBound(1000.0)]);
        assert_eq!(c.groups()[1][1], Term::RelativeCoverageTip(1.2));
        assert!(c.is_length_bounded());
        assert_eq!(c.to_string(), "{ tc_lb 2.5 , cb 1000 } { tc_lb 2.5 , rctc 1.2 }");
    }

    #[test]
    fn parse_compact_form() {
        let c: Condition = "{cb 30,ec_lb 20}".parse().unwrap();
        assert_eq!(c.groups()[0], vec![Term::CoverageBound(30.0), Term::EcLengthBound(20)]);
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<Condition>().is_err());
        assert!("{ }".parse::<Condition>().is_err());
        assert!("{ cb -1 , lb 3 }".parse::<Condition>().is_err());
        assert!("{ foo 1 }".parse::<Condition>().is_err());
        assert!("{ cb 1".parse::<Condition>().is_err());
        assert!("{ lb 2.5 }".parse::<Condition>().is_err());
        assert!(Condition::parse_bounded("{ cb 30 }").is_err());
        assert!(Condition::parse_bounded("{ cb 30 , lb 4 } { icb 3 , ec_lb 2 }").is_ok());
    }

    #[test]
    fn max_length_takes_loosest_group() {
        let ctx = ConditionContext::new(21, 100);
        let c: Condition = "{ tc_lb 2.5 , cb 1 } { ec_lb 30 , lb 40 }".parse().unwrap();
        // 组 1：round(21 * 2.5) = 53；组 2：min(51, 40) = 40
        assert_eq!(c.max_length(&ctx), Some(53));
        let ctx = ConditionContext::new(21, 30);
        // min(21, 15) * 2.5 = 37.5 -> 38
        assert_eq!(c.max_length(&ctx), Some(40));
    }

    #[test]
    fn evaluate_terms_on_graph() {
        let mut g = ConjugateGraph::new(5).unwrap();
        let weak = g.add_edge(b"ACCTGATT", 2.0).unwrap(); // 长度 3
        let strong = g.add_edge(b"ACCTGCCATG", 20.0).unwrap(); // 同起点，长度 5
        let ctx = ConditionContext::new(5, 100);

        let c: Condition = "{ lb 3 , cb 2 }".parse().unwrap();
        assert!(c.check(&g, weak, &ctx));
        assert!(!c.check(&g, strong, &ctx));

        let c: Condition = "{ lb 10 , rctc 5 }".parse().unwrap();
        assert!(c.check(&g, weak, &ctx));
        assert!(!c.check(&g, strong, &ctx));

        let c: Condition = "{ lb 10 , ncb 6 }".parse().unwrap();
        assert!(c.check(&g, weak, &ctx));

        let c: Condition = "{ lb 10 , icb 8 }".parse().unwrap();
        // 第 0 轮（共 4 轮）阈值为 2
        assert!(c.check(&g, weak, &ctx.at_iteration(0, 4)));
        let c: Condition = "{ lb 10 , icb 4 }".parse().unwrap();
        assert!(!c.check(&g, weak, &ctx.at_iteration(0, 4)));
        assert!(c.check(&g, weak, &ctx.at_iteration(1, 4)));
    }
}
