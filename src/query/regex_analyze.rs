//! Required-literal extraction from regular expressions.
//!
//! A regex match must contain every literal the analysis returns (necessary
//! but not sufficient), so posting-list intersection can narrow candidates
//! before the automaton runs. Extraction is conservative: anything
//! repeating, optional or class-like contributes no constraint, and an
//! alternation constrains only when every branch does.

use crate::error::{Result, ShardError};
use regex_syntax::hir::{Hir, HirKind};

/// Condition tree over required literals
#[derive(Debug, Clone, PartialEq)]
pub enum NgramCond {
    /// Every sub-condition must hold
    And(Vec<NgramCond>),
    /// At least one sub-condition must hold
    Or(Vec<NgramCond>),
    /// The literal must appear in the document (3+ codepoints)
    Literal(String),
    /// No usable constraint; every document is a candidate
    Any,
}

/// Analyze a pattern into its required-literal condition.
///
/// Parsing here is always case-sensitive: the ngram index is case-folded,
/// so the matcher folds the extracted literals before decomposition, and a
/// case-insensitive parse would dissolve letters into classes and lose the
/// factors.
pub fn required_literals(pattern: &str) -> Result<NgramCond> {
    let hir = regex_syntax::Parser::new()
        .parse(pattern)
        .map_err(|e| ShardError::InvalidQuery(format!("bad regex {pattern:?}: {e}")))?;
    Ok(simplify(analyze(&hir)))
}

fn analyze(hir: &Hir) -> NgramCond {
    match hir.kind() {
        HirKind::Literal(lit) => literal_cond(&lit.0),
        HirKind::Concat(parts) => {
            let mut conds = Vec::new();
            for part in parts {
                match analyze(part) {
                    NgramCond::Any => {}
                    cond => conds.push(cond),
                }
            }
            NgramCond::And(conds)
        }
        HirKind::Alternation(branches) => {
            let mut conds = Vec::with_capacity(branches.len());
            for branch in branches {
                match analyze(branch) {
                    // One unconstrained branch makes the whole
                    // alternation unconstrained
                    NgramCond::Any => return NgramCond::Any,
                    cond => conds.push(cond),
                }
            }
            NgramCond::Or(conds)
        }
        HirKind::Capture(cap) => analyze(&cap.sub),
        HirKind::Repetition(rep) => {
            if rep.min >= 1 {
                analyze(&rep.sub)
            } else {
                NgramCond::Any
            }
        }
        HirKind::Empty | HirKind::Look(_) | HirKind::Class(_) => NgramCond::Any,
    }
}

/// A literal run constrains only when long enough to produce an ngram
fn literal_cond(bytes: &[u8]) -> NgramCond {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() >= 3 {
        NgramCond::Literal(text.into_owned())
    } else {
        NgramCond::Any
    }
}

fn simplify(cond: NgramCond) -> NgramCond {
    match cond {
        NgramCond::And(children) => {
            let mut flat = Vec::with_capacity(children.len());
            for child in children {
                match simplify(child) {
                    NgramCond::Any => {}
                    NgramCond::And(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            match flat.len() {
                0 => NgramCond::Any,
                1 => flat.pop().unwrap(),
                _ => NgramCond::And(flat),
            }
        }
        NgramCond::Or(children) => {
            let mut flat = Vec::with_capacity(children.len());
            for child in children {
                match simplify(child) {
                    NgramCond::Any => return NgramCond::Any,
                    NgramCond::Or(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            match flat.len() {
                0 => NgramCond::Any,
                1 => flat.pop().unwrap(),
                _ => NgramCond::Or(flat),
            }
        }
        atom => atom,
    }
}
