//! The query algebra the core consumes.
//!
//! Parsing query strings into this tree is a collaborator's job; the core
//! takes the tree as-is, simplifies it, and evaluates it per shard. Atoms
//! are substring/regex matchers (optionally scoped to filenames) plus
//! repository-level predicates; composites are conjunction, disjunction
//! and negation.

pub mod regex_analyze;

use crate::shard::types::RepoId;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Literal substring match over content or filenames
    Substring {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
    },
    /// Regular expression match
    Regex {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
    /// Restrict to documents on the named branch
    Branch(String),
    /// Restrict to the given numeric repository ids
    RepoIds(Vec<RepoId>),
    /// Restrict to repositories whose name contains the string
    RepoName(String),
    /// Truth constant: matches everything or nothing
    Const(bool),
}

impl Query {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Query::Substring {
            pattern: pattern.into(),
            case_sensitive: false,
            file_name: false,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Query::Regex {
            pattern: pattern.into(),
            case_sensitive: false,
            file_name: false,
        }
    }

    pub fn and(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::And(queries.into_iter().collect())
    }

    pub fn or(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Or(queries.into_iter().collect())
    }

    pub fn not(q: Query) -> Self {
        Query::Not(Box::new(q))
    }

    /// Constant-fold and flatten. And/Or of one child unwrap, nested
    /// same-kind composites flatten, double negation cancels.
    pub fn simplify(self) -> Query {
        match self {
            Query::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match child.simplify() {
                        Query::Const(true) => {}
                        Query::Const(false) => return Query::Const(false),
                        Query::And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => Query::Const(true),
                    1 => flat.pop().unwrap(),
                    _ => Query::And(flat),
                }
            }
            Query::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match child.simplify() {
                        Query::Const(false) => {}
                        Query::Const(true) => return Query::Const(true),
                        Query::Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => Query::Const(false),
                    1 => flat.pop().unwrap(),
                    _ => Query::Or(flat),
                }
            }
            Query::Not(inner) => match inner.simplify() {
                Query::Const(b) => Query::Const(!b),
                Query::Not(inner2) => *inner2,
                other => Query::Not(Box::new(other)),
            },
            atom => atom,
        }
    }

    /// Whether the query constrains anything beyond repository-level
    /// predicates; `list` uses this to refuse content queries.
    pub fn is_repo_level(&self) -> bool {
        match self {
            Query::RepoIds(_) | Query::RepoName(_) | Query::Branch(_) | Query::Const(_) => true,
            Query::And(children) | Query::Or(children) => {
                children.iter().all(Query::is_repo_level)
            }
            Query::Not(inner) => inner.is_repo_level(),
            _ => false,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Substring {
                pattern,
                case_sensitive,
                file_name,
            } => {
                write!(
                    f,
                    "{}substr{}:{pattern:?}",
                    if *file_name { "file_" } else { "" },
                    if *case_sensitive { "_cs" } else { "" }
                )
            }
            Query::Regex {
                pattern,
                case_sensitive,
                file_name,
            } => {
                write!(
                    f,
                    "{}regex{}:{pattern:?}",
                    if *file_name { "file_" } else { "" },
                    if *case_sensitive { "_cs" } else { "" }
                )
            }
            Query::And(children) => {
                write!(f, "(and")?;
                for c in children {
                    write!(f, " {c}")?;
                }
                write!(f, ")")
            }
            Query::Or(children) => {
                write!(f, "(or")?;
                for c in children {
                    write!(f, " {c}")?;
                }
                write!(f, ")")
            }
            Query::Not(inner) => write!(f, "(not {inner})"),
            Query::Branch(b) => write!(f, "branch:{b}"),
            Query::RepoIds(ids) => write!(f, "repos:{ids:?}"),
            Query::RepoName(n) => write!(f, "repo:{n}"),
            Query::Const(b) => write!(f, "const:{b}"),
        }
    }
}
