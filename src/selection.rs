//! Episode selection expressions.
//!
//! An expression is a comma-separated list of terms, each optionally negated
//! with a leading `!`:
//!
//! | Term | Selects |
//! |------|---------|
//! | `N` | episode N |
//! | `*` | every episode |
//! | `LN` | the last N episodes |
//! | `FN` | the first N episodes |
//! | `N-` | N and everything after |
//! | `-N` | everything up to N |
//! | `N-M` | N through M |
//!
//! Inclusions are unioned, exclusions are unioned, and exclusions are
//! subtracted once at the end. Resolution never fails: unusable terms are
//! dropped with a [`SelectionWarning`].

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::EpisodeRef;

#[allow(clippy::expect_used)]
static TERM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:(?P<all>\*)|(?P<num>\d+)|[lL](?P<last>\d+)|[fF](?P<first>\d+)",
        r"|(?P<from>\d+)-|-(?P<upto>\d+)|(?P<lo>\d+)-(?P<hi>\d+))$",
    ))
    .expect("selection term regex is valid") // Static pattern, safe to panic
});

/// A parsed selection term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// `*`
    All,
    /// `N`
    Number(u32),
    /// `LN`
    Last(usize),
    /// `FN`
    First(usize),
    /// `N-`
    From(u32),
    /// `-N`
    UpTo(u32),
    /// `N-M`
    Range(u32, u32),
}

impl Term {
    /// Parses one term body (without the `!` prefix).
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let caps = TERM_PATTERN.captures(body.trim())?;
        let num = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
        let count = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<usize>().ok());

        if caps.name("all").is_some() {
            Some(Self::All)
        } else if caps.name("num").is_some() {
            num("num").map(Self::Number)
        } else if caps.name("last").is_some() {
            count("last").map(Self::Last)
        } else if caps.name("first").is_some() {
            count("first").map(Self::First)
        } else if caps.name("from").is_some() {
            num("from").map(Self::From)
        } else if caps.name("upto").is_some() {
            num("upto").map(Self::UpTo)
        } else {
            Some(Self::Range(num("lo")?, num("hi")?))
        }
    }

    fn evaluate(
        self,
        available: &[u32],
        raw: &str,
        warnings: &mut Vec<SelectionWarning>,
    ) -> Vec<u32> {
        let matched: Vec<u32> = match self {
            Self::All => {
                if available.is_empty() {
                    warnings.push(SelectionWarning::NoEpisodesAvailable);
                }
                return available.to_vec();
            }
            Self::Number(n) => {
                if available.binary_search(&n).is_ok() {
                    return vec![n];
                }
                warnings.push(SelectionWarning::NotAvailable { number: n });
                return Vec::new();
            }
            Self::Last(0) | Self::First(0) => {
                warnings.push(SelectionWarning::ZeroCount {
                    term: raw.to_string(),
                });
                return Vec::new();
            }
            Self::Last(n) => available[available.len().saturating_sub(n)..].to_vec(),
            Self::First(n) => available[..n.min(available.len())].to_vec(),
            Self::From(lo) => available.iter().copied().filter(|&e| e >= lo).collect(),
            Self::UpTo(hi) => available.iter().copied().filter(|&e| e <= hi).collect(),
            Self::Range(lo, hi) => available
                .iter()
                .copied()
                .filter(|&e| e >= lo && e <= hi)
                .collect(),
        };
        if matched.is_empty() {
            warnings.push(SelectionWarning::NothingMatched {
                term: raw.to_string(),
            });
        }
        matched
    }
}

/// Non-fatal problems found while resolving an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionWarning {
    /// The expression was blank.
    #[error("empty episode selection")]
    EmptyExpression,
    /// A term did not parse.
    #[error("ignoring unrecognized selection term '{term}'")]
    UnrecognizedTerm {
        /// The raw term.
        term: String,
    },
    /// A literal episode number is not in the listing.
    #[error("episode {number} is not available")]
    NotAvailable {
        /// The requested number.
        number: u32,
    },
    /// `*` against an empty listing.
    #[error("no episodes are available")]
    NoEpisodesAvailable,
    /// `L0` or `F0`.
    #[error("'{term}' selects no episodes")]
    ZeroCount {
        /// The raw term.
        term: String,
    },
    /// A range or count term matched no available episode.
    #[error("'{term}' matches no available episode")]
    NothingMatched {
        /// The raw term.
        term: String,
    },
    /// Only exclusion terms were given.
    #[error("selection has only exclusions, nothing is selected")]
    OnlyExclusions,
}

/// Outcome of resolving an expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected episode numbers, ascending and unique.
    pub episodes: Vec<u32>,
    /// Problems found along the way.
    pub warnings: Vec<SelectionWarning>,
}

impl Selection {
    /// True when nothing was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// Resolves `expression` against the available episode numbers.
///
/// The result is always a sorted, duplicate-free subset of `available`.
#[must_use]
pub fn resolve(expression: &str, available: &[u32]) -> Selection {
    let available: Vec<u32> = available
        .iter()
        .copied()
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();

    let mut warnings = Vec::new();
    let mut include = BTreeSet::new();
    let mut exclude = BTreeSet::new();
    let mut saw_inclusion = false;
    let mut saw_term = false;

    for raw in expression.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        saw_term = true;
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, raw),
        };
        let Some(term) = Term::parse(body) else {
            warnings.push(SelectionWarning::UnrecognizedTerm {
                term: raw.to_string(),
            });
            continue;
        };
        let matched = term.evaluate(&available, raw, &mut warnings);
        if negated {
            exclude.extend(matched);
        } else {
            saw_inclusion = true;
            include.extend(matched);
        }
    }

    if !saw_term {
        warnings.push(SelectionWarning::EmptyExpression);
    } else if !saw_inclusion {
        warnings.push(SelectionWarning::OnlyExclusions);
    }

    let episodes: Vec<u32> = include.difference(&exclude).copied().collect();
    debug!(expression, selected = episodes.len(), warnings = warnings.len(), "selection resolved");
    Selection { episodes, warnings }
}

/// Resolves `expression` and maps the numbers back to episode refs, in
/// numeric order. Warnings are logged and returned.
#[must_use]
pub fn resolve_refs(
    expression: &str,
    episodes: &[EpisodeRef],
) -> (Vec<EpisodeRef>, Vec<SelectionWarning>) {
    let numbers: Vec<u32> = episodes.iter().map(|e| e.number).collect();
    let selection = resolve(expression, &numbers);
    for warning in &selection.warnings {
        warn!(%warning, "episode selection");
    }
    let refs = selection
        .episodes
        .iter()
        .filter_map(|n| episodes.iter().find(|e| e.number == *n).cloned())
        .collect();
    (refs, selection.warnings)
}
