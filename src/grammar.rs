//! Field grammar for one usage-rate list entry.
//!
//! An entry renders as a handful of text nodes such as
//! `["3", "KEN", "5.855", "%", "-2.0%"]`. Every token is matched against the
//! rules in order and fills the first still-empty field whose pattern accepts
//! it. A token no rule accepts, or a required field left empty, makes the whole
//! entry [`Unparseable`].

use core::fmt;
use std::sync::LazyLock;

use compact_str::CompactString;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Rank,
    Character,
    Usage,
    /// The detached `%` after the usage figure; consumed without storing.
    Unit,
    Change,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rank => "rank",
            Self::Character => "character",
            Self::Usage => "usage",
            Self::Unit => "unit",
            Self::Change => "change",
        })
    }
}

#[allow(clippy::unwrap_used)]
static RULES: LazyLock<[(Regex, Field); 5]> = LazyLock::new(|| {
    [
        (Regex::new(r"^[0-9]+$").unwrap(), Field::Rank),
        (Regex::new(r"^[A-Z][A-Z.\- ]*$").unwrap(), Field::Character),
        (Regex::new(r"^[0-9]+(\.[0-9]+)?$").unwrap(), Field::Usage),
        (Regex::new(r"^%$").unwrap(), Field::Unit),
        (Regex::new(r"^[+-]?[0-9]+(\.[0-9]+)?%$").unwrap(), Field::Change),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageFields {
    pub rank: u32,
    pub character: CompactString,
    /// Usage rate as displayed, without the percent sign.
    pub usage: CompactString,
    /// Month-over-month change; absent for the first published month.
    pub change: Option<CompactString>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unparseable {
    #[error("token {token:?} matches no rule in {tokens:?}")]
    UnexpectedToken { token: String, tokens: Vec<String> },
    #[error("no {field} in {tokens:?}")]
    Missing { field: Field, tokens: Vec<String> },
}

fn owned(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|&s| s.to_owned()).collect()
}

pub fn parse_usage(tokens: &[&str]) -> Result<UsageFields, Unparseable> {
    let mut rank = None;
    let mut character = None;
    let mut usage = None;
    let mut unit = false;
    let mut change = None;

    'tokens: for &token in tokens {
        for (pattern, field) in RULES.iter() {
            let free = match field {
                Field::Rank => rank.is_none(),
                Field::Character => character.is_none(),
                Field::Usage => usage.is_none(),
                Field::Unit => !unit,
                Field::Change => change.is_none(),
            };
            if !free || !pattern.is_match(token) {
                continue;
            }
            match field {
                Field::Rank => rank = token.parse::<u32>().ok(),
                Field::Character => character = Some(CompactString::from(token)),
                Field::Usage => usage = Some(CompactString::from(token)),
                Field::Unit => unit = true,
                Field::Change => change = Some(CompactString::from(token)),
            }
            continue 'tokens;
        }
        return Err(Unparseable::UnexpectedToken {
            token: token.to_owned(),
            tokens: owned(tokens),
        });
    }

    let missing = |field| Unparseable::Missing {
        field,
        tokens: owned(tokens),
    };
    Ok(UsageFields {
        rank: rank.ok_or_else(|| missing(Field::Rank))?,
        character: character.ok_or_else(|| missing(Field::Character))?,
        usage: usage.ok_or_else(|| missing(Field::Usage))?,
        change,
    })
}
