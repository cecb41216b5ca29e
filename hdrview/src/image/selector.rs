//! Channel selectors.
//!
//! A selector is a comma-separated list of patterns, e.g. `R,G,B` or
//! `diffuse,spec`. In [`SelectorMode::Fuzzy`] a pattern matches a channel
//! name if it occurs in it, ignoring case. In [`SelectorMode::Regex`] each
//! pattern is a regular expression searched in the channel name.
//!
//! The rank of a match is the index of the first pattern that matches. It
//! decides the order channels end up in after normalization.
//!
//! # Example
//!
//! ```
//! use hdrview::image::ChannelSelector;
//!
//! let selector = ChannelSelector::fuzzy("b, r");
//! assert_eq!(selector.match_rank("diffuse.R").unwrap(), Some(1));
//! assert_eq!(selector.match_rank("diffuse.B").unwrap(), Some(0));
//! assert_eq!(selector.match_rank("depth.Z").unwrap(), None);
//! ```

use super::error::ImageError;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How selector patterns are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectorMode {
    /// Case-insensitive substring match.
    #[default]
    Fuzzy,
    /// Regular expression search.
    Regex,
}

impl FromStr for SelectorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fuzzy" => Ok(Self::Fuzzy),
            "regex" => Ok(Self::Regex),
            other => Err(format!("unknown selector mode '{}'", other)),
        }
    }
}

impl fmt::Display for SelectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Regex => write!(f, "regex"),
        }
    }
}

/// A parsed channel selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSelector {
    text: String,
    patterns: Vec<String>,
    mode: SelectorMode,
}

impl ChannelSelector {
    pub fn new(text: impl Into<String>, mode: SelectorMode) -> Self {
        let text = text.into();
        let patterns = split_patterns(&text);
        Self {
            text,
            patterns,
            mode,
        }
    }

    pub fn fuzzy(text: impl Into<String>) -> Self {
        Self::new(text, SelectorMode::Fuzzy)
    }

    pub fn regex(text: impl Into<String>) -> Self {
        Self::new(text, SelectorMode::Regex)
    }

    /// The selector as given by the user.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    /// The non-empty, trimmed patterns in order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if the selector keeps every channel.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the index of the first pattern matching `name`.
    pub fn match_rank(&self, name: &str) -> Result<Option<usize>, ImageError> {
        Ok(self.compile()?.rank(name))
    }

    /// Selects and orders channel names.
    ///
    /// Returns the positions (into `names`) of the channels to keep, in
    /// their new order. Channels are grouped by layer in order of first
    /// appearance; within a layer they follow the selector's pattern order,
    /// ties keep their original relative order. An empty selector keeps
    /// everything in place.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, ImageError> {
        if self.is_empty() {
            return Ok((0..names.len()).collect());
        }

        let matcher = self.compile()?;
        let mut layer_order: HashMap<&str, usize> = HashMap::new();
        let mut keyed = Vec::new();

        for (position, name) in names.iter().enumerate() {
            let name = name.as_ref();
            let next_layer = layer_order.len();
            let layer = *layer_order
                .entry(crate::channel::head(name))
                .or_insert(next_layer);
            if let Some(rank) = matcher.rank(name) {
                keyed.push((layer, rank, position));
            }
        }

        keyed.sort_unstable();
        Ok(keyed.into_iter().map(|(_, _, position)| position).collect())
    }

    fn compile(&self) -> Result<Matcher, ImageError> {
        match self.mode {
            SelectorMode::Fuzzy => Ok(Matcher::Fuzzy(
                self.patterns.iter().map(|p| p.to_lowercase()).collect(),
            )),
            SelectorMode::Regex => self
                .patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| ImageError::InvalidSelector {
                        pattern: p.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Matcher::Regex),
        }
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Splits selector text into trimmed, non-empty patterns.
pub fn split_patterns(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

enum Matcher {
    Fuzzy(Vec<String>),
    Regex(Vec<Regex>),
}

impl Matcher {
    fn rank(&self, name: &str) -> Option<usize> {
        match self {
            Matcher::Fuzzy(patterns) => {
                let name = name.to_lowercase();
                patterns.iter().position(|p| name.contains(p.as_str()))
            }
            Matcher::Regex(patterns) => patterns.iter().position(|re| re.is_match(name)),
        }
    }
}
