use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use regex::bytes::{Regex, RegexBuilder};

use crate::error::{Error, Result};
use crate::pattern::flags::PatternFlags;

/// Most capture groups a pattern may define, group 0 included.
pub const MAX_CAPTURE_GROUPS: usize = 32;

/// Cache key: pattern text plus compile options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternKey {
    pub pattern: String,
    pub flags: PatternFlags,
}

/// Borrowed view of a [`PatternKey`].
///
/// `PatternKey` borrows as `dyn PatternKeyView`, so a `(&str, PatternFlags)`
/// pair can probe the cache without allocating the owned key.
pub trait PatternKeyView {
    fn view(&self) -> (&str, PatternFlags);
}

impl PatternKeyView for PatternKey {
    fn view(&self) -> (&str, PatternFlags) {
        (&self.pattern, self.flags)
    }
}

impl PatternKeyView for (&str, PatternFlags) {
    fn view(&self) -> (&str, PatternFlags) {
        (self.0, self.1)
    }
}

impl<'a> Borrow<dyn PatternKeyView + 'a> for PatternKey {
    fn borrow(&self) -> &(dyn PatternKeyView + 'a) {
        self
    }
}

// Owned and borrowed forms must hash identically.
impl Hash for PatternKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.view().hash(state);
    }
}

impl Hash for dyn PatternKeyView + '_ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.view().hash(state);
    }
}

impl PartialEq for dyn PatternKeyView + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.view() == other.view()
    }
}

impl Eq for dyn PatternKeyView + '_ {}

impl PatternKey {
    pub fn new(pattern: impl Into<String>, flags: PatternFlags) -> Self {
        Self {
            pattern: pattern.into(),
            flags,
        }
    }
}

/// A compiled, immutable matcher. Shared between threads via `Arc`.
#[derive(Debug)]
pub struct CompiledPattern {
    key: PatternKey,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles `pattern`, refusing more than [`MAX_CAPTURE_GROUPS`] groups.
    pub fn compile(pattern: &str, flags: PatternFlags) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains(PatternFlags::CASELESS))
            .multi_line(flags.contains(PatternFlags::MULTILINE))
            .dot_matches_new_line(flags.contains(PatternFlags::DOTALL))
            .ignore_whitespace(flags.contains(PatternFlags::EXTENDED))
            .build()
            .map_err(|err| Error::compile(pattern, err))?;

        if regex.captures_len() > MAX_CAPTURE_GROUPS {
            return Err(Error::compile(
                pattern,
                format!(
                    "{} capture groups, at most {} allowed",
                    regex.captures_len() - 1,
                    MAX_CAPTURE_GROUPS - 1
                ),
            ));
        }

        Ok(Self {
            key: PatternKey::new(pattern, flags),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.key.pattern
    }

    pub fn flags(&self) -> PatternFlags {
        self.key.flags
    }

    pub fn key(&self) -> &PatternKey {
        &self.key
    }

    /// Number of capture slots, group 0 included.
    pub fn capture_slots(&self) -> usize {
        self.regex.captures_len()
    }

    pub fn is_match(&self, subject: &[u8]) -> bool {
        self.captures(subject).is_some()
    }

    /// Byte offsets of the leftmost match and its groups.
    pub fn captures(&self, subject: &[u8]) -> Option<CaptureSet> {
        let caps = self.regex.captures(subject)?;
        // Leftmost-first search: if any match starts at 0 it is the one found.
        if self.key.flags.contains(PatternFlags::ANCHORED) && caps.get(0)?.start() != 0 {
            return None;
        }
        let spans = (0..self.regex.captures_len())
            .map(|i| caps.get(i).map(|m| m.range()))
            .collect();
        Some(CaptureSet { spans })
    }
}

/// Capture offsets of a single match. Slot 0 is the whole match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSet {
    spans: Vec<Option<Range<usize>>>,
}

impl CaptureSet {
    /// Span of group `index`, or `None` if it did not participate.
    pub fn get(&self, index: usize) -> Option<Range<usize>> {
        self.spans.get(index).cloned().flatten()
    }

    pub fn whole(&self) -> Option<Range<usize>> {
        self.get(0)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Range<usize>>> + '_ {
        self.spans.iter().cloned()
    }

    /// Slices `subject` by group `index`.
    pub fn slice<'s>(&self, subject: &'s [u8], index: usize) -> Option<&'s [u8]> {
        subject.get(self.get(index)?)
    }
}
