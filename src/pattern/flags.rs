use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::Error;

bitflags! {
    /// Compile options for a pattern; part of the cache key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PatternFlags: u8 {
        /// `i`: case-insensitive matching.
        const CASELESS  = 1 << 0;
        /// `m`: `^` and `$` match at line boundaries.
        const MULTILINE = 1 << 1;
        /// `s`: `.` matches `\n`.
        const DOTALL    = 1 << 2;
        /// `x`: whitespace and `#` comments in the pattern are ignored.
        const EXTENDED  = 1 << 3;
        /// `a`: the match must start at the beginning of the subject.
        const ANCHORED  = 1 << 4;
    }
}

const LETTERS: [(char, PatternFlags); 5] = [
    ('i', PatternFlags::CASELESS),
    ('m', PatternFlags::MULTILINE),
    ('s', PatternFlags::DOTALL),
    ('x', PatternFlags::EXTENDED),
    ('a', PatternFlags::ANCHORED),
];

impl PatternFlags {
    /// Parses an option string such as `"im"`. Repeated letters are allowed.
    pub fn parse(options: &str) -> Result<Self, Error> {
        options.chars().try_fold(PatternFlags::empty(), |acc, c| {
            LETTERS
                .iter()
                .find(|(letter, _)| *letter == c)
                .map(|(_, flag)| acc | *flag)
                .ok_or_else(|| Error::Compile {
                    pattern: String::new(),
                    reason: format!("unknown pattern option `{c}` in \"{options}\""),
                })
        })
    }
}

impl FromStr for PatternFlags {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PatternFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (letter, flag) in LETTERS {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}
