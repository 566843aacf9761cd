use std::ops::Range;

use thiserror::Error;
use tracing::trace;

mod automaton;
mod parser;
mod regexp;
mod simulation;

use crate::automaton::Automaton;
use crate::regexp::RegexpTree;
use crate::simulation::Simulation;

/// A compile-time failure, carrying the byte offset of the pattern byte
/// that could not be handled wherever one is known.
///
/// Matching itself cannot fail: a pattern that matches nowhere reports "no
/// match", not an error.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Parse failure with no more specific classification, e.g. an empty
    /// pattern or a trailing backslash.
    #[error("error parsing at index {offset}: {message}")]
    Parser { offset: usize, message: String },

    /// An operator this engine recognizes but deliberately does not
    /// implement (`*`, `+`, `?`, `^`, `$`, `[`, `{`). Rejecting these
    /// keeps the door open to supporting them later without changing the
    /// meaning of patterns that would otherwise treat them as literals.
    #[error("unsupported {construct} at index {offset}")]
    Unsupported {
        offset: usize,
        construct: &'static str,
    },

    /// A byte that cannot appear here: a bare `]` or `}`, or an escape of a
    /// character that does not need escaping.
    #[error("unexpected character `{found}` at index {offset}")]
    Unexpected { offset: usize, found: char },

    /// A `)` with no open group to close.
    #[error("unmatched closing parenthesis at index {offset}")]
    MissingLeftParenthesis { offset: usize },

    /// The pattern ended with open groups left to close.
    #[error("missing {missing} closing parenthesis")]
    MissingRightParenthesis { missing: usize },
}

impl Error {
    /// The byte offset within the pattern this error points at, when the
    /// failing byte is known.
    pub fn offset(&self) -> Option<usize> {
        match *self {
            Error::Parser { offset, .. }
            | Error::Unsupported { offset, .. }
            | Error::Unexpected { offset, .. }
            | Error::MissingLeftParenthesis { offset } => Some(offset),
            Error::MissingRightParenthesis { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Compilation options.
///
/// Both switches are set at compile time and fixed for the pattern's
/// lifetime; neither can change what texts a successfully compiled pattern
/// matches except as documented.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    pub(crate) posix_period: bool,
    pub(crate) parser_opt: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            posix_period: false,
            parser_opt: true,
        }
    }
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    /// When set, `.` matches every byte, including `\n` and `\r`. End of
    /// input is never matched either way; it is not a byte.
    pub fn posix_period(mut self, yes: bool) -> Options {
        self.posix_period = yes;
        self
    }

    /// Collapse alternations and concatenations of a single element while
    /// parsing (default on). Turning this off only makes the tree deeper;
    /// match results are unaffected.
    pub fn parser_opt(mut self, yes: bool) -> Options {
        self.parser_opt = yes;
        self
    }
}

/// A single match of a pattern in a text.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Match {
    /// The start offset of the match, inclusive.
    start: usize,
    /// The end offset of the match, exclusive.
    end: usize,
}

impl Match {
    pub(crate) fn new(start: usize, end: usize) -> Match {
        debug_assert!(start <= end);
        Match { start, end }
    }

    /// The starting byte position of the match.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// The ending byte position of the match, exclusive.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// The number of bytes the match spans.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if and only if this match is empty. The supported
    /// grammar has no zero-length matches, so this is false for every match
    /// the engine produces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The match as a half-open byte range, for indexing into the text.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A compiled pattern: the parsed tree and the automaton built from it.
///
/// Compilation happens in the constructor; a `Pattern` that exists is
/// always ready to match. All match methods take `&self` and build their
/// own scratch state, so a pattern can be shared freely across threads and
/// used from several at once.
///
/// The supported surface is deliberately small: literal bytes, `.`, `(...)`
/// for grouping, `|` for alternation, and backslash escapes for the
/// metacharacters. Texts are byte slices and all reported positions are
/// byte offsets; a `.` consumes exactly one byte, so offsets are not
/// guaranteed to fall on UTF-8 character boundaries.
#[derive(Debug)]
pub struct Pattern {
    pattern: String,
    tree: RegexpTree,
    automaton: Automaton,
}

impl Pattern {
    /// Compile `pattern` with default options.
    pub fn new(pattern: &str) -> Result<Pattern> {
        Pattern::with_options(pattern, Options::default())
    }

    /// Compile `pattern` with explicit options.
    pub fn with_options(pattern: &str, options: Options) -> Result<Pattern> {
        let tree = parser::parse(pattern, options)?;
        let automaton = automaton::build_automaton(&tree);
        trace!(
            pattern = pattern,
            tree = %tree,
            automaton = %automaton.dot(&tree),
            "compiled pattern"
        );
        Ok(Pattern {
            pattern: pattern.to_string(),
            tree,
            automaton,
        })
    }

    /// The source pattern this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Approximate heap usage of the compiled pattern, in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.pattern.capacity() + self.tree.heap_bytes() + self.automaton.heap_bytes()
    }

    fn simulation<'a>(&'a self, text: &'a [u8]) -> Simulation<'a> {
        Simulation::new(&self.tree, &self.automaton, text)
    }

    /// Does the pattern match `text` in its entirety?
    pub fn is_full_match(&self, text: &[u8]) -> bool {
        self.simulation(text).match_full()
    }

    /// The occurrence with the earliest end position, or `None`. Cheaper
    /// than [`Pattern::find_first`] because the search stops the moment any
    /// occurrence completes; when branches of different lengths overlap,
    /// the occurrence reported here may start later and end earlier than
    /// the one `find_first` reports.
    pub fn find_anywhere(&self, text: &[u8]) -> Option<Match> {
        self.simulation(text).match_anywhere()
    }

    /// The occurrence with the earliest start position, extended to the
    /// latest end reachable from that start, or `None`.
    pub fn find_first(&self, text: &[u8]) -> Option<Match> {
        self.simulation(text).match_first()
    }

    /// Iterator over every non-overlapping occurrence, earliest first.
    /// Each occurrence is found like [`Pattern::find_first`], restarted at
    /// the previous occurrence's end.
    pub fn find_iter<'p, 't>(&'p self, text: &'t [u8]) -> FindIter<'p, 't> {
        FindIter {
            pattern: self,
            text,
            at: 0,
        }
    }

    /// Every non-overlapping occurrence, collected.
    pub fn find_all(&self, text: &[u8]) -> Vec<Match> {
        self.find_iter(text).collect()
    }
}

/// Iterator over successive non-overlapping matches, created by
/// [`Pattern::find_iter`]. Each step runs a fresh simulation over the
/// remaining tail of the text.
pub struct FindIter<'p, 't> {
    pattern: &'p Pattern,
    text: &'t [u8],
    at: usize,
}

impl<'p, 't> Iterator for FindIter<'p, 't> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        let tail = &self.text[self.at..];
        let m = Simulation::new(&self.pattern.tree, &self.pattern.automaton, tail).match_first()?;
        // The grammar admits no zero-length matches, so the iterator always
        // advances.
        debug_assert!(m.len() > 0);
        let m = Match::new(self.at + m.start(), self.at + m.end());
        self.at = m.end();
        Some(m)
    }
}
