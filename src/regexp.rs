use std::fmt;

/// Handle to a node stored in a [`RegexpTree`] arena.
///
/// The automaton references transition labels through these handles instead
/// of borrowing nodes directly, so the tree and the automaton can live side
/// by side in the same owner.
pub(crate) type NodeId = usize;

/// A `MultipleChar` holds at most this many bytes. Longer literal runs are
/// split into a concatenation of full chunks by the parser.
pub(crate) const MAX_MULTIPLE_CHAR_LENGTH: usize = 32;

/// Bytes that may follow a backslash in a pattern, and that are re-escaped
/// when rendering a tree back to pattern syntax.
pub(crate) const ESCAPABLE: &[u8] = b"$()*+.[]^{|}\\";

/// A single node of the regexp tree.
///
/// `MultipleChar`, `Period` and `Epsilon` are leaves: they carry a match
/// predicate and are the only kinds allowed to label automaton transitions.
/// `Concatenation` and `Alternation` are flow nodes: they only wire automaton
/// states together. Parser markers are deliberately not represented here;
/// they live in the parser's own stack-entry type and can never leak into a
/// finished tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Regexp {
    /// A run of 1 to `MAX_MULTIPLE_CHAR_LENGTH` literal bytes matched
    /// contiguously, consumed by a single transition.
    MultipleChar(Vec<u8>),
    /// Single-byte wildcard. Excludes `\n` and `\r` unless `posix` is set,
    /// in which case every byte matches. End of input is not a byte and is
    /// handled by the simulation's bounds, not here.
    Period { posix: bool },
    /// Non-consuming placeholder. The parser never produces one, but it is
    /// a valid transition label.
    Epsilon,
    /// Two or more children matched in sequence.
    Concatenation(Vec<NodeId>),
    /// Two or more branches, any of which may match.
    Alternation(Vec<NodeId>),
}

impl Regexp {
    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        match self {
            Regexp::MultipleChar(_) | Regexp::Period { .. } | Regexp::Epsilon => true,
            Regexp::Concatenation(_) | Regexp::Alternation(_) => false,
        }
    }

    /// The number of bytes a successful match of this leaf consumes.
    pub(crate) fn match_length(&self) -> usize {
        match self {
            Regexp::MultipleChar(chars) => chars.len(),
            Regexp::Period { .. } => 1,
            Regexp::Epsilon => 0,
            Regexp::Concatenation(_) | Regexp::Alternation(_) => {
                unreachable!("flow regexps do not consume input")
            }
        }
    }

    /// Try to match this leaf against `text` at `pos`. Returns the number of
    /// bytes consumed, or `None` when the leaf does not match there.
    pub(crate) fn match_at(&self, text: &[u8], pos: usize) -> Option<usize> {
        match self {
            Regexp::MultipleChar(chars) => {
                if text[pos..].starts_with(chars) {
                    Some(chars.len())
                } else {
                    None
                }
            }
            Regexp::Period { posix } => {
                let byte = *text.get(pos)?;
                if *posix || (byte != b'\n' && byte != b'\r') {
                    Some(1)
                } else {
                    None
                }
            }
            Regexp::Epsilon => Some(0),
            Regexp::Concatenation(_) | Regexp::Alternation(_) => {
                unreachable!("flow regexps do not consume input")
            }
        }
    }

    fn heap_bytes(&self) -> usize {
        match self {
            Regexp::MultipleChar(chars) => chars.capacity(),
            Regexp::Period { .. } | Regexp::Epsilon => 0,
            Regexp::Concatenation(children) | Regexp::Alternation(children) => {
                children.capacity() * std::mem::size_of::<NodeId>()
            }
        }
    }
}

/// Arena owning every node of a parsed pattern, plus the root handle.
///
/// Destroying the tree frees all nodes at once; nothing else ever owns one.
#[derive(Debug)]
pub(crate) struct RegexpTree {
    nodes: Vec<Regexp>,
    root: NodeId,
}

impl RegexpTree {
    pub(crate) fn new(nodes: Vec<Regexp>, root: NodeId) -> RegexpTree {
        debug_assert!(root < nodes.len());
        RegexpTree { nodes, root }
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Regexp {
        &self.nodes[id]
    }

    #[inline]
    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn heap_bytes(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Regexp>()
            + self.nodes.iter().map(Regexp::heap_bytes).sum::<usize>()
    }

    fn fmt_node(&self, id: NodeId, f: &mut fmt::Formatter) -> fmt::Result {
        match self.node(id) {
            Regexp::MultipleChar(chars) => {
                for &byte in chars {
                    if ESCAPABLE.contains(&byte) {
                        write!(f, "\\")?;
                    }
                    if byte.is_ascii_graphic() || byte == b' ' {
                        write!(f, "{}", byte as char)?;
                    } else {
                        write!(f, "\\x{:02x}", byte)?;
                    }
                }
                Ok(())
            }
            Regexp::Period { .. } => write!(f, "."),
            Regexp::Epsilon => Ok(()),
            Regexp::Concatenation(children) => {
                for &child in children {
                    self.fmt_node(child, f)?;
                }
                Ok(())
            }
            Regexp::Alternation(children) => {
                write!(f, "(")?;
                for (i, &child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    self.fmt_node(child, f)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Renders the tree in canonical pattern syntax: literals re-escaped,
/// alternations parenthesized.
impl fmt::Display for RegexpTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_node(self.root, f)
    }
}
