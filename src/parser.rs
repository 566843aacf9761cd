use tracing::trace;

use crate::regexp::{NodeId, Regexp, RegexpTree, ESCAPABLE, MAX_MULTIPLE_CHAR_LENGTH};
use crate::{Error, Options, Result};

/// An entry on the parser's working stack.
///
/// The marker entries bound pending folds and are popped before the parse
/// finishes; only `Node` handles survive into the tree. Keeping markers out
/// of [`Regexp`] itself means a finished tree cannot contain one.
enum StackEntry {
    Node(NodeId),
    LeftParenthesis,
    AlternateBar,
}

/// Parse `pattern` into a regexp tree, or fail with the offset of the byte
/// that could not be handled.
pub(crate) fn parse(pattern: &str, options: Options) -> Result<RegexpTree> {
    Parser::new(pattern, options).parse()
}

/// Single-pass stack parser.
///
/// The main loop dispatches on the current byte. Literals accumulate into
/// the `MultipleChar` on top of the stack until it is full; `|` and `)` fold
/// the run since the most recent marker into a concatenation, and `)` (or
/// the end of the pattern) then folds the branches between bars into an
/// alternation.
struct Parser<'p> {
    pattern: &'p [u8],
    pos: usize,
    options: Options,
    nodes: Vec<Regexp>,
    stack: Vec<StackEntry>,
    // Stack offsets of the currently-open markers.
    open_parenthesis: Vec<usize>,
    alternate_bars: Vec<usize>,
}

impl<'p> Parser<'p> {
    fn new(pattern: &'p str, options: Options) -> Parser<'p> {
        Parser {
            pattern: pattern.as_bytes(),
            pos: 0,
            options,
            nodes: Vec::new(),
            stack: Vec::new(),
            open_parenthesis: Vec::new(),
            alternate_bars: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<RegexpTree> {
        while let Some(&byte) = self.pattern.get(self.pos) {
            match byte {
                b'(' => self.consume_left_parenthesis(),
                b')' => self.consume_right_parenthesis()?,
                b'|' => self.consume_alternate_bar(),
                b'\\' => self.consume_escape()?,
                b'.' => {
                    self.push_node(Regexp::Period {
                        posix: self.options.posix_period,
                    });
                    self.advance(1);
                }
                b'{' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "repetition",
                    })
                }
                b'*' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "Kleene operator",
                    })
                }
                b'+' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "`+` operator",
                    })
                }
                b'?' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "`?` operator",
                    })
                }
                b'^' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "`^` anchor",
                    })
                }
                b'$' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "`$` anchor",
                    })
                }
                b'[' => {
                    return Err(Error::Unsupported {
                        offset: self.pos,
                        construct: "character class",
                    })
                }
                b']' | b'}' => {
                    return Err(Error::Unexpected {
                        offset: self.pos,
                        found: byte as char,
                    })
                }
                _ => self.consume_char(byte),
            }
        }
        self.finish()
    }

    fn finish(mut self) -> Result<RegexpTree> {
        self.do_alternation();

        if !self.open_parenthesis.is_empty() {
            return Err(Error::MissingRightParenthesis {
                missing: self.open_parenthesis.len(),
            });
        }

        debug_assert!(self.stack.len() <= 1);
        match self.stack.pop() {
            Some(StackEntry::Node(root)) => {
                let tree = RegexpTree::new(self.nodes, root);
                trace!(tree = %tree, "parsed pattern");
                Ok(tree)
            }
            _ => Err(Error::Parser {
                offset: self.pos,
                message: "empty regular expression".to_string(),
            }),
        }
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.pattern.len());
        self.pos += n;
    }

    fn push_node(&mut self, regexp: Regexp) {
        let id = self.nodes.len();
        self.nodes.push(regexp);
        self.stack.push(StackEntry::Node(id));
    }

    fn pop_node(&mut self) -> NodeId {
        match self.stack.pop() {
            Some(StackEntry::Node(id)) => id,
            _ => unreachable!("expected a regexp on top of the stack"),
        }
    }

    fn consume_char(&mut self, byte: u8) {
        // Append to the run on top of the stack while it has room.
        if let Some(&StackEntry::Node(id)) = self.stack.last() {
            if let Regexp::MultipleChar(chars) = &mut self.nodes[id] {
                if chars.len() < MAX_MULTIPLE_CHAR_LENGTH {
                    chars.push(byte);
                    self.advance(1);
                    return;
                }
            }
        }
        self.push_node(Regexp::MultipleChar(vec![byte]));
        self.advance(1);
    }

    fn consume_escape(&mut self) -> Result<()> {
        self.advance(1);
        match self.pattern.get(self.pos).copied() {
            Some(byte) if ESCAPABLE.contains(&byte) => {
                self.consume_char(byte);
                Ok(())
            }
            Some(byte) => Err(Error::Unexpected {
                offset: self.pos,
                found: byte as char,
            }),
            None => Err(Error::Parser {
                offset: self.pos,
                message: "trailing backslash".to_string(),
            }),
        }
    }

    fn consume_left_parenthesis(&mut self) {
        self.open_parenthesis.push(self.stack.len());
        self.stack.push(StackEntry::LeftParenthesis);
        self.advance(1);
    }

    fn consume_right_parenthesis(&mut self) -> Result<()> {
        if self.open_parenthesis.is_empty() {
            return Err(Error::MissingLeftParenthesis { offset: self.pos });
        }

        self.do_alternation();
        match self.stack.last() {
            // Empty group: nothing was folded, drop the parenthesis.
            Some(StackEntry::LeftParenthesis) => self.pop_left_parenthesis(),
            _ => {
                let group = self.pop_node();
                self.pop_left_parenthesis();
                self.stack.push(StackEntry::Node(group));
            }
        }
        self.advance(1);
        Ok(())
    }

    fn consume_alternate_bar(&mut self) {
        self.do_concatenation();
        self.alternate_bars.push(self.stack.len());
        self.stack.push(StackEntry::AlternateBar);
        self.advance(1);
    }

    fn pop_left_parenthesis(&mut self) {
        match self.stack.pop() {
            Some(StackEntry::LeftParenthesis) => {}
            _ => unreachable!("expected a left parenthesis on top of the stack"),
        }
        debug_assert_eq!(self.open_parenthesis.last().copied(), Some(self.stack.len()));
        self.open_parenthesis.pop();
    }

    /// Stack offset of the first entry belonging to the current
    /// concatenation run: just past the topmost marker of either kind.
    fn concat_start(&self) -> usize {
        let paren = self.open_parenthesis.last().map_or(0, |&offset| offset + 1);
        let bar = self.alternate_bars.last().map_or(0, |&offset| offset + 1);
        paren.max(bar)
    }

    fn do_concatenation(&mut self) {
        let first = self.concat_start();
        let count = self.stack.len() - first;
        if count == 0 {
            return;
        }
        if self.options.parser_opt && count == 1 {
            // Avoid trivial concatenations of one element.
            return;
        }
        let children: Vec<NodeId> = self
            .stack
            .drain(first..)
            .map(|entry| match entry {
                StackEntry::Node(id) => id,
                _ => unreachable!("concatenation never folds across a marker"),
            })
            .collect();
        self.push_node(Regexp::Concatenation(children));
    }

    /// Fold everything down to the nearest open parenthesis (or the stack
    /// bottom) into a single alternation, consuming the bars in between.
    fn do_alternation(&mut self) {
        self.do_concatenation();

        let mut branches = Vec::new();
        loop {
            match self.stack.last() {
                None | Some(StackEntry::LeftParenthesis) => break,
                Some(StackEntry::AlternateBar) => {
                    self.stack.pop();
                    debug_assert_eq!(
                        self.alternate_bars.last().copied(),
                        Some(self.stack.len())
                    );
                    self.alternate_bars.pop();
                }
                Some(StackEntry::Node(_)) => {
                    let id = self.pop_node();
                    branches.push(id);
                }
            }
        }
        branches.reverse();

        if self.options.parser_opt && branches.len() <= 1 {
            // Avoid trivial alternations of zero or one element.
            if let Some(only) = branches.pop() {
                self.stack.push(StackEntry::Node(only));
            }
        } else {
            self.push_node(Regexp::Alternation(branches));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tree(pattern: &str) -> RegexpTree {
        parse(pattern, Options::default()).unwrap()
    }

    fn err(pattern: &str) -> Error {
        parse(pattern, Options::default()).unwrap_err()
    }

    #[test]
    fn literals_accumulate_into_one_run() {
        let t = tree("abc");
        assert_eq!(t.node(t.root()), &Regexp::MultipleChar(b"abc".to_vec()));
        assert_eq!(t.n_nodes(), 1);
    }

    #[test]
    fn full_runs_split_into_chunks() {
        let pattern: String = "a".repeat(MAX_MULTIPLE_CHAR_LENGTH + 1);
        let t = tree(&pattern);
        match t.node(t.root()) {
            Regexp::Concatenation(children) => {
                assert_eq!(children.len(), 2);
                match (t.node(children[0]), t.node(children[1])) {
                    (Regexp::MultipleChar(head), Regexp::MultipleChar(tail)) => {
                        assert_eq!(head.len(), MAX_MULTIPLE_CHAR_LENGTH);
                        assert_eq!(tail.len(), 1);
                    }
                    other => panic!("unexpected chunks: {:?}", other),
                }
            }
            other => panic!("unexpected root: {:?}", other),
        }
    }

    #[test]
    fn alternation_and_grouping_shapes() {
        assert_eq!(tree("ab|cd|ef").to_string(), "(ab|cd|ef)");
        assert_eq!(tree("(ab|cd)e").to_string(), "(ab|cd)e");
        assert_eq!(tree("a|b(c|d)e").to_string(), "(a|b(c|d)e)");
        // Redundant groups collapse away entirely.
        assert_eq!(tree("((ab))").to_string(), "ab");
        assert_eq!(tree("a()b").to_string(), "ab");
    }

    #[test]
    fn period_carries_the_posix_option() {
        let t = parse(".", Options::default().posix_period(true)).unwrap();
        assert_eq!(t.node(t.root()), &Regexp::Period { posix: true });
        let t = parse(".", Options::default()).unwrap();
        assert_eq!(t.node(t.root()), &Regexp::Period { posix: false });
    }

    #[test]
    fn escapes_become_literals() {
        let t = tree(r"a\.b");
        assert_eq!(t.node(t.root()), &Regexp::MultipleChar(b"a.b".to_vec()));
        let t = tree(r"\(\|\)\\");
        assert_eq!(t.node(t.root()), &Regexp::MultipleChar(b"(|)\\".to_vec()));
    }

    #[test]
    fn unsupported_operators_are_rejected_with_offsets() {
        assert_eq!(
            err("a*"),
            Error::Unsupported {
                offset: 1,
                construct: "Kleene operator"
            }
        );
        assert!(matches!(err("a+"), Error::Unsupported { offset: 1, .. }));
        assert!(matches!(err("a?"), Error::Unsupported { offset: 1, .. }));
        assert!(matches!(err("[abc]"), Error::Unsupported { offset: 0, .. }));
        assert!(matches!(err("^a"), Error::Unsupported { offset: 0, .. }));
        assert!(matches!(err("a$"), Error::Unsupported { offset: 1, .. }));
        assert!(matches!(err("a{2}"), Error::Unsupported { offset: 1, .. }));
    }

    #[test]
    fn stray_bytes_and_bad_escapes_are_unexpected() {
        assert_eq!(err("a]"), Error::Unexpected { offset: 1, found: ']' });
        assert_eq!(err("a}"), Error::Unexpected { offset: 1, found: '}' });
        assert_eq!(err(r"\a"), Error::Unexpected { offset: 1, found: 'a' });
        assert!(matches!(err("ab\\"), Error::Parser { offset: 3, .. }));
    }

    #[test]
    fn unbalanced_parentheses() {
        assert_eq!(err(")"), Error::MissingLeftParenthesis { offset: 0 });
        assert_eq!(err("ab)"), Error::MissingLeftParenthesis { offset: 2 });
        assert_eq!(err("("), Error::MissingRightParenthesis { missing: 1 });
        assert_eq!(err("((a)"), Error::MissingRightParenthesis { missing: 1 });
        assert_eq!(err("((a"), Error::MissingRightParenthesis { missing: 2 });
    }

    #[test]
    fn empty_patterns_are_rejected() {
        assert!(matches!(err(""), Error::Parser { .. }));
        assert!(matches!(err("()"), Error::Parser { .. }));
        assert!(matches!(err("(|)"), Error::Parser { .. }));
    }

    #[test]
    fn trivial_folds_survive_without_parser_opt() {
        let options = Options::default().parser_opt(false);
        let t = parse("a", options).unwrap();
        // A lone literal gets wrapped by both folds.
        match t.node(t.root()) {
            Regexp::Alternation(branches) => {
                assert_eq!(branches.len(), 1);
                assert!(matches!(t.node(branches[0]), Regexp::Concatenation(c) if c.len() == 1));
            }
            other => panic!("unexpected root: {:?}", other),
        }
        // The optimized tree stays shallow.
        let t = parse("a", Options::default()).unwrap();
        assert!(matches!(t.node(t.root()), Regexp::MultipleChar(_)));
    }
}
