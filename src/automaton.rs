use std::fmt::Write;
use std::mem::size_of;

use tracing::trace;

use crate::regexp::{NodeId, Regexp, RegexpTree};

pub(crate) type StateId = usize;
pub(crate) type TransitionId = usize;

/// A single automaton state. States carry no data of their own beyond the
/// transitions touching them; their identity is their dense index in the
/// automaton's state vector, assigned in insertion order.
#[derive(Clone, Debug, Default)]
pub(crate) struct State {
    out: Vec<TransitionId>,
    inc: Vec<TransitionId>,
}

impl State {
    fn heap_bytes(&self) -> usize {
        (self.out.capacity() + self.inc.capacity()) * size_of::<TransitionId>()
    }
}

/// A directed edge between two states, labeled by a leaf node of the regexp
/// tree. The label's match predicate decides whether the edge can be taken
/// and how many bytes taking it consumes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Transition {
    pub(crate) from: StateId,
    pub(crate) label: NodeId,
    pub(crate) to: StateId,
}

/// The compiled transition graph for one pattern.
///
/// The graph holds `NodeId` handles into the pattern's tree rather than
/// owning label nodes itself, so the tree and the automaton can both live in
/// the façade for the pattern's whole lifetime.
#[derive(Debug)]
pub(crate) struct Automaton {
    states: Vec<State>,
    transitions: Vec<Transition>,
    entry_state: StateId,
    exit_state: StateId,
    max_transition_match_length: usize,
}

impl Automaton {
    fn new() -> Automaton {
        // State 0 doubles as the entry state and the initial exit state
        // until the first transition is registered.
        Automaton {
            states: vec![State::default()],
            transitions: Vec::new(),
            entry_state: 0,
            exit_state: 0,
            max_transition_match_length: 0,
        }
    }

    fn add_state(&mut self) -> StateId {
        self.states.push(State::default());
        self.states.len() - 1
    }

    #[inline]
    fn last_state(&self) -> StateId {
        self.states.len() - 1
    }

    fn add_transition(&mut self, from: StateId, label: NodeId, to: StateId, match_length: usize) {
        let id = self.transitions.len();
        self.transitions.push(Transition { from, label, to });
        self.states[from].out.push(id);
        self.states[to].inc.push(id);
        self.max_transition_match_length = self.max_transition_match_length.max(match_length);
        // The walk visits leaves in match order, so after it finishes this
        // holds the target of the last leaf's transition.
        self.exit_state = to;
    }

    #[inline]
    pub(crate) fn n_states(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn n_transitions(&self) -> usize {
        self.transitions.len()
    }

    #[inline]
    pub(crate) fn entry_state(&self) -> StateId {
        self.entry_state
    }

    #[inline]
    pub(crate) fn exit_state(&self) -> StateId {
        self.exit_state
    }

    /// The most bytes any single transition can consume. The simulation
    /// sizes its circular tick buffer from this.
    #[inline]
    pub(crate) fn max_transition_match_length(&self) -> usize {
        self.max_transition_match_length
    }

    #[inline]
    pub(crate) fn outgoing(&self, state: StateId) -> &[TransitionId] {
        &self.states[state].out
    }

    #[inline]
    pub(crate) fn incoming(&self, state: StateId) -> &[TransitionId] {
        &self.states[state].inc
    }

    #[inline]
    pub(crate) fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id]
    }

    pub(crate) fn heap_bytes(&self) -> usize {
        self.states.capacity() * size_of::<State>()
            + self.transitions.capacity() * size_of::<Transition>()
            + self.states.iter().map(State::heap_bytes).sum::<usize>()
    }

    /// Renders the graph in DOT syntax, labels included. Purely diagnostic;
    /// emitted at trace level when a pattern is compiled.
    pub(crate) fn dot(&self, tree: &RegexpTree) -> String {
        let mut out = String::new();
        out.push_str("digraph regexp {\n");
        out.push_str("  rankdir=\"LR\";\n");
        let _ = writeln!(out, "  // Entry state: {}", self.entry_state);
        let _ = writeln!(out, "  // Exit state: {}", self.exit_state);
        for t in &self.transitions {
            let label = match tree.node(t.label) {
                Regexp::MultipleChar(chars) => String::from_utf8_lossy(chars).into_owned(),
                Regexp::Period { .. } => ".".to_string(),
                Regexp::Epsilon => "epsilon".to_string(),
                _ => unreachable!("only leaves label transitions"),
            };
            let _ = writeln!(out, "  {} -> {} [label=\"{}\"];", t.from, t.to, label);
        }
        out.push_str("}\n");
        out
    }
}

/// Builds the automaton with a single post-order walk of the regexp tree.
///
/// The walk threads two optional arguments through the recursion: where the
/// sub-expression must start and where it must end. Leaves register one
/// transition between the two (allocating a fresh exit when none was
/// imposed), concatenations chain their children through fresh intermediate
/// states, and alternations fan every branch across one shared entry/exit
/// pair.
struct Builder<'t> {
    tree: &'t RegexpTree,
    automaton: Automaton,
}

impl<'t> Builder<'t> {
    fn new(tree: &'t RegexpTree) -> Builder<'t> {
        Builder {
            tree,
            automaton: Automaton::new(),
        }
    }

    fn build(mut self) -> Automaton {
        self.visit(self.tree.root(), None, None);
        trace!(
            states = self.automaton.n_states(),
            transitions = self.automaton.n_transitions(),
            max_match_length = self.automaton.max_transition_match_length(),
            "built automaton"
        );
        self.automaton
    }

    fn visit(&mut self, node: NodeId, entry: Option<StateId>, exit: Option<StateId>) {
        let entry = entry.unwrap_or_else(|| self.automaton.last_state());
        let tree = self.tree;
        match tree.node(node) {
            Regexp::Concatenation(children) => {
                let mut prev = entry;
                for (i, &child) in children.iter().enumerate() {
                    let next = if i + 1 == children.len() {
                        exit.unwrap_or_else(|| self.automaton.add_state())
                    } else {
                        self.automaton.add_state()
                    };
                    self.visit(child, Some(prev), Some(next));
                    prev = next;
                }
            }
            Regexp::Alternation(children) => {
                let exit = exit.unwrap_or_else(|| self.automaton.add_state());
                for &child in children {
                    self.visit(child, Some(entry), Some(exit));
                }
            }
            leaf => {
                debug_assert!(leaf.is_leaf());
                let exit = exit.unwrap_or_else(|| self.automaton.add_state());
                self.automaton
                    .add_transition(entry, node, exit, leaf.match_length());
            }
        }
    }
}

pub(crate) fn build_automaton(tree: &RegexpTree) -> Automaton {
    Builder::new(tree).build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser;
    use crate::Options;

    fn automaton(pattern: &str) -> (RegexpTree, Automaton) {
        let tree = parser::parse(pattern, Options::default()).unwrap();
        let automaton = build_automaton(&tree);
        (tree, automaton)
    }

    #[test]
    fn single_literal_is_one_transition() {
        let (_, a) = automaton("x");
        assert_eq!(a.n_states(), 2);
        assert_eq!(a.n_transitions(), 1);
        assert_eq!(a.entry_state(), 0);
        assert_eq!(a.exit_state(), 1);
        assert_eq!(a.max_transition_match_length(), 1);
        let t = a.transition(a.outgoing(0)[0]);
        assert_eq!((t.from, t.to), (0, 1));
    }

    #[test]
    fn literal_runs_match_as_one_chunk() {
        let (_, a) = automaton("abcdefghij");
        assert_eq!(a.n_states(), 2);
        assert_eq!(a.n_transitions(), 1);
        assert_eq!(a.max_transition_match_length(), 10);
    }

    #[test]
    fn long_runs_cap_at_the_chunk_limit() {
        let pattern = "abcdefghij".repeat(10);
        let (_, a) = automaton(&pattern);
        // 100 bytes split into 32 + 32 + 32 + 4, chained through fresh
        // intermediate states.
        assert_eq!(a.n_transitions(), 4);
        assert_eq!(a.n_states(), 5);
        assert_eq!(a.max_transition_match_length(), 32);
    }

    #[test]
    fn alternation_shares_entry_and_exit() {
        let (_, a) = automaton("abcd|efgh|ijkl");
        assert_eq!(a.n_states(), 2);
        assert_eq!(a.n_transitions(), 3);
        assert_eq!(a.max_transition_match_length(), 4);
        for &t in a.outgoing(0) {
            let t = a.transition(t);
            assert_eq!((t.from, t.to), (0, a.exit_state()));
        }
    }

    #[test]
    fn concatenation_threads_intermediates() {
        let (_, a) = automaton("(ab|cd)ef");
        // entry -> shared alternation exit -> exit
        assert_eq!(a.n_states(), 3);
        assert_eq!(a.n_transitions(), 3);
        assert_eq!(a.entry_state(), 0);
        assert_eq!(a.exit_state(), 2);
        assert_eq!(a.outgoing(0).len(), 2);
        assert_eq!(a.outgoing(1).len(), 1);
        assert_eq!(a.outgoing(2).len(), 0);
        assert_eq!(a.incoming(0).len(), 0);
        assert_eq!(a.incoming(1).len(), 2);
        assert_eq!(a.incoming(2).len(), 1);
    }

    #[test]
    fn dot_dump_lists_every_transition() {
        let (tree, a) = automaton("a.b");
        let dot = a.dot(&tree);
        assert!(dot.starts_with("digraph regexp {"));
        assert_eq!(dot.matches("->").count(), a.n_transitions());
    }

    #[test]
    fn heap_accounting_is_nonzero() {
        let (_, a) = automaton("abcd|efgh");
        assert!(a.heap_bytes() > 0);
    }
}
