use tracing::trace;

use crate::automaton::{Automaton, StateId};
use crate::regexp::RegexpTree;
use crate::Match;

/// A position in the subject text, as stored in simulation cells.
pub(crate) type Pos = usize;

/// Marks a cell as unreachable. Doubles as infinity in the minimum
/// comparisons that keep the earliest origin, so merging never needs a
/// special case for empty cells.
pub(crate) const INVALID_POS: Pos = usize::MAX;

/// One walk of an automaton over one text.
///
/// The simulation tracks, per state, the earliest text position from which
/// that state is reachable. Because a `MultipleChar` transition consumes
/// several bytes in a single step, reachability is recorded per *tick*: a
/// logical time offset, in bytes, relative to the current position. The
/// cells live in a flat `n_ticks x n_states` buffer addressed through a
/// rotating tick offset, so advancing one byte is a modular increment
/// instead of a memmove; the buffer needs `max_transition_match_length + 1`
/// ticks so the longest transition can deposit its effect in the future
/// without wrapping onto the present.
///
/// `cell(state, tick) = p` means: the automaton can be in `state` once
/// `current_pos + tick` bytes are consumed, having started matching at
/// position `p`. When two paths land on the same cell the smaller origin
/// wins, which is what makes the first-match search leftmost.
///
/// A simulation is built fresh for every match call and discarded after it;
/// it borrows the pattern's tree and automaton and owns only its scratch
/// cells.
pub(crate) struct Simulation<'a> {
    tree: &'a RegexpTree,
    automaton: &'a Automaton,
    text: &'a [u8],
    n_states: usize,
    n_ticks: usize,
    current_tick: usize,
    current_pos: usize,
    cells: Vec<Pos>,
}

impl<'a> Simulation<'a> {
    pub(crate) fn new(tree: &'a RegexpTree, automaton: &'a Automaton, text: &'a [u8]) -> Simulation<'a> {
        let n_states = automaton.n_states();
        let n_ticks = automaton.max_transition_match_length() + 1;
        Simulation {
            tree,
            automaton,
            text,
            n_states,
            n_ticks,
            current_tick: 0,
            current_pos: 0,
            cells: vec![INVALID_POS; n_ticks * n_states],
        }
    }

    #[inline]
    fn cell_offset(&self, state: StateId, tick: usize) -> usize {
        debug_assert!(tick < self.n_ticks);
        ((self.current_tick + tick) % self.n_ticks) * self.n_states + state
    }

    #[inline]
    fn cell(&self, state: StateId, tick: usize) -> Pos {
        self.cells[self.cell_offset(state, tick)]
    }

    #[inline]
    fn merge_cell(&mut self, state: StateId, tick: usize, origin: Pos) {
        let offset = self.cell_offset(state, tick);
        let cell = &mut self.cells[offset];
        *cell = (*cell).min(origin);
    }

    /// Mark the entry state reachable at the current position, unless an
    /// earlier origin already claimed it.
    fn seed_entry(&mut self) {
        let offset = self.cell_offset(self.automaton.entry_state(), 0);
        if self.cells[offset] == INVALID_POS {
            self.cells[offset] = self.current_pos;
        }
    }

    #[inline]
    fn exit_origin(&self) -> Pos {
        self.cell(self.automaton.exit_state(), 0)
    }

    /// Try every outgoing transition of every state live at the present
    /// tick. A successful transition of length `n` lands `n` bytes in the
    /// future, carrying its origin along; the earliest origin wins when
    /// paths merge.
    fn step(&mut self) {
        let automaton = self.automaton;
        let tree = self.tree;
        for state in 0..self.n_states {
            let origin = self.cell(state, 0);
            if origin == INVALID_POS {
                continue;
            }
            for &id in automaton.outgoing(state) {
                let transition = automaton.transition(id);
                let label = tree.node(transition.label);
                if let Some(consumed) = label.match_at(self.text, self.current_pos) {
                    self.merge_cell(transition.to, consumed, origin);
                }
            }
        }
    }

    /// Consume one byte: drop the present tick (its states have all been
    /// stepped), rotate it to the far future, and move the position.
    fn advance(&mut self) {
        self.invalidate_tick(0);
        self.current_tick = (self.current_tick + 1) % self.n_ticks;
        debug_assert!(self.current_pos < self.text.len());
        self.current_pos += 1;
    }

    fn invalidate_tick(&mut self, tick: usize) {
        let t = (self.current_tick + tick) % self.n_ticks;
        for cell in &mut self.cells[t * self.n_states..(t + 1) * self.n_states] {
            *cell = INVALID_POS;
        }
    }

    /// Kill every pending path that started after `start`. Once a match
    /// starting at `start` is known, those paths can only produce matches
    /// that lose to it.
    fn invalidate_origins_after(&mut self, start: Pos) {
        for cell in &mut self.cells {
            if *cell != INVALID_POS && *cell > start {
                *cell = INVALID_POS;
            }
        }
    }

    fn is_dead(&self) -> bool {
        self.cells.iter().all(|&cell| cell == INVALID_POS)
    }

    /// Does the automaton consume the whole text, entry to exit?
    pub(crate) fn match_full(&mut self) -> bool {
        self.seed_entry();
        while self.current_pos < self.text.len() {
            self.step();
            self.advance();
        }
        self.exit_origin() != INVALID_POS
    }

    /// Find the occurrence with the earliest end: seed the entry state at
    /// every position and stop as soon as the exit state lights up.
    pub(crate) fn match_anywhere(&mut self) -> Option<Match> {
        loop {
            self.seed_entry();
            let origin = self.exit_origin();
            if origin != INVALID_POS {
                trace!(start = origin, end = self.current_pos, "match");
                return Some(Match::new(origin, self.current_pos));
            }
            if self.current_pos == self.text.len() {
                return None;
            }
            self.step();
            self.advance();
        }
    }

    /// Find the occurrence with the earliest start, preferring the latest
    /// end for that start.
    ///
    /// Runs like `match_anywhere` until the exit state first lights up.
    /// That candidate need not be final: a path seeded earlier may still be
    /// in flight and reach the exit later, and the winning start's own match
    /// may extend further right through a longer alternation branch. So the
    /// search keeps going without planting new seeds; whenever the exit is
    /// live, its origin merges into the start (earliest wins) and the end
    /// advances to the current position, until the text or the pending
    /// paths run out.
    pub(crate) fn match_first(&mut self) -> Option<Match> {
        let mut start = INVALID_POS;
        let mut end = INVALID_POS;
        loop {
            if start == INVALID_POS {
                self.seed_entry();
            }
            let origin = self.exit_origin();
            if origin != INVALID_POS {
                if start == INVALID_POS {
                    trace!(start = origin, end = self.current_pos, "first candidate");
                    self.invalidate_origins_after(origin);
                }
                start = start.min(origin);
                end = self.current_pos;
            }
            if self.current_pos == self.text.len() {
                break;
            }
            if start != INVALID_POS && self.is_dead() {
                break;
            }
            self.step();
            self.advance();
        }
        if start == INVALID_POS {
            None
        } else {
            Some(Match::new(start, end))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::automaton::build_automaton;
    use crate::parser;
    use crate::Options;

    struct Compiled {
        tree: RegexpTree,
        automaton: Automaton,
    }

    fn compile(pattern: &str) -> Compiled {
        compile_with(pattern, Options::default())
    }

    fn compile_with(pattern: &str, options: Options) -> Compiled {
        let tree = parser::parse(pattern, options).unwrap();
        let automaton = build_automaton(&tree);
        Compiled { tree, automaton }
    }

    impl Compiled {
        fn full(&self, text: &[u8]) -> bool {
            Simulation::new(&self.tree, &self.automaton, text).match_full()
        }

        fn anywhere(&self, text: &[u8]) -> Option<(usize, usize)> {
            Simulation::new(&self.tree, &self.automaton, text)
                .match_anywhere()
                .map(|m| (m.start(), m.end()))
        }

        fn first(&self, text: &[u8]) -> Option<(usize, usize)> {
            Simulation::new(&self.tree, &self.automaton, text)
                .match_first()
                .map(|m| (m.start(), m.end()))
        }
    }

    #[test]
    fn full_match_consumes_everything() {
        let p = compile("x");
        assert!(p.full(b"x"));
        assert!(!p.full(b"y"));
        assert!(!p.full(b"xxxxxx"));
        assert!(!p.full(b""));
    }

    #[test]
    fn multi_byte_transitions_cross_several_positions() {
        let p = compile("abcdefghij");
        assert!(p.full(b"abcdefghij"));
        assert!(!p.full(b"abcdefghij_klmnop"));
        assert_eq!(p.first(b"_abcdefghij_"), Some((1, 11)));
    }

    #[test]
    fn period_matches_any_byte_but_newlines() {
        let p = compile("abcde.ghij");
        assert!(p.full(b"abcdefghij"));
        assert!(p.full(b"abcdeXghij"));
        assert!(!p.full(b"abcde\nghij"));

        let p = compile("a.b");
        assert!(!p.full(b"a\nb"));
        assert!(!p.full(b"a\rb"));

        let p = compile_with("a.b", Options::default().posix_period(true));
        assert!(p.full(b"a\nb"));
        assert!(p.full(b"a\rb"));
    }

    #[test]
    fn anywhere_stops_at_the_earliest_end() {
        let p = compile("abcd");
        assert_eq!(p.anywhere(b"__abcd__"), Some((2, 6)));
        assert_eq!(p.anywhere(b"abcdabcd"), Some((0, 4)));
        assert_eq!(p.anywhere(b"__abXd__"), None);
    }

    #[test]
    fn first_prefers_the_earliest_start() {
        let p = compile("(abcX|abcd)");
        assert_eq!(p.first(b"..abcd.."), Some((2, 6)));
        let p = compile("(abcd|abcX)");
        assert_eq!(p.first(b"..abcd.."), Some((2, 6)));
    }

    #[test]
    fn first_extends_to_the_latest_end_for_the_winning_start() {
        // The short branch fires first, at position 3, with a later start;
        // the long branch then reaches the exit at position 4 with start 0
        // and must win.
        let p = compile("a..b|01");
        assert_eq!(p.first(b"a01b"), Some((0, 4)));
        let p = compile("01|a..b");
        assert_eq!(p.first(b"a01b"), Some((0, 4)));
    }

    #[test]
    fn first_keeps_the_candidate_when_nothing_extends_it() {
        let p = compile("abcd|bc");
        assert_eq!(p.first(b"xbcd"), Some((1, 3)));
        assert_eq!(p.first(b"abcd"), Some((0, 4)));
    }

    #[test]
    fn no_match_reports_none_not_an_error() {
        let p = compile("abcd");
        assert_eq!(p.first(b""), None);
        assert_eq!(p.first(b"ab"), None);
        assert_eq!(p.anywhere(b"zzzz"), None);
    }
}
