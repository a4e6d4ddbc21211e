//! The crawler: the per-step driver behind [`PhraseGraph::parse`].
//!
//! Each step looks at the active branch and the unconsumed suffix of the
//! current row, collects candidate openers from the phrases allowed inside
//! the active branch, probes the active branch for its closer, and applies
//! the earliest of the competing events: open a child branch, close the
//! active branch, or swallow the whole remainder as a literal. Crossing a
//! row boundary resets the row viewpoint but keeps the absolute viewpoint
//! running, so coordinates stay valid across the whole input.
//!
//! Row exhaustion is signaled by `ControlFlow::Break` bubbling out of the
//! row-advance routine; the driver then anchors the tree with a terminal
//! boundary node on the root and hands it back. It never surfaces to
//! callers.

use crate::grammar::{Closing, Opening, PhraseGraph, PhraseId, Probe, Region, RootRegion};
use crate::tree::{Coords, NodeId, Tree};
use std::ops::ControlFlow;

pub(crate) fn parse(graph: &PhraseGraph, rows: Vec<String>) -> Tree {
    let tree = Tree::new(graph.phrase_names(), graph.root());
    let mut rows = rows.into_iter();
    let Some(first) = rows.next() else {
        // empty input: the root keeps only its opening node, no anchor
        return tree;
    };
    Crawler {
        graph,
        rest_rows: rows,
        row: first,
        row_n: 0,
        row_viewpoint: 0,
        abs_viewpoint: 0,
        tree,
        open: vec![OpenBranch {
            node: Tree::ROOT,
            phrase: graph.root(),
            region: Box::new(RootRegion),
        }],
    }
    .run()
}

/// A branch on the open stack: its tree node plus the behavior it carries
/// while open. The bottom entry is always the root.
struct OpenBranch {
    node: NodeId,
    phrase: PhraseId,
    region: Box<dyn Region>,
}

struct Crawler<'g> {
    graph: &'g PhraseGraph,
    rest_rows: std::vec::IntoIter<String>,
    row: String,
    row_n: usize,
    row_viewpoint: usize,
    abs_viewpoint: usize,
    tree: Tree,
    open: Vec<OpenBranch>,
}

impl Crawler<'_> {
    fn run(mut self) -> Tree {
        while self.step().is_continue() {}
        self.finish()
    }

    /// One event: open, close, or literal fill of the row remainder.
    fn step(&mut self) -> ControlFlow<()> {
        let (active_node, active_phrase) = {
            let active = self.open.last().expect("the root never leaves the stack");
            (active.node, active.phrase)
        };

        let mut candidates: Vec<(PhraseId, Opening)> = Vec::new();
        let closer = {
            let active = self.tree.node(active_node);
            let mut search = &self.row[self.row_viewpoint..];
            for &phrase in self.graph.children(active_phrase) {
                let probe = Probe {
                    remaining_row: search,
                    row_n: self.row_n,
                    row_viewpoint: self.row_viewpoint,
                    abs_viewpoint: self.abs_viewpoint,
                    active,
                };
                if let Some(opening) = self.graph.starts(phrase, &probe) {
                    search = opening.region.next_search_content(search);
                    candidates.push((phrase, opening));
                }
            }
            let probe = Probe {
                remaining_row: search,
                row_n: self.row_n,
                row_viewpoint: self.row_viewpoint,
                abs_viewpoint: self.abs_viewpoint,
                active,
            };
            self.open
                .last()
                .expect("the root never leaves the stack")
                .region
                .ends(&probe)
        };

        // earliest start wins; the first candidate keeps a tied lead
        let mut best: Option<(PhraseId, Opening)> = None;
        for candidate in candidates {
            match &best {
                Some((_, leader)) if leader.rel_start <= candidate.1.rel_start => {}
                _ => best = Some(candidate),
            }
        }

        match (best, closer) {
            (Some((_, opening)), Some(closing)) if closing.rel_start <= opening.rel_start => {
                self.close_active(closing)
            }
            (Some((phrase, opening)), _) => self.open_child(phrase, opening),
            (None, Some(closing)) => self.close_active(closing),
            (None, None) => self.fill_row(),
        }
    }

    fn coords(&self, rel_start: usize, rel_end: usize) -> Coords {
        Coords {
            match_rel_start: rel_start,
            match_rel_end: rel_end,
            row_n: self.row_n,
            row_viewpoint: self.row_viewpoint,
            abs_viewpoint: self.abs_viewpoint,
        }
    }

    /// Append the unmatched prefix before an event as a literal on the
    /// active branch.
    fn fill_prefix(&mut self, rel_start: usize) {
        if rel_start == 0 {
            return;
        }
        let coords = self.coords(0, rel_start);
        let content = self.row[self.row_viewpoint..self.row_viewpoint + rel_start].to_owned();
        let branch = self.open.last().expect("stack is never empty").node;
        let token = self.tree.push_token(branch, coords, content);
        let active = self.open.last_mut().expect("stack is never empty");
        active.region.on_extend(self.tree.token_mut(token));
    }

    fn open_child(&mut self, phrase: PhraseId, opening: Opening) -> ControlFlow<()> {
        let Opening {
            rel_start,
            rel_end,
            content,
            region,
        } = opening;
        debug_assert!(
            rel_start <= rel_end && self.row_viewpoint + rel_end <= self.row.len(),
            "opener match out of bounds"
        );
        self.fill_prefix(rel_start);
        let parent = self.open.last().expect("stack is never empty").node;
        let coords = self.coords(rel_start, rel_end);
        let (branch, start_node) = self.tree.push_branch(parent, phrase, coords, content);
        self.open.push(OpenBranch {
            node: branch,
            phrase,
            region,
        });
        let flow = self.advance(rel_end);
        let opened = self.open.last_mut().expect("just pushed");
        opened.region.on_start(self.tree.token_mut(start_node));
        flow
    }

    fn close_active(&mut self, closing: Closing) -> ControlFlow<()> {
        debug_assert!(
            closing.rel_start <= closing.rel_end
                && self.row_viewpoint + closing.rel_end <= self.row.len(),
            "closer match out of bounds"
        );
        self.fill_prefix(closing.rel_start);
        let mut finished = self.open.pop().expect("stack is never empty");
        debug_assert!(!self.open.is_empty(), "the root region never ends");
        let coords = self.coords(closing.rel_start, closing.rel_end);
        let node = self.tree.push_boundary(finished.node, coords, closing.content);
        let flow = self.advance(closing.rel_end);
        finished.region.on_end(self.tree.token_mut(node));
        flow
    }

    /// No event in this row: the whole remainder becomes a literal.
    fn fill_row(&mut self) -> ControlFlow<()> {
        let remainder = self.row.len() - self.row_viewpoint;
        let coords = self.coords(0, remainder);
        let content = self.row[self.row_viewpoint..].to_owned();
        let branch = self.open.last().expect("stack is never empty").node;
        let token = self.tree.push_token(branch, coords, content);
        let active = self.open.last_mut().expect("stack is never empty");
        active.region.on_extend(self.tree.token_mut(token));
        self.advance(remainder)
    }

    /// Move the cursor past `consumed` bytes of the remaining row, crossing
    /// into the next row when the current one is used up.
    fn advance(&mut self, consumed: usize) -> ControlFlow<()> {
        self.abs_viewpoint += consumed;
        let next = self.row_viewpoint + consumed;
        if next == self.row.len() {
            self.next_row()
        } else {
            self.row_viewpoint = next;
            ControlFlow::Continue(())
        }
    }

    fn next_row(&mut self) -> ControlFlow<()> {
        match self.rest_rows.next() {
            Some(row) => {
                self.row = row;
                self.row_n += 1;
                self.row_viewpoint = 0;
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        }
    }

    /// Anchor the tree: descend along trailing branches to the deepest last
    /// leaf and append a terminal boundary on the root at its end position.
    fn finish(mut self) -> Tree {
        let end = {
            let mut node = self
                .tree
                .root()
                .end_node()
                .expect("the root carries at least its opening node");
            while node.is_branch() {
                node = node
                    .end_node()
                    .expect("a branch carries at least its opening node");
            }
            *node.coords()
        };
        let anchor = Coords {
            match_rel_start: end.match_rel_end,
            match_rel_end: end.match_rel_end,
            row_n: end.row_n,
            row_viewpoint: end.row_viewpoint,
            abs_viewpoint: end.abs_viewpoint,
        };
        self.tree.push_boundary(Tree::ROOT, anchor, String::new());
        self.tree
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::{Closing, Opening, Phrase, PhraseGraph, Probe, Region};
    use crate::patterns::{Atom, Delimited};
    use crate::tree::{Coords, Node, TokenKind, TokenMut, Tree};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// The contract every parse result honors, whatever the grammar.
    fn check_invariants(tree: &Tree, rows: &[&str]) {
        // coverage: the tree loses nothing
        assert_eq!(tree.source(), rows.concat());

        // linear leaves come out in non-decreasing absolute order
        let mut prev = 0;
        for leaf in tree.root().linear() {
            assert!(leaf.coords().abs_start() >= prev);
            prev = leaf.coords().abs_start();
        }

        for node in tree.nodes() {
            // derived coordinates are viewpoint plus relative offset
            let c = node.coords();
            assert_eq!(c.abs_start(), c.abs_viewpoint + c.match_rel_start);
            assert_eq!(c.abs_end(), c.abs_viewpoint + c.match_rel_end);
            assert_eq!(c.start_in_row(), c.row_viewpoint + c.match_rel_start);
            assert_eq!(c.end_in_row(), c.row_viewpoint + c.match_rel_end);

            // every non-root node appears in its parent exactly once
            match node.parent() {
                Some(parent) => {
                    let hits = parent.children().filter(|c| c.id() == node.id()).count();
                    assert_eq!(hits, 1);
                }
                None => assert_eq!(node.id(), tree.root().id()),
            }

            // walking up terminates at the root
            let mut hops = 0;
            let mut cursor = node;
            while let Some(parent) = cursor.parent() {
                cursor = parent;
                hops += 1;
                assert!(hops <= tree.node_count(), "parent chain does not terminate");
            }
            assert_eq!(cursor.id(), tree.root().id());

            // children sit in source order
            if node.is_branch() {
                let mut prev = None;
                for child in node.children() {
                    let start = child.coords().abs_start();
                    if let Some(p) = prev {
                        assert!(start >= p);
                    }
                    prev = Some(start);
                }
            }
        }

        let root = tree.root();
        assert!(root.parent().is_none());
        let opening = root.start_node().unwrap();
        assert_eq!(opening.kind(), TokenKind::RootBoundary);
        assert_eq!(*opening.coords(), Coords::default());
        if !rows.is_empty() {
            let terminal = root.end_node().unwrap();
            assert_eq!(terminal.kind(), TokenKind::RootBoundary);
            assert_eq!(terminal.content(), "");
            assert_eq!(
                terminal.coords().match_rel_start,
                terminal.coords().match_rel_end
            );
        }
    }

    fn visible_leaves<'a>(root: Node<'a>) -> Vec<Node<'a>> {
        root.linear().filter(|t| !t.content().is_empty()).collect()
    }

    fn branches<'a>(tree: &'a Tree) -> Vec<Node<'a>> {
        tree.nodes()
            .filter(|n| n.kind() == TokenKind::Branch)
            .collect()
    }

    #[test]
    fn literal_rows_under_a_bare_root() {
        let graph = PhraseGraph::new();
        let rows = ["abc", "def"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let leaves = visible_leaves(tree.root());
        let texts: Vec<&str> = leaves.iter().map(|t| t.content()).collect();
        assert_eq!(texts, ["abc", "def"]);
        assert_eq!(leaves[0].coords().row_n, 0);
        assert_eq!(leaves[1].coords().row_n, 1);
        assert_eq!(leaves[1].coords().abs_start(), 3);

        // root{open, "abc", "def", terminal}
        assert_eq!(tree.root().child_count(), 4);
    }

    #[test]
    fn single_region_in_one_row() {
        let mut graph = PhraseGraph::new();
        let paren = graph.add("paren", Delimited::new(r"\(", r"\)").unwrap());
        graph.link(graph.root(), paren);
        let rows = ["(x)"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let root = tree.root();
        assert_eq!(root.child_count(), 3);
        let branch = root.child(1).unwrap();
        assert!(branch.is_branch());
        assert!(!branch.is_open());
        let parts: Vec<(&str, TokenKind)> = branch
            .children()
            .map(|c| (c.content(), c.kind()))
            .collect();
        assert_eq!(
            parts,
            [
                ("(", TokenKind::Boundary),
                ("x", TokenKind::Text),
                (")", TokenKind::Boundary),
            ]
        );
    }

    #[test]
    fn self_recursive_region_nests() {
        let mut graph = PhraseGraph::new();
        let paren = graph.add("paren", Delimited::new(r"\(", r"\)").unwrap());
        graph.link(graph.root(), paren);
        graph.link_self(paren);
        let rows = ["((y))"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let outer = tree.root().child(1).unwrap();
        assert_eq!(outer.phrase_name(), Some("paren"));
        assert!(!outer.is_open());
        // outer{open"(", inner, close")"}
        assert_eq!(outer.child_count(), 3);
        let inner = outer.child(1).unwrap();
        assert_eq!(inner.phrase_name(), Some("paren"));
        let inner_parts: Vec<&str> = inner.children().map(|c| c.content()).collect();
        assert_eq!(inner_parts, ["(", "y", ")"]);
    }

    #[test]
    fn region_spanning_two_rows() {
        let mut graph = PhraseGraph::new();
        let curly = graph.add("curly", Delimited::new(r"\{", "}").unwrap());
        graph.link(graph.root(), curly);
        let rows = ["a{b", "c}d"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let leaves = visible_leaves(tree.root());
        let got: Vec<(&str, usize, usize)> = leaves
            .iter()
            .map(|t| (t.content(), t.coords().row_n, t.coords().abs_start()))
            .collect();
        assert_eq!(
            got,
            [
                ("a", 0, 0),
                ("{", 0, 1),
                ("b", 0, 2),
                ("c", 1, 3),
                ("}", 1, 4),
                ("d", 1, 5),
            ]
        );
    }

    #[test]
    fn closer_wins_a_tie_with_an_opener() {
        let mut graph = PhraseGraph::new();
        // the outer region closes on the same "a" the child would open on
        let outer = graph.add("outer", Delimited::new(r"\[", "a").unwrap());
        let child = graph.add("child", Delimited::new("a", "z").unwrap());
        graph.link(graph.root(), outer);
        graph.link(outer, child);
        let rows = ["[ab"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let all = branches(&tree);
        assert_eq!(all.len(), 1);
        let outer_branch = all[0];
        assert_eq!(outer_branch.phrase_name(), Some("outer"));
        assert!(!outer_branch.is_open());
        // open "[" then close "a", no child in between
        assert_eq!(outer_branch.child_count(), 2);
        assert_eq!(outer_branch.end_node().unwrap().content(), "a");
    }

    struct Marker {
        mask: bool,
    }

    impl Phrase for Marker {
        fn starts(&self, probe: &Probe<'_>) -> Option<Opening> {
            let at = probe.remaining_row.find(">>>")?;
            Some(Opening {
                rel_start: at,
                rel_end: at + 3,
                content: ">>>".into(),
                region: Box::new(MarkerRegion { mask: self.mask }),
            })
        }
    }

    struct MarkerRegion {
        mask: bool,
    }

    impl Region for MarkerRegion {
        fn ends(&self, _probe: &Probe<'_>) -> Option<Closing> {
            None
        }

        fn next_search_content<'a>(&self, search: &'a str) -> &'a str {
            if self.mask {
                &search[..0]
            } else {
                search
            }
        }
    }

    #[test]
    fn masking_candidate_hides_the_row_from_siblings() {
        let rows = ["abc >>> def"];

        let mut graph = PhraseGraph::new();
        let marker = graph.add("marker", Marker { mask: true });
        let word = graph.add("word", Atom::new(r"\w+").unwrap());
        graph.link_all(graph.root(), [marker, word]);
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        // the word phrase never got to compete, even though "abc" starts
        // earlier than ">>>"
        let all = branches(&tree);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].phrase_name(), Some("marker"));
        assert_eq!(tree.root().child(1).unwrap().content(), "abc ");
    }

    #[test]
    fn without_masking_the_earlier_sibling_wins() {
        let rows = ["abc >>> def"];

        let mut graph = PhraseGraph::new();
        let marker = graph.add("marker", Marker { mask: false });
        let word = graph.add("word", Atom::new(r"\w+").unwrap());
        graph.link_all(graph.root(), [marker, word]);
        let tree = graph.parse(rows);

        let first = branches(&tree)[0];
        assert_eq!(first.phrase_name(), Some("word"));
        assert_eq!(first.content(), "abc");
    }

    #[test]
    fn empty_input_keeps_only_the_opening_node() {
        let graph = PhraseGraph::new();
        let tree = graph.parse(Vec::<String>::new());
        assert_eq!(tree.root().child_count(), 1);
        assert_eq!(
            tree.root().start_node().unwrap().kind(),
            TokenKind::RootBoundary
        );
        assert_eq!(tree.source(), "");
    }

    #[test]
    fn empty_rows_become_empty_literals() {
        let graph = PhraseGraph::new();
        let rows = ["a", "", "b"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let rows_seen: Vec<usize> = tree
            .root()
            .linear()
            .filter(|t| t.kind() == TokenKind::RootText)
            .map(|t| t.coords().row_n)
            .collect();
        assert_eq!(rows_seen, [0, 1, 2]);
    }

    #[test]
    fn unclosed_branch_stays_open() {
        let mut graph = PhraseGraph::new();
        let curly = graph.add("curly", Delimited::new(r"\{", "}").unwrap());
        graph.link(graph.root(), curly);
        let rows = ["a{bc"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let open: Vec<_> = tree.unclosed().collect();
        assert_eq!(open.len(), 1);
        assert!(open[0].is_open());
        assert_eq!(open[0].phrase_name(), Some("curly"));
        // the last child is literal filler, not a closing boundary
        assert_eq!(open[0].end_node().unwrap().kind(), TokenKind::Text);
    }

    #[test]
    fn strict_parse_reports_open_branches() {
        let mut graph = PhraseGraph::new();
        let curly = graph.add("curly", Delimited::new(r"\{", "}").unwrap());
        graph.link(graph.root(), curly);

        assert!(graph.parse_strict(["a{b}c"]).is_ok());

        let err = graph.parse_strict(["a{bc"]).unwrap_err();
        assert_eq!(err.to_string(), "unclosed phrase 'curly' opened at 0:1\n");
    }

    struct Once(Cell<bool>);

    impl Phrase for Once {
        fn starts(&self, _probe: &Probe<'_>) -> Option<Opening> {
            if self.0.get() {
                return None;
            }
            self.0.set(true);
            Some(Opening {
                rel_start: 0,
                rel_end: 0,
                content: String::new(),
                region: Box::new(Immediate),
            })
        }
    }

    struct Immediate;

    // default ends: zero-width close at offset 0
    impl Region for Immediate {}

    #[test]
    fn zero_width_open_and_close_form_an_empty_branch() {
        let mut graph = PhraseGraph::new();
        let empty = graph.add("empty", Once(Cell::new(false)));
        graph.link(graph.root(), empty);
        let rows = ["ab"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let branch = tree.root().child(1).unwrap();
        assert_eq!(branch.phrase_name(), Some("empty"));
        assert!(!branch.is_open());
        assert_eq!(branch.child_count(), 2);
        for boundary in branch.children() {
            assert_eq!(boundary.content(), "");
            assert_eq!(
                boundary.coords().match_rel_start,
                boundary.coords().match_rel_end
            );
        }
        assert_eq!(tree.source(), "ab");
    }

    #[test]
    fn coincident_candidates_keep_link_order() {
        let mut graph = PhraseGraph::new();
        let first = graph.add("first", Atom::new(r"\w+").unwrap());
        let second = graph.add("second", Atom::new("[a-z]+").unwrap());
        graph.link_all(graph.root(), [first, second]);
        let tree = graph.parse(["abc"]);

        assert_eq!(branches(&tree)[0].phrase_name(), Some("first"));
    }

    struct Bracketed {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Phrase for Bracketed {
        fn starts(&self, probe: &Probe<'_>) -> Option<Opening> {
            let at = probe.remaining_row.find('[')?;
            Some(Opening {
                rel_start: at,
                rel_end: at + 1,
                content: "[".into(),
                region: Box::new(BracketedRegion {
                    log: self.log.clone(),
                }),
            })
        }
    }

    struct BracketedRegion {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Region for BracketedRegion {
        fn ends(&self, probe: &Probe<'_>) -> Option<Closing> {
            let at = probe.remaining_row.find(']')?;
            Some(Closing {
                rel_start: at,
                rel_end: at + 1,
                content: "]".into(),
            })
        }

        fn on_start(&mut self, token: TokenMut<'_>) {
            self.log.borrow_mut().push(format!("start {}", token.content()));
        }

        fn on_extend(&mut self, mut token: TokenMut<'_>) {
            self.log.borrow_mut().push(format!("extend {}", token.content()));
            token.content_mut().make_ascii_uppercase();
        }

        fn on_end(&mut self, token: TokenMut<'_>) {
            self.log.borrow_mut().push(format!("end {}", token.content()));
        }
    }

    #[test]
    fn lifecycle_hooks_fire_in_order_and_may_rewrite_content() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut graph = PhraseGraph::new();
        let bracket = graph.add("bracket", Bracketed { log: log.clone() });
        graph.link(graph.root(), bracket);
        let tree = graph.parse(["x[ab]y"]);

        assert_eq!(*log.borrow(), ["start [", "extend ab", "end ]"]);
        // on_extend upper-cased the filler inside the brackets
        assert_eq!(tree.source(), "x[AB]y");
    }

    #[test]
    fn closing_hook_fires_even_at_end_of_input() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut graph = PhraseGraph::new();
        let bracket = graph.add("bracket", Bracketed { log: log.clone() });
        graph.link(graph.root(), bracket);
        graph.parse(["[ab]"]);

        assert_eq!(*log.borrow(), ["start [", "extend ab", "end ]"]);
    }

    #[test]
    fn terminal_anchor_sits_at_the_deepest_last_leaf() {
        let mut graph = PhraseGraph::new();
        let curly = graph.add("curly", Delimited::new(r"\{", "}").unwrap());
        graph.link(graph.root(), curly);
        // the region never closes, so the deepest open branch holds the
        // last leaf
        let tree = graph.parse(["a{bc"]);

        let terminal = tree.root().end_node().unwrap();
        assert_eq!(terminal.kind(), TokenKind::RootBoundary);
        assert_eq!(terminal.content(), "");
        assert_eq!(terminal.coords().abs_start(), 4);
        assert_eq!(terminal.coords().row_n, 0);
    }

    #[test]
    fn mutual_recursion_parses_alternating_regions() {
        let mut graph = PhraseGraph::new();
        let paren = graph.add("paren", Delimited::new(r"\(", r"\)").unwrap());
        let square = graph.add("square", Delimited::new(r"\[", "]").unwrap());
        graph.link_all(graph.root(), [paren, square]);
        graph.link_mutual(paren, square);
        let rows = ["([a(b)])"];
        let tree = graph.parse(rows);
        check_invariants(&tree, &rows);

        let outer = tree.root().child(1).unwrap();
        assert_eq!(outer.phrase_name(), Some("paren"));
        let middle = outer.child(1).unwrap();
        assert_eq!(middle.phrase_name(), Some("square"));
        let inner = middle.child(2).unwrap();
        assert_eq!(inner.phrase_name(), Some("paren"));
        assert!(!inner.is_open());
    }
}
