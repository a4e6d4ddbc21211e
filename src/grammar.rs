//! Phrase graphs: the grammar side of a parse.
//!
//! A [`PhraseGraph`] is an arena of phrases addressed by [`PhraseId`]. Each
//! phrase carries a diagnostic name, an optional matcher implementing the
//! [`Phrase`] trait, and the set of phrases allowed to open inside it. Edges
//! are plain id pairs, so self-recursion and mutual recursion are ordinary
//! graph shapes; the crawler only ever consults one phrase's children per
//! step, never the transitive graph.
//!
//! The graph is built once, before parsing, and is read-only while the
//! crawler runs.

use crate::crawler;
use crate::tree::{Node, TokenMut, Tree};
use std::fmt;

/// Stable index of a phrase in its [`PhraseGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhraseId(pub(crate) u32);

impl PhraseId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Everything a matcher may look at when probing for an opener or a closer.
///
/// `remaining_row` is the unconsumed suffix of the current row; when an
/// earlier candidate in the same step narrowed the search via
/// [`Region::next_search_content`], later probes see the narrowed prefix
/// instead. The viewpoints locate the suffix within the row and within the
/// concatenated input, and `active` is the branch a candidate would be
/// appended to.
pub struct Probe<'a> {
    /// Unconsumed suffix of the current row, possibly narrowed.
    pub remaining_row: &'a str,
    /// Zero-based row index.
    pub row_n: usize,
    /// Offset of `remaining_row` within its full row.
    pub row_viewpoint: usize,
    /// Offset of `remaining_row` within the concatenated input.
    pub abs_viewpoint: usize,
    /// The branch currently being filled.
    pub active: Node<'a>,
}

/// A candidate opener returned by [`Phrase::starts`].
///
/// `rel_start..rel_end` locate the opener within the probed slice, `content`
/// is the matched opener text, and `region` is the behavior the branch will
/// carry while open.
pub struct Opening {
    /// Start of the opener, relative to the probed slice.
    pub rel_start: usize,
    /// End of the opener, relative to the probed slice.
    pub rel_end: usize,
    /// The matched opener text.
    pub content: String,
    /// Behavior of the branch this candidate would open.
    pub region: Box<dyn Region>,
}

impl Opening {
    /// A candidate spanning the entire probed slice: a whole-row sink.
    pub fn spanning(probe: &Probe<'_>, region: Box<dyn Region>) -> Opening {
        Opening {
            rel_start: 0,
            rel_end: probe.remaining_row.len(),
            content: probe.remaining_row.to_owned(),
            region,
        }
    }
}

/// A closer returned by [`Region::ends`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closing {
    /// Start of the closer, relative to the probed slice.
    pub rel_start: usize,
    /// End of the closer, relative to the probed slice.
    pub rel_end: usize,
    /// The matched closer text.
    pub content: String,
}

impl Closing {
    /// A zero-width closer at offset 0: the region ends immediately.
    pub fn immediate() -> Closing {
        Closing {
            rel_start: 0,
            rel_end: 0,
            content: String::new(),
        }
    }
}

/// A grammar rule: decides whether a region of this phrase begins in the
/// probed slice.
pub trait Phrase {
    /// Probe for the phrase's opener. Returns `None` when the phrase does
    /// not begin anywhere in `probe.remaining_row`.
    fn starts(&self, probe: &Probe<'_>) -> Option<Opening>;
}

/// Behavior of an opened region, supplied with each [`Opening`].
///
/// The defaults make a region that closes immediately with a zero-width
/// boundary, leaves the search text untouched, and observes nothing.
pub trait Region {
    /// Probe for the region's closer. Returns `None` when the region does
    /// not end anywhere in `probe.remaining_row`.
    fn ends(&self, probe: &Probe<'_>) -> Option<Closing> {
        let _ = probe;
        Some(Closing::immediate())
    }

    /// Narrow the search text used by the remaining probes of the current
    /// crawler step. Must return a prefix of `search`; returning `""` hides
    /// the whole slice from later siblings and from the closer probe.
    fn next_search_content<'a>(&self, search: &'a str) -> &'a str {
        search
    }

    /// Fires once the region's opening boundary node is in the tree and the
    /// cursor has advanced past the opener.
    fn on_start(&mut self, token: TokenMut<'_>) {
        let _ = token;
    }

    /// Fires for every literal token appended while this region is active.
    fn on_extend(&mut self, token: TokenMut<'_>) {
        let _ = token;
    }

    /// Fires once the region's closing boundary node is in the tree and the
    /// cursor has advanced past the closer.
    fn on_end(&mut self, token: TokenMut<'_>) {
        let _ = token;
    }
}

/// The root's behavior: the root branch never ends.
pub(crate) struct RootRegion;

impl Region for RootRegion {
    fn ends(&self, _probe: &Probe<'_>) -> Option<Closing> {
        None
    }
}

struct PhraseData {
    name: String,
    matcher: Option<Box<dyn Phrase>>,
    subs: Vec<PhraseId>,
}

/// Arena of phrases plus the nesting edges between them.
///
/// # Example
///
/// ```rust
/// use phrase_tree::{patterns::Delimited, PhraseGraph};
///
/// let mut graph = PhraseGraph::new();
/// let root = graph.root();
/// let bracket = graph.add("bracket", Delimited::new(r"\(", r"\)").unwrap());
/// graph.link(root, bracket);
/// graph.link_self(bracket);
///
/// let tree = graph.parse(["a ((b) c) d"]);
/// assert_eq!(tree.source(), "a ((b) c) d");
/// assert_eq!(tree.unclosed().count(), 0);
/// ```
pub struct PhraseGraph {
    phrases: Vec<PhraseData>,
}

impl PhraseGraph {
    /// A graph holding only the root phrase, which never opens and never
    /// closes by matching.
    pub fn new() -> PhraseGraph {
        PhraseGraph {
            phrases: vec![PhraseData {
                name: "root".into(),
                matcher: None,
                subs: Vec::new(),
            }],
        }
    }

    /// The root phrase's id.
    pub fn root(&self) -> PhraseId {
        PhraseId(0)
    }

    /// Register a phrase under a diagnostic name and return its id. The new
    /// phrase is not linked anywhere yet.
    pub fn add(&mut self, name: impl Into<String>, phrase: impl Phrase + 'static) -> PhraseId {
        let id = PhraseId(self.phrases.len() as u32);
        self.phrases.push(PhraseData {
            name: name.into(),
            matcher: Some(Box::new(phrase)),
            subs: Vec::new(),
        });
        id
    }

    /// Diagnostic name of a phrase.
    pub fn name(&self, id: PhraseId) -> &str {
        &self.phrases[id.index()].name
    }

    /// Phrases allowed to open inside `id`. The slice order is an
    /// implementation detail; matching order among candidates is decided by
    /// source position, never by this order.
    pub fn children(&self, id: PhraseId) -> &[PhraseId] {
        &self.phrases[id.index()].subs
    }

    /// Allow `child` to open inside `parent`. Adding the same edge twice is
    /// a no-op.
    pub fn link(&mut self, parent: PhraseId, child: PhraseId) {
        let subs = &mut self.phrases[parent.index()].subs;
        if !subs.contains(&child) {
            subs.push(child);
        }
    }

    /// Link several children under `parent` at once.
    pub fn link_all(&mut self, parent: PhraseId, children: impl IntoIterator<Item = PhraseId>) {
        for child in children {
            self.link(parent, child);
        }
    }

    /// Link `a` and `b` inside each other (mutual recursion).
    pub fn link_mutual(&mut self, a: PhraseId, b: PhraseId) {
        self.link(a, b);
        self.link(b, a);
    }

    /// Allow a phrase to nest directly inside itself.
    pub fn link_self(&mut self, id: PhraseId) {
        self.link(id, id);
    }

    /// Remove the `parent` → `child` edge if present.
    pub fn unlink(&mut self, parent: PhraseId, child: PhraseId) {
        self.phrases[parent.index()].subs.retain(|&c| c != child);
    }

    pub(crate) fn starts(&self, id: PhraseId, probe: &Probe<'_>) -> Option<Opening> {
        self.phrases[id.index()].matcher.as_ref()?.starts(probe)
    }

    pub(crate) fn phrase_names(&self) -> Vec<String> {
        self.phrases.iter().map(|p| p.name.clone()).collect()
    }

    /// Parse a sequence of rows into a region tree.
    ///
    /// The caller decides whether rows carry their line terminators; the
    /// parser treats each row opaquely and absolute offsets are the running
    /// sum of row lengths as supplied. Branches left open at end of input
    /// stay open in the result.
    pub fn parse<I>(&self, rows: I) -> Tree
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        crawler::parse(self, rows.into_iter().map(Into::into).collect())
    }

    /// Parse a whole text, splitting it into rows that keep their `\n`
    /// terminators, so absolute offsets match byte positions in `text`.
    pub fn parse_text(&self, text: &str) -> Tree {
        self.parse(text.split_inclusive('\n'))
    }

    /// Like [`parse`](PhraseGraph::parse), but fail when any branch is left
    /// open at end of input. No closes are synthesized; the tree is simply
    /// rejected.
    pub fn parse_strict<I>(&self, rows: I) -> Result<Tree, ParseError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let tree = self.parse(rows);
        let unclosed: Vec<String> = tree
            .unclosed()
            .map(|branch| {
                let c = branch.coords();
                format!(
                    "unclosed phrase '{}' opened at {}:{}",
                    branch.phrase_name().unwrap_or(""),
                    c.row_n,
                    c.start_in_row()
                )
            })
            .collect();
        if unclosed.is_empty() {
            Ok(tree)
        } else {
            Err(ParseError(unclosed))
        }
    }
}

impl Default for PhraseGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PhraseGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for phrase in &self.phrases {
            map.entry(
                &phrase.name,
                &phrase
                    .subs
                    .iter()
                    .map(|s| self.phrases[s.index()].name.as_str())
                    .collect::<Vec<_>>(),
            );
        }
        map.finish()
    }
}

/// List of branches left open at end of input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError(Vec<String>);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
