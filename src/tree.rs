//! The region tree produced by a parse.
//!
//! The tree is stored as an append-only arena: every token, boundary node and
//! branch is a record in a flat vector, addressed by [`NodeId`]. Branches own
//! their children as an ordered id list and every non-root node keeps a
//! non-owning parent reference, so the tree can be walked in both directions
//! without reference cycles. [`Node`] is the cheap cursor view over the arena,
//! comparable to a red node over green storage.

use crate::grammar::PhraseId;
use std::fmt::{self, Write as _};

/// Source coordinates of a matched span.
///
/// `match_rel_start` and `match_rel_end` are offsets into the remaining-row
/// slice at the moment the span was matched; the two viewpoints locate that
/// slice within its row and within the concatenated input. All offsets are
/// byte offsets into the row strings as supplied by the caller. Coordinates
/// are fixed when the node is appended and never change afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coords {
    /// Start of the match, relative to the remaining-row slice.
    pub match_rel_start: usize,
    /// End of the match, relative to the remaining-row slice.
    pub match_rel_end: usize,
    /// Zero-based row index.
    pub row_n: usize,
    /// Offset of the remaining-row slice within its full row.
    pub row_viewpoint: usize,
    /// Offset of the remaining-row slice within the concatenated input.
    pub abs_viewpoint: usize,
}

impl Coords {
    /// Absolute start of the match within the concatenated input.
    pub fn abs_start(&self) -> usize {
        self.abs_viewpoint + self.match_rel_start
    }

    /// Absolute end of the match within the concatenated input.
    pub fn abs_end(&self) -> usize {
        self.abs_viewpoint + self.match_rel_end
    }

    /// Start of the match within its row.
    pub fn start_in_row(&self) -> usize {
        self.row_viewpoint + self.match_rel_start
    }

    /// End of the match within its row.
    pub fn end_in_row(&self) -> usize {
        self.row_viewpoint + self.match_rel_end
    }
}

/// Tags distinguishing the node flavors in the tree.
///
/// Literals and boundaries appended directly to the root carry their own tags
/// so they stay recognizable without consulting the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenKind {
    /// A literal run inside a branch.
    Text,
    /// A boundary marker opening or closing a branch.
    Boundary,
    /// A literal run directly under the root.
    RootText,
    /// A boundary marker on the root: its opening node and the terminal
    /// anchor appended at end of input.
    RootBoundary,
    /// An opened region.
    Branch,
    /// The root region.
    Root,
}

impl TokenKind {
    /// Whether nodes of this kind own a child sequence.
    pub fn is_branch(self) -> bool {
        matches!(self, TokenKind::Branch | TokenKind::Root)
    }

    /// Whether nodes of this kind mark a branch boundary.
    pub fn is_boundary(self) -> bool {
        matches!(self, TokenKind::Boundary | TokenKind::RootBoundary)
    }

    /// The element tag used when rendering the tree as XML.
    pub fn tag(self) -> &'static str {
        match self {
            TokenKind::Text => "T",
            TokenKind::Boundary => "N",
            TokenKind::RootText => "RT",
            TokenKind::RootBoundary => "RN",
            TokenKind::Branch => "B",
            TokenKind::Root => "RB",
        }
    }
}

/// Stable index of a node in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct NodeData {
    kind: TokenKind,
    coords: Coords,
    content: String,
    parent: Option<NodeId>,
    phrase: Option<PhraseId>,
    children: Vec<NodeId>,
}

/// The parse result: an arena of tokens and branches rooted at the root
/// branch.
///
/// A tree is append-only while the crawler runs and immutable afterwards.
/// Branches left open at end of input stay open; inspect them with
/// [`Tree::unclosed`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tree {
    nodes: Vec<NodeData>,
    phrase_names: Vec<String>,
}

impl Tree {
    pub(crate) const ROOT: NodeId = NodeId(0);

    /// A fresh tree holding the root branch and its opening node, both at
    /// coordinates (0, 0, 0, 0).
    pub(crate) fn new(phrase_names: Vec<String>, root_phrase: PhraseId) -> Tree {
        let mut tree = Tree {
            nodes: Vec::new(),
            phrase_names,
        };
        tree.alloc(NodeData {
            kind: TokenKind::Root,
            coords: Coords::default(),
            content: String::new(),
            parent: None,
            phrase: Some(root_phrase),
            children: Vec::new(),
        });
        let opening = tree.alloc(NodeData {
            kind: TokenKind::RootBoundary,
            coords: Coords::default(),
            content: String::new(),
            parent: Some(Tree::ROOT),
            phrase: None,
            children: Vec::new(),
        });
        tree.nodes[Tree::ROOT.index()].children.push(opening);
        tree
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    /// Append a literal token to `branch` and return its id.
    pub(crate) fn push_token(&mut self, branch: NodeId, coords: Coords, content: String) -> NodeId {
        let kind = match self.data(branch).kind {
            TokenKind::Root => TokenKind::RootText,
            _ => TokenKind::Text,
        };
        self.push_leaf(branch, kind, coords, content)
    }

    /// Append a boundary node to `branch` and return its id.
    pub(crate) fn push_boundary(
        &mut self,
        branch: NodeId,
        coords: Coords,
        content: String,
    ) -> NodeId {
        let kind = match self.data(branch).kind {
            TokenKind::Root => TokenKind::RootBoundary,
            _ => TokenKind::Boundary,
        };
        self.push_leaf(branch, kind, coords, content)
    }

    fn push_leaf(
        &mut self,
        branch: NodeId,
        kind: TokenKind,
        coords: Coords,
        content: String,
    ) -> NodeId {
        debug_assert!(self.data(branch).kind.is_branch());
        let id = self.alloc(NodeData {
            kind,
            coords,
            content,
            parent: Some(branch),
            phrase: None,
            children: Vec::new(),
        });
        self.nodes[branch.index()].children.push(id);
        id
    }

    /// Append a new branch under `parent`, seeding it with its opening
    /// boundary node. Returns the branch id and the opening node id.
    pub(crate) fn push_branch(
        &mut self,
        parent: NodeId,
        phrase: PhraseId,
        coords: Coords,
        content: String,
    ) -> (NodeId, NodeId) {
        debug_assert!(self.data(parent).kind.is_branch());
        let branch = self.alloc(NodeData {
            kind: TokenKind::Branch,
            coords,
            content: content.clone(),
            parent: Some(parent),
            phrase: Some(phrase),
            children: Vec::new(),
        });
        let opening = self.alloc(NodeData {
            kind: TokenKind::Boundary,
            coords,
            content,
            parent: Some(branch),
            phrase: None,
            children: Vec::new(),
        });
        self.nodes[branch.index()].children.push(opening);
        self.nodes[parent.index()].children.push(branch);
        (branch, opening)
    }

    /// Mutable hook view of a node. Content may be rewritten by lifecycle
    /// hooks; coordinates stay fixed.
    pub(crate) fn token_mut(&mut self, id: NodeId) -> TokenMut<'_> {
        let data = &mut self.nodes[id.index()];
        TokenMut {
            kind: data.kind,
            coords: data.coords,
            content: &mut data.content,
        }
    }

    /// The root branch.
    pub fn root(&self) -> Node<'_> {
        self.node(Tree::ROOT)
    }

    /// The node addressed by `id`.
    ///
    /// Ids are only meaningful for the tree that produced them; passing an id
    /// from another tree panics or yields an arbitrary node.
    pub fn node(&self, id: NodeId) -> Node<'_> {
        assert!(id.index() < self.nodes.len(), "node id out of range");
        Node { tree: self, id }
    }

    /// Number of nodes in the tree, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Diagnostic name of a phrase, as registered in the graph that parsed
    /// this tree.
    pub fn phrase_name(&self, id: PhraseId) -> &str {
        &self.phrase_names[id.index()]
    }

    /// The concatenation of every leaf's content in source order.
    ///
    /// For any parse this equals the concatenation of the input rows: the
    /// tree loses nothing.
    pub fn source(&self) -> String {
        self.root().linear().map(|t| t.content()).collect()
    }

    /// Iterate over every node in allocation order, the root first.
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> {
        (0..self.nodes.len() as u32).map(|i| self.node(NodeId(i)))
    }

    /// Branches left open at end of input, in allocation order. The root is
    /// not reported; it never closes by matching.
    pub fn unclosed(&self) -> impl Iterator<Item = Node<'_>> {
        self.nodes()
            .skip(1)
            .filter(|n| n.is_branch() && n.is_open())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root().fmt(f)
    }
}

/// Mutable view of a freshly appended token, handed to lifecycle hooks.
///
/// Hooks may rewrite the content but cannot touch coordinates or the owning
/// branch's child sequence.
pub struct TokenMut<'a> {
    kind: TokenKind,
    coords: Coords,
    content: &'a mut String,
}

impl TokenMut<'_> {
    /// The token's kind tag.
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The token's coordinates.
    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    /// The token's content.
    pub fn content(&self) -> &str {
        self.content
    }

    /// Mutable access to the token's content.
    pub fn content_mut(&mut self) -> &mut String {
        self.content
    }
}

/// Cursor over one node of a [`Tree`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> Node<'a> {
    /// This node's id within its tree.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's kind tag.
    pub fn kind(&self) -> TokenKind {
        self.tree.data(self.id).kind
    }

    /// The node's coordinates. For a branch these are the coordinates of its
    /// opening match.
    pub fn coords(&self) -> &'a Coords {
        &self.tree.data(self.id).coords
    }

    /// The matched or literal content. Boundary nodes carry the matched
    /// delimiter text, which may be empty for zero-width matches.
    pub fn content(&self) -> &'a str {
        &self.tree.data(self.id).content
    }

    /// The owning branch, `None` only for the root.
    pub fn parent(&self) -> Option<Node<'a>> {
        self.tree
            .data(self.id)
            .parent
            .map(|id| Node { tree: self.tree, id })
    }

    /// The phrase that opened this branch; `None` for leaf nodes.
    pub fn phrase(&self) -> Option<PhraseId> {
        self.tree.data(self.id).phrase
    }

    /// Diagnostic name of the phrase that opened this branch.
    pub fn phrase_name(&self) -> Option<&'a str> {
        self.phrase().map(|p| self.tree.phrase_name(p))
    }

    /// Whether this node is a branch (owns a child sequence).
    pub fn is_branch(&self) -> bool {
        self.kind().is_branch()
    }

    /// Whether this branch is still open: its last child is not yet a
    /// closing boundary node. Always `false` for leaf nodes.
    pub fn is_open(&self) -> bool {
        if !self.is_branch() {
            return false;
        }
        let children = &self.tree.data(self.id).children;
        match children.last() {
            Some(&last) if children.len() > 1 => !self.tree.data(last).kind.is_boundary(),
            _ => true,
        }
    }

    /// Number of children; zero for leaf nodes.
    pub fn child_count(&self) -> usize {
        self.tree.data(self.id).children.len()
    }

    /// The child at `index`, if any.
    pub fn child(&self, index: usize) -> Option<Node<'a>> {
        self.tree
            .data(self.id)
            .children
            .get(index)
            .map(|&id| Node { tree: self.tree, id })
    }

    /// The opening boundary node of a branch (its first child).
    pub fn start_node(&self) -> Option<Node<'a>> {
        self.child(0)
    }

    /// The last child of a branch; the closing boundary node once the branch
    /// has closed.
    pub fn end_node(&self) -> Option<Node<'a>> {
        self.child(self.child_count().checked_sub(1)?)
    }

    /// Iterate over the child sequence in source order.
    pub fn children(&self) -> Children<'a> {
        Children {
            tree: self.tree,
            ids: self.tree.data(self.id).children.iter(),
        }
    }

    /// In-order traversal of every leaf underneath this branch, boundary
    /// nodes included. Yields nothing when called on a leaf.
    pub fn linear(&self) -> Linear<'a> {
        Linear {
            tree: self.tree,
            stack: vec![(self.id, 0)],
        }
    }

    fn fmt_xml(&self, f: &mut fmt::Formatter<'_>, depth: usize, pretty: bool) -> fmt::Result {
        let tag = self.kind().tag();
        if self.is_branch() {
            write!(f, "<{} phrase='", tag)?;
            xml_escape(f, self.phrase_name().unwrap_or(""))?;
            f.write_str("'>")?;
            for child in self.children() {
                if pretty {
                    write!(f, "\n{:indent$}", "", indent = (depth + 1) * 2)?;
                }
                child.fmt_xml(f, depth + 1, pretty)?;
            }
            if pretty {
                write!(f, "\n{:indent$}", "", indent = depth * 2)?;
            }
            write!(f, "</{}>", tag)
        } else {
            let c = self.coords();
            write!(
                f,
                "<{} coord='{}:{}:{}/{}:{}'>",
                tag,
                c.row_n,
                c.start_in_row(),
                c.end_in_row(),
                c.abs_start(),
                c.abs_end()
            )?;
            xml_escape(f, self.content())?;
            write!(f, "</{}>", tag)
        }
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("content", &self.content())
            .finish()
    }
}

/// Renders the subtree as XML, using the original tag vocabulary: `T`
/// literal, `N` boundary, `B` branch, with `R`-prefixed variants on the root.
/// The alternate form (`{:#}`) indents one element per line.
impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_xml(f, 0, f.alternate())
    }
}

fn xml_escape(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '&' => f.write_str("&amp;")?,
            '<' => f.write_str("&lt;")?,
            '>' => f.write_str("&gt;")?,
            '\'' => f.write_str("&apos;")?,
            _ => f.write_char(ch)?,
        }
    }
    Ok(())
}

/// Iterator over a branch's direct children.
pub struct Children<'a> {
    tree: &'a Tree,
    ids: std::slice::Iter<'a, NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        self.ids.next().map(|&id| Node {
            tree: self.tree,
            id,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Children<'_> {}

/// Depth-first leaf iterator, see [`Node::linear`].
pub struct Linear<'a> {
    tree: &'a Tree,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for Linear<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        loop {
            let (branch, index) = *self.stack.last()?;
            match self.tree.data(branch).children.get(index) {
                None => {
                    self.stack.pop();
                }
                Some(&child) => {
                    self.stack.last_mut().expect("stack is non-empty").1 += 1;
                    if self.tree.data(child).kind.is_branch() {
                        self.stack.push((child, 0));
                    } else {
                        return Some(Node {
                            tree: self.tree,
                            id: child,
                        });
                    }
                }
            }
        }
    }
}
