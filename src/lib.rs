//! Lossless nested-region parser driven by user-defined phrase graphs.
//!
//! A [`PhraseGraph`] describes a grammar as a graph of phrases: each phrase
//! knows how a region of text begins and ends, and which phrases may nest
//! inside it. Parsing walks the input rows once, left to right and top to
//! bottom, and produces a [`Tree`] of matched regions in which every byte of
//! the input survives, literals, delimiters and whitespace included. Each
//! span carries its row, in-row and absolute coordinates.
//!
//! Phrase graphs may be cyclic (self-recursive and mutually recursive
//! regions are ordinary cases), regions may span row boundaries, and
//! regions that never close simply stay open in the result instead of
//! failing the parse.
//!
//! # Example
//!
//! ```rust
//! use phrase_tree::{patterns::Delimited, PhraseGraph};
//!
//! let mut graph = PhraseGraph::new();
//! let root = graph.root();
//! let bracket = graph.add("bracket", Delimited::new(r"\(", r"\)").unwrap());
//! let string = graph.add("string", Delimited::new("'", "'").unwrap());
//! graph.link_all(root, [bracket, string]);
//! graph.link_self(bracket);
//! graph.link(bracket, string);
//!
//! let tree = graph.parse_text("a (b ('c')\nd) e");
//!
//! // nothing is lost
//! assert_eq!(tree.source(), "a (b ('c')\nd) e");
//! assert_eq!(tree.unclosed().count(), 0);
//!
//! // the outer bracket spans both rows
//! let outer = tree.root().child(2).unwrap();
//! assert_eq!(outer.phrase_name(), Some("bracket"));
//! assert_eq!(outer.coords().abs_start(), 2);
//! let close = outer.end_node().unwrap();
//! assert_eq!(close.coords().row_n, 1);
//! ```
//!
//! Custom phrase kinds plug in through the [`Phrase`] and [`Region`] traits;
//! the stock regex-bounded kinds live in [`patterns`].

mod crawler;
pub mod grammar;
pub mod patterns;
pub mod tree;

pub use grammar::{Closing, Opening, ParseError, Phrase, PhraseGraph, PhraseId, Probe, Region};
pub use tree::{Children, Coords, Linear, Node, NodeId, TokenKind, TokenMut, Tree};
