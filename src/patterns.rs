//! Regex-bounded phrase kinds.
//!
//! These are the stock plug-ins for the extension surface: a region
//! delimited by a start and a stop pattern, and an atom that closes the
//! moment it opens. The crawler itself never touches the pattern engine;
//! everything regex-specific lives here.

use crate::grammar::{Closing, Opening, Phrase, Probe, Region};
use regex::Regex;

/// A region delimited by a start and a stop pattern.
///
/// `starts` reports the earliest start-pattern match in the probed slice;
/// the branch then closes on the earliest stop-pattern match, which may sit
/// rows further down.
///
/// # Example
///
/// ```rust
/// use phrase_tree::{patterns::Delimited, PhraseGraph};
///
/// let mut graph = PhraseGraph::new();
/// let string = graph.add("string", Delimited::new("'", "'").unwrap());
/// graph.link(graph.root(), string);
///
/// let tree = graph.parse(["say 'hi' now"]);
/// let quoted = tree.root().child(2).unwrap();
/// assert_eq!(quoted.phrase_name(), Some("string"));
/// assert_eq!(quoted.child(1).unwrap().content(), "hi");
/// ```
pub struct Delimited {
    start: Regex,
    stop: Regex,
}

impl Delimited {
    /// Compile both patterns. Zero-width matches are legal for either; a
    /// phrase whose opener and closer are both zero-width at the same spot
    /// will not advance the parse.
    pub fn new(start: &str, stop: &str) -> Result<Delimited, regex::Error> {
        Ok(Delimited {
            start: Regex::new(start)?,
            stop: Regex::new(stop)?,
        })
    }
}

impl Phrase for Delimited {
    fn starts(&self, probe: &Probe<'_>) -> Option<Opening> {
        let found = self.start.find(probe.remaining_row)?;
        Some(Opening {
            rel_start: found.start(),
            rel_end: found.end(),
            content: found.as_str().to_owned(),
            region: Box::new(DelimitedRegion {
                stop: self.stop.clone(),
            }),
        })
    }
}

struct DelimitedRegion {
    stop: Regex,
}

impl Region for DelimitedRegion {
    fn ends(&self, probe: &Probe<'_>) -> Option<Closing> {
        self.stop.find(probe.remaining_row).map(|found| Closing {
            rel_start: found.start(),
            rel_end: found.end(),
            content: found.as_str().to_owned(),
        })
    }
}

/// An atom: a region that opens on a single pattern and closes immediately
/// with a zero-width boundary, wrapping the match in an empty branch.
pub struct Atom {
    pattern: Regex,
}

impl Atom {
    /// Compile the pattern.
    pub fn new(pattern: &str) -> Result<Atom, regex::Error> {
        Ok(Atom {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Phrase for Atom {
    fn starts(&self, probe: &Probe<'_>) -> Option<Opening> {
        let found = self.pattern.find(probe.remaining_row)?;
        Some(Opening {
            rel_start: found.start(),
            rel_end: found.end(),
            content: found.as_str().to_owned(),
            region: Box::new(AtomRegion),
        })
    }
}

struct AtomRegion;

// the default close: zero-width, immediately
impl Region for AtomRegion {}
