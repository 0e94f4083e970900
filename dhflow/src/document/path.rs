//! A small XPath-like selector over [`Element`] trees.
//!
//! Supported forms: `/a/b` (absolute), `//item` and `/root//item`
//! (descendant), `item/sub` (relative to the document element) and the `*`
//! wildcard. Predicates, attributes, axes and functions are rejected.

use super::Element;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Child indices leading from the document element to a node.
///
/// The empty address is the document element itself.
pub type NodeAddress = Vec<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Named(String),
}

impl NameTest {
    fn matches(&self, el: &Element) -> bool {
        match self {
            Self::Any => true,
            Self::Named(name) => el.name == *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
}

/// Evaluation context: either above the document element or at a node.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    Document,
    Node(NodeAddress),
}

/// A compiled node path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\*|[A-Za-z_][A-Za-z0-9_.\-]*(:[A-Za-z_][A-Za-z0-9_.\-]*)?)$")
            .unwrap_or_else(|_| unreachable!("static pattern is valid"))
    })
}

impl NodePath {
    /// Compiles a path expression.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` (code `CONFIG-BAD-PATH`) for anything
    /// outside the supported subset.
    pub fn parse(expr: &str) -> Result<Self, ConfigurationError> {
        let source = expr.trim();
        if source.is_empty() {
            return Err(bad_path(expr, "path is empty"));
        }

        let absolute = source.starts_with('/');
        let mut rest = source;
        let mut steps = Vec::new();
        let mut axis = Axis::Child;

        if absolute {
            if let Some(stripped) = rest.strip_prefix("//") {
                axis = Axis::Descendant;
                rest = stripped;
            } else {
                rest = &rest[1..];
            }
        }

        loop {
            let (segment, tail) = match rest.find('/') {
                Some(pos) => (&rest[..pos], Some(&rest[pos..])),
                None => (rest, None),
            };

            if segment.is_empty() {
                return Err(bad_path(expr, "empty step"));
            }
            if !name_pattern().is_match(segment) {
                return Err(bad_path(expr, &format!("unsupported step '{segment}'")));
            }

            let test = if segment == "*" {
                NameTest::Any
            } else {
                NameTest::Named(segment.to_string())
            };
            steps.push(Step { axis, test });

            match tail {
                None => break,
                Some(t) => {
                    if let Some(stripped) = t.strip_prefix("//") {
                        axis = Axis::Descendant;
                        rest = stripped;
                    } else {
                        axis = Axis::Child;
                        rest = &t[1..];
                    }
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            absolute,
            steps,
        })
    }

    /// Returns the original expression.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Selects every matching element, in document order, without duplicates.
    #[must_use]
    pub fn select(&self, doc: &Element) -> Vec<NodeAddress> {
        let mut contexts = if self.absolute {
            vec![Context::Document]
        } else {
            vec![Context::Node(Vec::new())]
        };

        for step in &self.steps {
            // Address order is document order.
            let mut next: BTreeSet<NodeAddress> = BTreeSet::new();
            for ctx in &contexts {
                let candidates = match step.axis {
                    Axis::Child => children(doc, ctx),
                    Axis::Descendant => descendants(doc, ctx),
                };
                for address in candidates {
                    let matched = doc.at(&address).is_some_and(|el| step.test.matches(el));
                    if matched {
                        next.insert(address);
                    }
                }
            }
            contexts = next.into_iter().map(Context::Node).collect();
        }

        contexts
            .into_iter()
            .filter_map(|ctx| match ctx {
                Context::Node(address) => Some(address),
                Context::Document => None,
            })
            .collect()
    }

    /// Selects the first matching element in document order.
    #[must_use]
    pub fn select_first(&self, doc: &Element) -> Option<NodeAddress> {
        self.select(doc).into_iter().next()
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for NodePath {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn children(doc: &Element, ctx: &Context) -> Vec<NodeAddress> {
    match ctx {
        Context::Document => vec![Vec::new()],
        Context::Node(address) => match doc.at(address) {
            Some(el) => el
                .child_elements()
                .map(|(i, _)| {
                    let mut child = address.clone();
                    child.push(i);
                    child
                })
                .collect(),
            None => Vec::new(),
        },
    }
}

fn descendants(doc: &Element, ctx: &Context) -> Vec<NodeAddress> {
    let mut out = Vec::new();
    let mut pending = children(doc, ctx);
    pending.reverse();
    while let Some(address) = pending.pop() {
        let mut kids = children(doc, &Context::Node(address.clone()));
        kids.reverse();
        out.push(address);
        pending.extend(kids);
    }
    out
}

fn bad_path(expr: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::new(format!("Malformed node path '{expr}': {reason}")).with_error_info(
        ContractErrorInfo::new("CONFIG-BAD-PATH", format!("Cannot compile path '{expr}'"))
            .with_fix_hint("Use '/a/b', '//name', 'a/b' or '*' steps only.")
            .with_context_entry("path", expr),
    )
}
