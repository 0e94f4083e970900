//! Tree-shaped documents exchanged between stages.
//!
//! This module provides:
//! - An owned element tree parsed from and serialized to XML
//! - A compiled XPath-like node selector used by merges

mod element;
mod path;

pub use element::{Element, Node};
pub use path::{NodeAddress, NodePath};
