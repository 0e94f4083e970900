//! Path-addressed merging of slot documents.

use super::MergeSpec;
use crate::context::DataSlotStore;
use crate::document::{Element, NodePath};
use crate::errors::{ConfigurationError, ContractErrorInfo, MergeError};
use tracing::debug;

/// Splices nodes of one document into another.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    /// Appends copies of every `src_path` match in `src` under the first
    /// `dest_path` match in `dest`.
    ///
    /// Returns the number of nodes appended. Selecting nothing from `src` is
    /// a no-op, even if `dest_path` would not match.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::UnmatchedDestination`] if there is something to
    /// append but `dest_path` matches nothing.
    pub fn merge(
        dest: &mut Element,
        src: &Element,
        src_path: &NodePath,
        dest_path: &NodePath,
    ) -> Result<usize, MergeError> {
        let selected: Vec<Element> = src_path
            .select(src)
            .iter()
            .filter_map(|address| src.at(address).cloned())
            .collect();
        if selected.is_empty() {
            return Ok(0);
        }

        let target = dest_path
            .select_first(dest)
            .and_then(|address| dest.at_mut(&address))
            .ok_or_else(|| MergeError::UnmatchedDestination {
                path: dest_path.to_string(),
            })?;

        let count = selected.len();
        for node in selected {
            target.append(node);
        }
        Ok(count)
    }
}

/// One compiled merge rule after the destination rule.
#[derive(Debug, Clone)]
struct MergeRule {
    slot: String,
    src_path: NodePath,
    dest_path: NodePath,
}

/// Merge rules compiled once at pipeline initialisation.
#[derive(Debug, Clone)]
pub struct MergePlan {
    destination_slot: String,
    rules: Vec<MergeRule>,
}

impl MergePlan {
    /// Compiles the configured merge rules.
    ///
    /// Returns `None` when fewer than two rules are configured, since a
    /// single rule has nothing to merge.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` for a missing or malformed path in any
    /// rule after the first.
    pub fn compile(specs: &[MergeSpec]) -> Result<Option<Self>, ConfigurationError> {
        let [first, rest @ ..] = specs else {
            return Ok(None);
        };
        if rest.is_empty() {
            return Ok(None);
        }

        let rules = rest
            .iter()
            .map(|spec| {
                Ok(MergeRule {
                    slot: spec.source_slot.clone(),
                    src_path: required_path(spec, spec.src_path.as_deref(), "xpath-source")?,
                    dest_path: required_path(spec, spec.dest_path.as_deref(), "xpath-dest")?,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(Some(Self {
            destination_slot: first.source_slot.clone(),
            rules,
        }))
    }

    /// Returns the slot whose document receives the merged nodes.
    #[must_use]
    pub fn destination_slot(&self) -> &str {
        &self.destination_slot
    }

    /// Returns the number of rules applied after the destination rule.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Builds the merged document from the slots of a run.
    ///
    /// # Errors
    ///
    /// Returns a `MergeError` if a slot is empty, does not hold a document,
    /// or a destination path matches nothing.
    pub fn apply(&self, store: &DataSlotStore) -> Result<Element, MergeError> {
        let mut dest = slot_document(store, &self.destination_slot)?;
        for rule in &self.rules {
            let src = slot_document(store, &rule.slot)?;
            let appended = MergeEngine::merge(&mut dest, &src, &rule.src_path, &rule.dest_path)?;
            debug!(
                slot = %rule.slot,
                src_path = %rule.src_path,
                dest_path = %rule.dest_path,
                appended,
                "Merged slot document"
            );
        }
        Ok(dest)
    }
}

fn slot_document(store: &DataSlotStore, slot: &str) -> Result<Element, MergeError> {
    let result = store.get(slot).ok_or_else(|| MergeError::MissingSlot {
        slot: slot.to_string(),
    })?;
    if result.payload.is_empty() {
        return Err(MergeError::NotADocument {
            slot: slot.to_string(),
        });
    }
    result.payload.to_document()
}

fn required_path(spec: &MergeSpec, path: Option<&str>, attribute: &str) -> Result<NodePath, ConfigurationError> {
    let path = path.filter(|p| !p.trim().is_empty()).ok_or_else(|| {
        ConfigurationError::new(format!(
            "Merge rule for slot '{}' is missing '{attribute}'",
            spec.source_slot
        ))
        .with_error_info(
            ContractErrorInfo::new("CONFIG-BAD-PATH", format!("'{attribute}' is required"))
                .with_context_entry("slot", spec.source_slot.clone()),
        )
    })?;
    NodePath::parse(path)
}
