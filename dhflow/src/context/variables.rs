//! Effective variable resolution for a run.

use crate::errors::{ConfigurationError, ContractErrorInfo};
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::OnceLock;
use tracing::trace;

/// Variable name to value.
pub type Variables = HashMap<String, String>;

/// Upper bound on full re-expansion passes.
pub const MAX_RESOLUTION_PASSES: usize = 16;

/// Upper bound on the length of any resolved value, in bytes.
pub const MAX_RESOLVED_VALUE_LEN: usize = 1 << 20;

/// Expands placeholders in a single value against a variable map.
pub trait Expander: Send + Sync + Debug {
    /// Returns `value` with every resolvable placeholder replaced.
    fn expand(&self, value: &str, vars: &Variables) -> String;

    /// Returns the variable names `value` refers to.
    ///
    /// Used to reject reference cycles before any expansion. An expander
    /// that cannot report references is still bounded by
    /// [`MAX_RESOLUTION_PASSES`] and [`MAX_RESOLVED_VALUE_LEN`].
    fn references(&self, _value: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Expands `${name}` placeholders. Unknown names are left verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderExpander;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}")
            .unwrap_or_else(|_| unreachable!("static pattern is valid"))
    })
}

impl Expander for PlaceholderExpander {
    fn expand(&self, value: &str, vars: &Variables) -> String {
        placeholder_pattern()
            .replace_all(value, |caps: &Captures<'_>| match vars.get(&caps[1]) {
                Some(v) => v.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn references(&self, value: &str) -> Vec<String> {
        placeholder_pattern()
            .captures_iter(value)
            .map(|caps| caps[1].to_string())
            .collect()
    }
}

/// Builds the effective variables for one run.
///
/// Starts from a copy of `base`, overlays `call_params`, and when `resolve`
/// is set re-expands every value against the accumulating map until a full
/// pass changes nothing.
///
/// # Errors
///
/// Returns a `ConfigurationError` (code `CONFIG-VARIABLE-CYCLE`) if the
/// variables reference each other in a cycle, if values are still changing
/// after [`MAX_RESOLUTION_PASSES`] passes, or if a value grows past
/// [`MAX_RESOLVED_VALUE_LEN`].
pub fn build_props(
    base: &Variables,
    call_params: &Variables,
    resolve: bool,
    expander: &dyn Expander,
) -> Result<Variables, ConfigurationError> {
    let mut props = base.clone();
    props.extend(call_params.iter().map(|(k, v)| (k.clone(), v.clone())));

    if !resolve {
        return Ok(props);
    }

    let mut keys: Vec<String> = props.keys().cloned().collect();
    keys.sort();

    if let Some(cycle) = find_cycle(&keys, &props, expander) {
        return Err(cycle_error(format!(
            "Variables reference each other in a cycle: {}",
            cycle.join(" -> ")
        )));
    }

    let mut changing = Vec::new();
    for pass in 1..=MAX_RESOLUTION_PASSES {
        changing.clear();
        for key in &keys {
            let current = props.get(key).cloned().unwrap_or_default();
            let expanded = expander.expand(&current, &props);
            if expanded.len() > MAX_RESOLVED_VALUE_LEN {
                return Err(cycle_error(format!(
                    "Variable '{key}' grew past {MAX_RESOLVED_VALUE_LEN} bytes during resolution"
                )));
            }
            if expanded != current {
                props.insert(key.clone(), expanded);
                changing.push(key.clone());
            }
        }
        if changing.is_empty() {
            trace!(passes = pass, "Variables converged");
            return Ok(props);
        }
    }

    Err(cycle_error(format!(
        "Variable resolution did not converge after {MAX_RESOLUTION_PASSES} passes; still changing: {}",
        changing.join(", ")
    )))
}

fn cycle_error(message: String) -> ConfigurationError {
    ConfigurationError::new(message).with_error_info(
        ContractErrorInfo::new("CONFIG-VARIABLE-CYCLE", "Variables reference each other in a cycle")
            .with_fix_hint("Break the reference cycle between the listed variables."),
    )
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Open,
    Done,
}

/// Depth-first search over the reference graph of `props`. Returns the
/// variables of the first cycle found, closed with its starting name.
fn find_cycle(keys: &[String], props: &Variables, expander: &dyn Expander) -> Option<Vec<String>> {
    let edges: HashMap<&str, BTreeSet<String>> = keys
        .iter()
        .map(|key| {
            let refs = props
                .get(key)
                .map(|value| expander.references(value))
                .unwrap_or_default()
                .into_iter()
                .filter(|name| props.contains_key(name))
                .collect();
            (key.as_str(), refs)
        })
        .collect();

    let mut state: HashMap<&str, Visit> = keys.iter().map(|k| (k.as_str(), Visit::New)).collect();
    let mut path: Vec<&str> = Vec::new();

    for key in keys {
        if state.get(key.as_str()) != Some(&Visit::New) {
            continue;
        }
        if let Some(cycle) = visit(key.as_str(), &edges, &mut state, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    edges: &'a HashMap<&'a str, BTreeSet<String>>,
    state: &mut HashMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    state.insert(node, Visit::Open);
    path.push(node);

    for next in edges.get(node).into_iter().flatten() {
        match state.get(next.as_str()).copied() {
            Some(Visit::Open) => {
                let start = path.iter().position(|n| *n == next.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(next.clone());
                return Some(cycle);
            }
            Some(Visit::New) => {
                if let Some(cycle) = visit(next.as_str(), edges, state, path) {
                    return Some(cycle);
                }
            }
            Some(Visit::Done) | None => {}
        }
    }

    path.pop();
    state.insert(node, Visit::Done);
    None
}
