//! The document-transformation collaborator.

use crate::context::Variables;
use crate::core::Payload;
use crate::errors::TransformError;
use std::fmt::Debug;

/// Applies a named transformation to a stage payload.
///
/// The engine never calls a transformer with an empty reference; an empty
/// reference means the payload passes through untouched.
#[cfg_attr(test, mockall::automock)]
pub trait Transformer: Send + Sync + Debug {
    /// Transforms `input` with the transformation identified by `reference`.
    fn transform(
        &self,
        reference: &str,
        input: Payload,
        params: &Variables,
    ) -> Result<Payload, TransformError>;
}

/// A transformer that returns every input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn transform(
        &self,
        _reference: &str,
        input: Payload,
        _params: &Variables,
    ) -> Result<Payload, TransformError> {
        Ok(input)
    }
}

/// Runs `transformer` unless `reference` is empty.
pub fn apply(
    transformer: &dyn Transformer,
    reference: &str,
    input: Payload,
    params: &Variables,
) -> Result<Payload, TransformError> {
    if reference.trim().is_empty() {
        return Ok(input);
    }
    transformer.transform(reference, input, params)
}
