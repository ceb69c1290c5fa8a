//! Error taxonomy shared by the reverse pass and the constraint factors.

use thiserror::Error;

use crate::key::Key;

/// Errors surfaced by lookups, Jacobian accumulation and Hessian assembly.
///
/// A returned error never leaves a half-written
/// [`JacobianMap`](crate::JacobianMap) or factor behind. Single writes are
/// validated before they mutate; records with several children roll back
/// through [`JacobianMap::transaction`](crate::JacobianMap::transaction).
#[derive(Debug, Error)]
pub enum Error {
    /// A `Values` or `VectorValues` lookup for a key that was never inserted.
    #[error("key {0} is not present")]
    MissingKey(Key),

    /// A typed `Values` lookup asked for the wrong value type.
    #[error("value at key {key} is not a {expected}")]
    TypeMismatch { key: Key, expected: &'static str },

    /// `insert` on a key that already holds a value.
    #[error("key {0} already holds a value")]
    DuplicateKey(Key),

    /// A reverse pass tried to write a block for a key the map does not track.
    #[error("Jacobian map has no slot for key {0}")]
    UnknownJacobianKey(Key),

    /// Two dimensions that must agree do not.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A stacked second-derivative matrix cannot be split into per-output blocks.
    #[error("malformed Hessian stack: {rows} rows is not a multiple of block height {block_rows}")]
    MalformedHessian { rows: usize, block_rows: usize },

    /// A chain-rule block's column count disagrees with the record's output dimension.
    #[error("chain-rule block has {actual} columns but the record expects {expected}")]
    ContractViolation { expected: usize, actual: usize },

    /// Failure raised by a user-supplied residual.
    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a user residual failure so it travels through unchanged.
    pub fn callback<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Callback(Box::new(err))
    }

    /// Shorthand for [`Error::DimensionMismatch`].
    pub fn dimension(context: &'static str, expected: usize, actual: usize) -> Self {
        Error::DimensionMismatch {
            context,
            expected,
            actual,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
