//! Error taxonomy for the KLV engine.
//!
//! Everything fatal funnels through [`KlError`]; `fill()` unwinds on the
//! first failure and leaves previously completed rows queryable.

use crate::block::BlockElt;

/// All failure modes of block validation, row fill, and persistence.
#[derive(Debug, thiserror::Error)]
pub enum KlError {
    /// User-supplied block data is inconsistent.
    #[error("invalid block data: {0}")]
    Input(String),

    /// An internal invariant failed; aborting is the only safe option.
    #[error("invariant violation at ({x},{y}): {what}")]
    InvariantViolation {
        x: BlockElt,
        y: BlockElt,
        what: &'static str,
    },

    /// A computed polynomial exceeds the store's degree or valuation caps.
    #[error("polynomial degree overflow at ({x},{y})")]
    DegreeOverflow { x: BlockElt, y: BlockElt },

    /// The fixed-capacity coefficient pool or index is full.
    #[error("polynomial store capacity exhausted")]
    StorageExhausted,

    /// A subtraction drove a coefficient below zero. This is the
    /// non-negativity conjecture failing, not a recoverable condition.
    #[error("negative coefficient in P({x},{y})")]
    NegativeCoefficient { x: BlockElt, y: BlockElt },

    /// Query of a row that `fill()` has not completed.
    #[error("row {y} is not filled")]
    NotFilled { y: BlockElt },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted file (bad magic, truncation, range error).
    #[error("malformed file: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, KlError>;
