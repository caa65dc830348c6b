//! Kazhdan-Lusztig-Vogan polynomial engine for blocks of real reductive
//! groups.
//!
//! The crate computes, row by row in ascending length order, the family of
//! polynomials `P(x, y)` attached to a block (a finite labelled graph with
//! cross actions, Cayley transforms and per-generator descent statuses),
//! together with their mu coefficients. On top of the completed table it
//! exposes the Hecke-module structure as a W-graph with its cell
//! decomposition, and persists blocks, matrices and coefficients in compact
//! binary files.
//!
//! - [`block`]: the borrowed block interface and an owned validated
//!   implementation
//! - [`kl`]: the untwisted engine
//! - [`twisted`]: the delta-fixed (signed coefficient) variant
//! - [`store`]: the hash-consed compressed polynomial store
//! - [`wgraph`], [`filekl`]: W-graph, cells and persistence

pub mod bitset;
pub mod block;
pub mod error;
pub mod filekl;
pub mod kl;
pub mod polynomial;
pub mod store;
pub mod support;
pub mod twisted;
pub mod wgraph;

pub use block::{Block, BlockBuilder, BlockData, BlockElt, DescentStatus, Length, MuCoeff, UNDEF_BLOCK};
pub use error::{KlError, Result};
pub use kl::KlContext;
pub use store::{KlIndex, KlStore, StoreParams};
pub use twisted::{DeltaBlock, DeltaBlockData, TwistedDescent, TwistedKlContext};
pub use wgraph::{DecomposedWGraph, WGraph};
