//! Block interface consumed by the KL engines.
//!
//! A block is a finite labelled graph over indices `0..size`: per generator a
//! cross action and (partial) Cayley transforms, per (generator, element) an
//! eight-valued descent status, and a length function compatible with the
//! index order. The engines borrow a block read-only for their whole
//! lifetime; [`BlockData`] is the owned in-memory implementation, validated
//! on construction.

use crate::bitset::RankFlags;
use crate::error::{KlError, Result};

/// Index of a block element.
pub type BlockElt = u32;

/// Sentinel for "no such element".
pub const UNDEF_BLOCK: BlockElt = u32::MAX;

pub type Length = u32;

/// Leading coefficient of a KL polynomial at the degree bound.
pub type MuCoeff = u32;

/// Descent status of one generator at one block element.
///
/// Values 4..=7 are descents; `ComplexDescent` and `RealTypeI` admit direct
/// recursion. The numbering is fixed by the persisted descent words, the
/// predicates do not otherwise depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescentStatus {
    ComplexAscent = 0,
    RealNonparity = 1,
    ImaginaryTypeI = 2,
    ImaginaryTypeII = 3,
    ImaginaryCompact = 4,
    ComplexDescent = 5,
    RealTypeII = 6,
    RealTypeI = 7,
}

impl DescentStatus {
    pub fn from_u8(v: u8) -> Option<DescentStatus> {
        use DescentStatus::*;
        Some(match v {
            0 => ComplexAscent,
            1 => RealNonparity,
            2 => ImaginaryTypeI,
            3 => ImaginaryTypeII,
            4 => ImaginaryCompact,
            5 => ComplexDescent,
            6 => RealTypeII,
            7 => RealTypeI,
            _ => return None,
        })
    }

    /// Descents reduce length; they make up the tau invariant.
    #[inline]
    pub fn is_descent(self) -> bool {
        self as u8 & 0x4 != 0
    }

    /// Complex descents and real type I admit the simple recursion formula.
    #[inline]
    pub fn is_direct_recursion(self) -> bool {
        self as u8 & 0x5 == 0x5
    }

    /// Ascents with an easy upward recursion; excludes `ImaginaryTypeII`.
    #[inline]
    pub fn is_good_ascent(self) -> bool {
        !self.is_descent() && self != DescentStatus::ImaginaryTypeII
    }
}

/// Read-only view of a block, borrowed by the KL engine.
pub trait Block {
    fn size(&self) -> BlockElt;
    fn rank(&self) -> usize;
    fn length(&self, x: BlockElt) -> Length;

    /// Cross action; total, an involution, the identity for
    /// `ImaginaryCompact` and `RealNonparity`.
    fn cross(&self, s: usize, x: BlockElt) -> BlockElt;

    /// Cayley transform; defined for `ImaginaryTypeI` (single image, second
    /// slot `UNDEF_BLOCK`) and `ImaginaryTypeII` (ordered pair).
    fn cayley(&self, s: usize, x: BlockElt) -> (BlockElt, BlockElt);

    /// Inverse Cayley transform; defined for `RealTypeI` and `RealTypeII`.
    fn inverse_cayley(&self, s: usize, x: BlockElt) -> (BlockElt, BlockElt);

    fn descent_value(&self, s: usize, x: BlockElt) -> DescentStatus;

    /// Generators whose status at `x` is a descent.
    fn descent_set(&self, x: BlockElt) -> RankFlags {
        let mut d = RankFlags::EMPTY;
        for s in 0..self.rank() {
            if self.descent_value(s, x).is_descent() {
                d.set(s);
            }
        }
        d
    }

    /// Largest length occurring in the block (0 for the empty-rank cases).
    fn max_length(&self) -> Length {
        if self.size() == 0 {
            0
        } else {
            self.length(self.size() - 1)
        }
    }
}

/// Owned block tables: dense `size * rank` rows for status, cross and Cayley
/// transforms, with inverse Cayley tables derived from the forward ones.
pub struct BlockData {
    rank: usize,
    lengths: Vec<Length>,
    status: Vec<DescentStatus>,
    cross: Vec<BlockElt>,
    cayley: Vec<(BlockElt, BlockElt)>,
    inverse_cayley: Vec<(BlockElt, BlockElt)>,
}

impl BlockData {
    /// Validate the tables and derive the inverse Cayley transforms.
    pub fn new(
        rank: usize,
        lengths: Vec<Length>,
        status: Vec<DescentStatus>,
        cross: Vec<BlockElt>,
        cayley: Vec<(BlockElt, BlockElt)>,
    ) -> Result<BlockData> {
        let n = lengths.len();
        if rank > 32 {
            return Err(KlError::Input(format!("rank {rank} exceeds 32")));
        }
        if status.len() != n * rank || cross.len() != n * rank || cayley.len() != n * rank {
            return Err(KlError::Input("table sizes disagree with size * rank".into()));
        }
        if lengths.windows(2).any(|w| w[0] > w[1]) {
            return Err(KlError::Input("lengths not sorted by block index".into()));
        }

        let mut inverse_cayley = vec![(UNDEF_BLOCK, UNDEF_BLOCK); n * rank];
        let mut push_preimage = |slot: &mut (BlockElt, BlockElt), x: BlockElt| {
            if slot.0 == UNDEF_BLOCK {
                slot.0 = x;
                Ok(())
            } else if slot.1 == UNDEF_BLOCK {
                slot.1 = x;
                Ok(())
            } else {
                Err(KlError::Input("more than two Cayley preimages".into()))
            }
        };

        for x in 0..n as BlockElt {
            for s in 0..rank {
                let i = x as usize * rank + s;
                let v = status[i];
                let cx = cross[i];
                if cx == UNDEF_BLOCK || cx as usize >= n {
                    return Err(KlError::Input(format!("cross({s},{x}) out of range")));
                }
                if cross[cx as usize * rank + s] != x {
                    return Err(KlError::Input(format!("cross({s},·) is not an involution at {x}")));
                }
                let delta = lengths[cx as usize] as i64 - lengths[x as usize] as i64;
                match v {
                    DescentStatus::ComplexAscent if delta != 1 => {
                        return Err(KlError::Input(format!("complex ascent at ({s},{x}) must raise length")));
                    }
                    DescentStatus::ComplexDescent if delta != -1 => {
                        return Err(KlError::Input(format!("complex descent at ({s},{x}) must lower length")));
                    }
                    DescentStatus::ImaginaryCompact | DescentStatus::RealNonparity if cx != x => {
                        return Err(KlError::Input(format!("cross({s},{x}) must fix a compact/nonparity element")));
                    }
                    _ => {}
                }

                let (c1, c2) = cayley[i];
                match v {
                    DescentStatus::ImaginaryTypeI => {
                        if c1 == UNDEF_BLOCK || c1 as usize >= n || c2 != UNDEF_BLOCK {
                            return Err(KlError::Input(format!("type I Cayley at ({s},{x}) must have one image")));
                        }
                        if lengths[c1 as usize] != lengths[x as usize] + 1 {
                            return Err(KlError::Input(format!("Cayley at ({s},{x}) must raise length by one")));
                        }
                        push_preimage(&mut inverse_cayley[c1 as usize * rank + s], x)?;
                    }
                    DescentStatus::ImaginaryTypeII => {
                        if c1 == UNDEF_BLOCK || c2 == UNDEF_BLOCK || c1 as usize >= n || c2 as usize >= n || c1 == c2 {
                            return Err(KlError::Input(format!("type II Cayley at ({s},{x}) must have two images")));
                        }
                        if lengths[c1 as usize] != lengths[x as usize] + 1
                            || lengths[c2 as usize] != lengths[x as usize] + 1
                        {
                            return Err(KlError::Input(format!("Cayley at ({s},{x}) must raise length by one")));
                        }
                        push_preimage(&mut inverse_cayley[c1 as usize * rank + s], x)?;
                        push_preimage(&mut inverse_cayley[c2 as usize * rank + s], x)?;
                    }
                    _ => {
                        if c1 != UNDEF_BLOCK || c2 != UNDEF_BLOCK {
                            return Err(KlError::Input(format!("Cayley defined at non-imaginary ({s},{x})")));
                        }
                    }
                }
            }
        }

        // every real descent needs a Cayley preimage for the recursion
        for x in 0..n as BlockElt {
            for s in 0..rank {
                let i = x as usize * rank + s;
                if matches!(status[i], DescentStatus::RealTypeI | DescentStatus::RealTypeII)
                    && inverse_cayley[i].0 == UNDEF_BLOCK
                {
                    return Err(KlError::Input(format!("real descent at ({s},{x}) without Cayley preimage")));
                }
            }
        }

        Ok(BlockData {
            rank,
            lengths,
            status,
            cross,
            cayley,
            inverse_cayley,
        })
    }

    #[inline]
    fn idx(&self, s: usize, x: BlockElt) -> usize {
        x as usize * self.rank + s
    }
}

impl Block for BlockData {
    #[inline]
    fn size(&self) -> BlockElt {
        self.lengths.len() as BlockElt
    }

    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn length(&self, x: BlockElt) -> Length {
        self.lengths[x as usize]
    }

    #[inline]
    fn cross(&self, s: usize, x: BlockElt) -> BlockElt {
        self.cross[self.idx(s, x)]
    }

    #[inline]
    fn cayley(&self, s: usize, x: BlockElt) -> (BlockElt, BlockElt) {
        self.cayley[self.idx(s, x)]
    }

    #[inline]
    fn inverse_cayley(&self, s: usize, x: BlockElt) -> (BlockElt, BlockElt) {
        self.inverse_cayley[self.idx(s, x)]
    }

    #[inline]
    fn descent_value(&self, s: usize, x: BlockElt) -> DescentStatus {
        self.status[self.idx(s, x)]
    }
}

/// Incremental construction of a [`BlockData`], mainly for tests and small
/// hand-built blocks. Every (generator, element) pair must be `set` before
/// `build`; Cayley slots default to undefined.
pub struct BlockBuilder {
    rank: usize,
    lengths: Vec<Length>,
    status: Vec<DescentStatus>,
    cross: Vec<BlockElt>,
    cayley: Vec<(BlockElt, BlockElt)>,
}

impl BlockBuilder {
    pub fn new(rank: usize) -> Self {
        BlockBuilder {
            rank,
            lengths: Vec::new(),
            status: Vec::new(),
            cross: Vec::new(),
            cayley: Vec::new(),
        }
    }

    /// Append an element of the given length, returning its index.
    pub fn add(&mut self, length: Length) -> BlockElt {
        let x = self.lengths.len() as BlockElt;
        self.lengths.push(length);
        self.status.extend(std::iter::repeat(DescentStatus::ComplexAscent).take(self.rank));
        self.cross.extend(std::iter::repeat(UNDEF_BLOCK).take(self.rank));
        self.cayley
            .extend(std::iter::repeat((UNDEF_BLOCK, UNDEF_BLOCK)).take(self.rank));
        x
    }

    pub fn set(&mut self, s: usize, x: BlockElt, status: DescentStatus, cross: BlockElt) {
        let i = x as usize * self.rank + s;
        self.status[i] = status;
        self.cross[i] = cross;
    }

    pub fn set_cayley(&mut self, s: usize, x: BlockElt, c1: BlockElt, c2: BlockElt) {
        self.cayley[x as usize * self.rank + s] = (c1, c2);
    }

    pub fn build(self) -> Result<BlockData> {
        BlockData::new(self.rank, self.lengths, self.status, self.cross, self.cayley)
    }
}
