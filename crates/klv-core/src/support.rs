//! Precomputed per-block support data for the KL fill.
//!
//! Built once before any row is computed: per-element descent and good-ascent
//! generator sets, per-generator down-set and prim-set bitmaps (the latter
//! adds the `ImaginaryTypeII` columns, which survive row primitivisation
//! because they admit no easy ascent recursion), and the length-first table.

use crate::bitset::{BitMap, RankFlags};
use crate::block::{Block, BlockElt, DescentStatus, Length, UNDEF_BLOCK};

pub struct KlSupport<'a> {
    block: &'a dyn Block,
    descent: Vec<RankFlags>,
    good_ascent: Vec<RankFlags>,
    downset: Vec<BitMap>,
    primset: Vec<BitMap>,
    /// `length_less[l]` is the first index of length at least `l`;
    /// the final entry is the block size.
    length_less: Vec<BlockElt>,
}

impl<'a> KlSupport<'a> {
    pub fn new(block: &'a dyn Block) -> Self {
        let n = block.size() as usize;
        let rank = block.rank();

        let mut descent = vec![RankFlags::EMPTY; n];
        let mut good_ascent = vec![RankFlags::EMPTY; n];
        let mut downset = Vec::with_capacity(rank);
        let mut primset = Vec::with_capacity(rank);

        for s in 0..rank {
            let mut down = BitMap::new(n);
            let mut prim = BitMap::new(n);
            for x in 0..n as BlockElt {
                let v = block.descent_value(s, x);
                if v.is_descent() {
                    down.insert(x as usize);
                    prim.insert(x as usize);
                    descent[x as usize].set(s);
                } else {
                    if v == DescentStatus::ImaginaryTypeII {
                        prim.insert(x as usize);
                    } else {
                        good_ascent[x as usize].set(s);
                    }
                }
            }
            downset.push(down);
            primset.push(prim);
        }

        let max_len = block.max_length() as usize;
        let mut length_less = vec![0 as BlockElt; max_len + 2];
        let mut cur = 0usize;
        for x in 0..n as BlockElt {
            let l = block.length(x) as usize;
            while cur < l {
                cur += 1;
                length_less[cur] = x;
            }
        }
        for l in cur + 1..=max_len + 1 {
            length_less[l] = n as BlockElt;
        }

        KlSupport {
            block,
            descent,
            good_ascent,
            downset,
            primset,
            length_less,
        }
    }

    #[inline]
    pub fn block(&self) -> &'a dyn Block {
        self.block
    }

    #[inline]
    pub fn size(&self) -> BlockElt {
        self.block.size()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.block.rank()
    }

    #[inline]
    pub fn length(&self, x: BlockElt) -> Length {
        self.block.length(x)
    }

    #[inline]
    pub fn descent_set(&self, x: BlockElt) -> RankFlags {
        self.descent[x as usize]
    }

    #[inline]
    pub fn good_ascent_set(&self, x: BlockElt) -> RankFlags {
        self.good_ascent[x as usize]
    }

    /// First index of length at least `l` (block size beyond the maximum).
    #[inline]
    pub fn length_less(&self, l: usize) -> BlockElt {
        let top = self.length_less.len() - 1;
        self.length_less[l.min(top)]
    }

    pub fn max_length(&self) -> Length {
        self.block.max_length()
    }

    /// Keep only elements with every generator of `d` a proper descent.
    pub fn extremalize(&self, map: &mut BitMap, d: RankFlags) {
        for s in d.iter() {
            map.intersect_with(&self.downset[s]);
        }
    }

    /// Keep only elements with every generator of `d` a descent or an
    /// `ImaginaryTypeII` ascent.
    pub fn primitivize(&self, map: &mut BitMap, d: RankFlags) {
        for s in d.iter() {
            map.intersect_with(&self.primset[s]);
        }
    }

    /// Follow good ascents inside `a` until none remain. Returns
    /// `UNDEF_BLOCK` when a `RealNonparity` ascent is hit; the polynomial is
    /// zero in that case.
    pub fn primitivize_elt(&self, x: BlockElt, a: RankFlags) -> BlockElt {
        let mut x = x;
        loop {
            let g = self.good_ascent[x as usize].intersect(a);
            if !g.any() {
                return x;
            }
            let s = g.first_bit();
            match self.block.descent_value(s, x) {
                DescentStatus::RealNonparity => return UNDEF_BLOCK,
                DescentStatus::ComplexAscent => x = self.block.cross(s, x),
                DescentStatus::ImaginaryTypeI => x = self.block.cayley(s, x).0,
                // good ascents are exactly the three cases above
                _ => unreachable!("good ascent with descent status"),
            }
        }
    }
}
