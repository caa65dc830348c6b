//! Twisted KL engine on a delta-fixed sub-block (complex-group case).
//!
//! The sub-block carries one generator per delta-orbit; its cross action
//! moves length by one (semi-imaginary / semi-real) or two (two-complex).
//! Only a two-complex descent, where the length drops by two, admits direct
//! recursion; rows without one are trivial. Coefficients are signed, and two
//! mu tables are kept: `mu` for odd length gaps, `mu_` for even ones.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::bitset::{BitMap, RankFlags};
use crate::block::{BlockElt, Length};
use crate::error::{KlError, Result};
use crate::polynomial::{Poly, PolyError};
use crate::store::KlIndex;

/// Signed coefficient ring of the twisted engine.
pub type HKlCoeff = i32;

pub type HMuRow = Vec<(BlockElt, HKlCoeff)>;

/// Descent status of a delta-orbit generator, derived from the cross length
/// delta; values 2 and 3 are descents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TwistedDescent {
    TwoComplexAscent = 0,
    TwoSemiImaginary = 1,
    TwoComplexDescent = 2,
    TwoSemiReal = 3,
}

impl TwistedDescent {
    #[inline]
    pub fn is_descent(self) -> bool {
        self as u8 & 0x2 != 0
    }
}

/// Read-only view of a delta-fixed sub-block.
pub trait DeltaBlock {
    fn size(&self) -> BlockElt;
    fn rank(&self) -> usize;
    /// Length inherited from the ambient block.
    fn length(&self, j: BlockElt) -> Length;
    /// Cross action of a delta-orbit generator; an involution moving length
    /// by one or two.
    fn cross(&self, s: usize, j: BlockElt) -> BlockElt;

    fn descent_value(&self, s: usize, j: BlockElt) -> TwistedDescent {
        let d = self.length(self.cross(s, j)) as i64 - self.length(j) as i64;
        match d {
            2 => TwistedDescent::TwoComplexAscent,
            1 => TwistedDescent::TwoSemiImaginary,
            -1 => TwistedDescent::TwoSemiReal,
            _ => TwistedDescent::TwoComplexDescent,
        }
    }
}

/// Owned delta-fixed sub-block tables. Construction rejects anything outside
/// the complex-group case: every cross length delta must be one of
/// -2, -1, +1, +2.
pub struct DeltaBlockData {
    rank: usize,
    lengths: Vec<Length>,
    cross: Vec<BlockElt>,
}

impl DeltaBlockData {
    pub fn new(rank: usize, lengths: Vec<Length>, cross: Vec<BlockElt>) -> Result<DeltaBlockData> {
        let n = lengths.len();
        if rank > 32 {
            return Err(KlError::Input(format!("rank {rank} exceeds 32")));
        }
        if cross.len() != n * rank {
            return Err(KlError::Input("cross table size disagrees with size * rank".into()));
        }
        if lengths.windows(2).any(|w| w[0] > w[1]) {
            return Err(KlError::Input("lengths not sorted by block index".into()));
        }
        for x in 0..n as BlockElt {
            for s in 0..rank {
                let cx = cross[x as usize * rank + s];
                if cx as usize >= n {
                    return Err(KlError::Input(format!("cross({s},{x}) out of range")));
                }
                if cross[cx as usize * rank + s] != x {
                    return Err(KlError::Input(format!("cross({s},·) is not an involution at {x}")));
                }
                let d = lengths[cx as usize] as i64 - lengths[x as usize] as i64;
                if !matches!(d, -2 | -1 | 1 | 2) {
                    return Err(KlError::Input(format!(
                        "cross({s},{x}) moves length by {d}; only the complex-group case is supported"
                    )));
                }
            }
        }
        Ok(DeltaBlockData { rank, lengths, cross })
    }
}

impl DeltaBlock for DeltaBlockData {
    #[inline]
    fn size(&self) -> BlockElt {
        self.lengths.len() as BlockElt
    }

    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn length(&self, j: BlockElt) -> Length {
        self.lengths[j as usize]
    }

    #[inline]
    fn cross(&self, s: usize, j: BlockElt) -> BlockElt {
        self.cross[j as usize * self.rank + s]
    }
}

pub struct TwistedKlContext<'a> {
    block: &'a dyn DeltaBlock,
    descent: Vec<RankFlags>,
    ascent: Vec<RankFlags>,
    downset: Vec<BitMap>,
    ll: Vec<BlockElt>,
    prim: Vec<Vec<BlockElt>>,
    kl: Vec<Vec<KlIndex>>,
    store: Vec<Poly<HKlCoeff>>,
    pmap: FxHashMap<Poly<HKlCoeff>, KlIndex>,
    mu: Vec<HMuRow>,
    mu_: Vec<HMuRow>,
    filled: bool,
}

fn arith(x: BlockElt, y: BlockElt) -> impl Fn(PolyError) -> KlError {
    move |e| match e {
        PolyError::Underflow => KlError::NegativeCoefficient { x, y },
        PolyError::Overflow => KlError::DegreeOverflow { x, y },
    }
}

impl<'a> TwistedKlContext<'a> {
    pub fn new(block: &'a dyn DeltaBlock) -> Result<Self> {
        let n = block.size() as usize;
        let rank = block.rank();
        for x in 1..block.size() {
            if block.length(x - 1) > block.length(x) {
                return Err(KlError::Input("sub-block indices not sorted by length".into()));
            }
        }

        let mut descent = vec![RankFlags::EMPTY; n];
        let mut ascent = vec![RankFlags::EMPTY; n];
        let mut downset = Vec::with_capacity(rank);
        for s in 0..rank {
            let mut down = BitMap::new(n);
            for x in 0..n as BlockElt {
                if block.cross(s, x) < x {
                    down.insert(x as usize);
                    descent[x as usize].set(s);
                } else {
                    ascent[x as usize].set(s);
                }
            }
            downset.push(down);
        }

        let max_len = if n == 0 { 0 } else { block.length(n as BlockElt - 1) as usize };
        let mut ll = vec![0 as BlockElt; max_len + 2];
        let mut cur = 0usize;
        for x in 0..n as BlockElt {
            let l = block.length(x) as usize;
            while cur < l {
                cur += 1;
                ll[cur] = x;
            }
        }
        for l in cur + 1..=max_len + 1 {
            ll[l] = n as BlockElt;
        }

        let mut store = Vec::with_capacity(2);
        let mut pmap = FxHashMap::default();
        store.push(Poly::zero());
        pmap.insert(Poly::zero(), 0);
        store.push(Poly::one());
        pmap.insert(Poly::one(), 1);

        Ok(TwistedKlContext {
            block,
            descent,
            ascent,
            downset,
            ll,
            prim: vec![Vec::new(); n],
            kl: vec![Vec::new(); n],
            store,
            pmap,
            mu: vec![Vec::new(); n],
            mu_: vec![Vec::new(); n],
            filled: false,
        })
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
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Distinct polynomials discovered so far.
    pub fn pol_list(&self) -> &[Poly<HKlCoeff>] {
        &self.store
    }

    pub fn primitive_row(&self, y: BlockElt) -> &[BlockElt] {
        &self.prim[y as usize]
    }

    fn ll(&self, l: usize) -> BlockElt {
        self.ll[l.min(self.ll.len() - 1)]
    }

    /// Follow ascents inside `ds` by the cross action.
    fn primitivize_elt(&self, x: BlockElt, ds: RankFlags) -> BlockElt {
        let mut x = x;
        loop {
            let a = self.ascent[x as usize].intersect(ds);
            if !a.any() {
                return x;
            }
            x = self.block.cross(a.first_bit(), x);
        }
    }

    /// Row lookup against computed rows.
    fn pol_in_row(&self, x: BlockElt, y: BlockElt) -> &Poly<HKlCoeff> {
        let x = self.primitivize_elt(x, self.descent[y as usize]);
        if x > y {
            return &self.store[0];
        }
        match self.prim[y as usize].binary_search(&x) {
            Ok(i) => &self.store[self.kl[y as usize][i] as usize],
            Err(_) => &self.store[0],
        }
    }

    /// The twisted polynomial `P(x, y)`; `NotFilled` before `fill()`.
    pub fn kl_pol(&self, x: BlockElt, y: BlockElt) -> Result<&Poly<HKlCoeff>> {
        if x >= self.size() || y >= self.size() {
            return Err(KlError::Input(format!("pair ({x},{y}) out of range")));
        }
        if !self.filled {
            return Err(KlError::NotFilled { y });
        }
        Ok(self.pol_in_row(x, y))
    }

    /// Odd-gap mu coefficient.
    pub fn mu(&self, x: BlockElt, y: BlockElt) -> Result<HKlCoeff> {
        if !self.filled {
            return Err(KlError::NotFilled { y });
        }
        Ok(self.mu[y as usize]
            .iter()
            .find(|e| e.0 == x)
            .map_or(0, |e| e.1))
    }

    /// Even-gap mu coefficient.
    pub fn mu_even(&self, x: BlockElt, y: BlockElt) -> Result<HKlCoeff> {
        if !self.filled {
            return Err(KlError::NotFilled { y });
        }
        Ok(self.mu_[y as usize]
            .iter()
            .find(|e| e.0 == x)
            .map_or(0, |e| e.1))
    }

    pub fn mu_row(&self, y: BlockElt) -> &HMuRow {
        &self.mu[y as usize]
    }

    pub fn mu_even_row(&self, y: BlockElt) -> &HMuRow {
        &self.mu_[y as usize]
    }

    /// First generator whose descent drops the length by two; `None` means
    /// the row is trivial.
    fn find_root(&self, y: BlockElt) -> Option<usize> {
        let ylen = self.length(y) as usize;
        let ymax = self.ll(ylen - 1);
        (0..self.rank()).find(|&s| {
            self.descent[y as usize].test(s) && self.block.cross(s, y) < ymax
        })
    }

    fn make_primitive_row(&self, y: BlockElt) -> Vec<BlockElt> {
        let n = self.size() as usize;
        let mut map = BitMap::new(n);
        map.fill_below(self.ll(self.length(y) as usize) as usize);
        map.insert(y as usize);
        for s in self.descent[y as usize].iter() {
            map.intersect_with(&self.downset[s]);
        }
        map.iter().map(|i| i as BlockElt).collect()
    }

    fn insert_poly(&mut self, p: Poly<HKlCoeff>) -> KlIndex {
        if let Some(&i) = self.pmap.get(&p) {
            return i;
        }
        let i = self.store.len() as KlIndex;
        self.store.push(p.clone());
        self.pmap.insert(p, i);
        i
    }

    fn write_row(&mut self, klv: Vec<Poly<HKlCoeff>>, prow: Vec<BlockElt>, y: BlockElt) {
        let mut row = Vec::with_capacity(klv.len());
        for p in klv {
            row.push(self.insert_poly(p));
        }
        self.kl[y as usize] = row;
        self.prim[y as usize] = prow;
    }

    /// Compute every row by induction on length.
    pub fn fill(&mut self) -> Result<()> {
        if self.filled {
            return Ok(());
        }
        let n = self.size();
        debug!(size = n, rank = self.rank(), "twisted kl fill start");
        if n == 0 {
            self.filled = true;
            return Ok(());
        }

        // base rows at length zero
        let l0 = self.ll(1);
        for j in 0..l0 {
            self.prim[j as usize] = vec![j];
            self.kl[j as usize] = vec![1];
        }

        let maxlen = self.length(n - 1) as usize;
        for l in 1..=maxlen {
            let lmax = self.ll(l + 1);
            for j in self.ll(l)..lmax {
                self.fill_row(j)?;
                self.fill_mu_row(j);
            }
        }
        self.filled = true;
        debug!(polynomials = self.store.len(), "twisted kl fill done");
        Ok(())
    }

    fn fill_row(&mut self, y: BlockElt) -> Result<()> {
        let root = self.find_root(y);
        let prow = self.make_primitive_row(y);
        let psize = prow.len();
        let mut klv = vec![Poly::zero(); psize];

        if let Some(s) = root {
            let sy = self.block.cross(s, y);
            for k in 0..psize - 1 {
                let z = prow[k];
                let sz = self.block.cross(s, z);
                let pszsy = self.pol_in_row(sz, sy).as_ref();
                let pzsy = self.pol_in_row(z, sy).as_ref();
                let mut p = Poly::zero();
                if self.length(z) - self.length(sz) == 1 {
                    // type I: (q+1) P(sz,sy) + (q^2 - q) P(z,sy)
                    p.add_scaled(pszsy, 1, 0).map_err(arith(z, y))?;
                    p.add_scaled(pszsy, 1, 1).map_err(arith(z, y))?;
                    p.add_scaled(pzsy, 1, 2).map_err(arith(z, y))?;
                    p.sub_scaled(pzsy, 1, 1).map_err(arith(z, y))?;
                } else {
                    // type II: P(sz,sy) + q^2 P(z,sy)
                    p.add_scaled(pszsy, 1, 0).map_err(arith(z, y))?;
                    p.add_scaled(pzsy, 1, 2).map_err(arith(z, y))?;
                }
                klv[k] = p;
            }
        }
        klv[psize - 1] = Poly::one();

        if let Some(s) = root {
            self.mu_correction(&mut klv, &prow, y, s)?;
        }
        self.write_row(klv, prow, y);
        Ok(())
    }

    /// The three correction terms of the twisted recursion, against the mu
    /// tables of `w = cross(s, y)`: the ordinary mu term, the neighbour term
    /// through `cross(s, z)`, the even-gap term, and the mu convolution.
    fn mu_correction(
        &self,
        klv: &mut [Poly<HKlCoeff>],
        prow: &[BlockElt],
        y: BlockElt,
        s: usize,
    ) -> Result<()> {
        let w = self.block.cross(s, y);
        let wlen = self.length(w);
        let psize = prow.len() - 1;

        for &(z, m) in &self.mu[w as usize] {
            let sz = self.block.cross(s, z);
            let zlen = self.length(z);
            let szlen = self.length(sz);
            let diff = wlen - zlen;

            if szlen < zlen {
                // -m (q^(d+1) + q^d) P(x, z)
                let d = ((diff + 1) / 2) as usize;
                for k in 0..psize {
                    let x = self.block.cross(s, prow[k]);
                    if self.length(x) > zlen {
                        break;
                    }
                    let pxz = self.pol_in_row(x, z).as_ref();
                    if pxz.is_zero() {
                        continue;
                    }
                    klv[k].sub_scaled(pxz, m, d).map_err(arith(x, y))?;
                    klv[k].sub_scaled(pxz, m, d + 1).map_err(arith(x, y))?;
                }
            } else if szlen == zlen + 1 {
                // -m q^d P(x, cross(s,z))
                let d = ((diff + 2) / 2) as usize;
                for k in 0..psize {
                    let x = self.block.cross(s, prow[k]);
                    if self.length(x) > zlen {
                        break;
                    }
                    let pxsz = self.pol_in_row(x, sz).as_ref();
                    if pxsz.is_zero() {
                        continue;
                    }
                    klv[k].sub_scaled(pxsz, m, d).map_err(arith(x, y))?;
                }
            }
        }

        for &(z, m) in &self.mu_[w as usize] {
            let sz = self.block.cross(s, z);
            let zlen = self.length(z);
            if self.length(sz) > zlen {
                continue;
            }
            let d = ((wlen - zlen + 2) / 2) as usize;
            for k in 0..psize {
                let x = self.block.cross(s, prow[k]);
                if self.length(x) > zlen {
                    break;
                }
                let pxz = self.pol_in_row(x, z).as_ref();
                if pxz.is_zero() {
                    continue;
                }
                klv[k].sub_scaled(pxz, m, d).map_err(arith(x, y))?;
            }
        }

        // convolution term: mu(v,z) mu(z,w) over pairs going down under s
        for &(z, mzw) in &self.mu[w as usize] {
            if self.length(self.block.cross(s, z)) > self.length(z) {
                continue;
            }
            for &(v, mvz) in &self.mu[z as usize] {
                if self.length(self.block.cross(s, v)) > self.length(v) {
                    continue;
                }
                let m = mzw.checked_mul(mvz).ok_or(KlError::DegreeOverflow { x: v, y })?;
                let d = ((wlen - self.length(v) + 2) / 2) as usize;
                for k in 0..psize {
                    let x = self.block.cross(s, prow[k]);
                    if self.length(x) > self.length(v) {
                        break;
                    }
                    let pxv = self.pol_in_row(x, v).as_ref();
                    if pxv.is_zero() {
                        continue;
                    }
                    klv[k].add_scaled(pxv, m, d).map_err(arith(x, y))?;
                }
            }
        }
        Ok(())
    }

    /// Populate `mu` and `mu_` for a freshly written row. Even-gap entries
    /// are guarded by a seen bitmap so neighbour sweeps cannot duplicate
    /// them.
    fn fill_mu_row(&mut self, y: BlockElt) {
        let rank = self.rank();
        let ylen = self.length(y);
        let psize = self.prim[y as usize].len() - 1;
        let mut seen = vec![false; self.size() as usize];
        let mut row: HMuRow = Vec::new();
        let mut row_even: HMuRow = Vec::new();

        for i in 0..psize {
            let x = self.prim[y as usize][i];
            let xlen = self.length(x);
            let d = ((ylen - xlen - 1) / 2) as usize;

            if (ylen - xlen) % 2 == 1 {
                // even-gap neighbours one length down need not be primitive
                for s in 0..rank {
                    let z = self.block.cross(s, x);
                    if seen[z as usize] {
                        continue;
                    }
                    if self.length(z) + 1 == xlen {
                        let p = self.pol_in_row(z, y);
                        if p.degree() == Some(d) {
                            row_even.push((z, p.coef_at(d)));
                            seen[z as usize] = true;
                        }
                    }
                }
                let p = &self.store[self.kl[y as usize][i] as usize];
                if p.degree() == Some(d) {
                    row.push((x, p.coef_at(d)));
                }
            } else {
                if seen[x as usize] {
                    continue;
                }
                let p = &self.store[self.kl[y as usize][i] as usize];
                if p.degree() == Some(d) {
                    row_even.push((x, p.coef_at(d)));
                    seen[x as usize] = true;
                }
            }
        }

        // cross neighbours at gaps one and two enter by constant term
        for s in 0..rank {
            let x = self.block.cross(s, y);
            let xlen = self.length(x);
            if xlen >= ylen {
                continue;
            }
            let gap = ylen - xlen;
            if gap == 1 {
                let c = self.pol_in_row(x, y).coef_at(0);
                if c != 0 {
                    row.push((x, c));
                }
            } else if gap == 2 && !seen[x as usize] {
                let c = self.pol_in_row(x, y).coef_at(0);
                if c != 0 {
                    row_even.push((x, c));
                    seen[x as usize] = true;
                }
            }
        }

        self.mu[y as usize] = row;
        self.mu_[y as usize] = row_even;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delta-fixed sub-block of the rank two complex group under the
    /// flipping involution: the four involutions of the Weyl group, lengths
    /// 0, 1, 1, 3.
    fn complex_a2_fixed() -> DeltaBlockData {
        DeltaBlockData::new(
            2,
            vec![0, 1, 1, 3],
            vec![
                1, 2, // e: both semi-imaginary
                0, 3, // s1: semi-real, two-complex ascent
                3, 0, // s2: two-complex ascent, semi-real
                2, 1, // w0: two-complex descents
            ],
        )
        .unwrap()
    }

    #[test]
    fn statuses_follow_length_deltas() {
        let blk = complex_a2_fixed();
        assert_eq!(blk.descent_value(0, 0), TwistedDescent::TwoSemiImaginary);
        assert_eq!(blk.descent_value(0, 1), TwistedDescent::TwoSemiReal);
        assert_eq!(blk.descent_value(1, 1), TwistedDescent::TwoComplexAscent);
        assert_eq!(blk.descent_value(0, 3), TwistedDescent::TwoComplexDescent);
        assert!(blk.descent_value(0, 3).is_descent());
        assert!(!blk.descent_value(0, 0).is_descent());
    }

    #[test]
    fn rejects_non_complex_cross_deltas() {
        // a fixed point of the cross action has delta zero
        let r = DeltaBlockData::new(1, vec![0, 1], vec![0, 1]);
        assert!(matches!(r, Err(KlError::Input(_))));
    }

    #[test]
    fn fixed_sub_block_fill() {
        let blk = complex_a2_fixed();
        let mut ctx = TwistedKlContext::new(&blk).unwrap();
        assert!(matches!(ctx.kl_pol(0, 3), Err(KlError::NotFilled { .. })));
        ctx.fill().unwrap();

        // all polynomials here are 0 or 1
        for x in 0..4 {
            for y in x..4 {
                let p = ctx.kl_pol(x, y).unwrap();
                if !p.is_zero() {
                    assert_eq!(p.degree(), Some(0), "P({x},{y})");
                    assert_eq!(p.coef_at(0), 1);
                }
            }
        }
        assert_eq!(ctx.kl_pol(0, 3).unwrap().coef_at(0), 1);
        assert_eq!(ctx.kl_pol(1, 3).unwrap().coef_at(0), 1);
        assert!(ctx.kl_pol(1, 2).unwrap().is_zero());

        // semi-real rows are trivial, the top row keeps only itself
        assert_eq!(ctx.primitive_row(1), &[1]);
        assert_eq!(ctx.primitive_row(3), &[3]);

        // mu tables of the sub-block
        assert_eq!(ctx.mu_row(1), &vec![(0, 1)]);
        assert_eq!(ctx.mu_row(2), &vec![(0, 1)]);
        assert_eq!(ctx.mu_row(3), &vec![]);
        let mut even: Vec<_> = ctx.mu_even_row(3).clone();
        even.sort_unstable_by_key(|e| e.0);
        assert_eq!(even, vec![(1, 1), (2, 1)]);

        // leading coefficients stay positive
        for p in ctx.pol_list() {
            if let Some(d) = p.degree() {
                assert!(p.coef_at(d) > 0);
            }
        }
    }
}
