//! The untwisted KL engine: row-by-row computation of the polynomials
//! `P(x, y)` over a borrowed block.
//!
//! Rows are filled in ascending block order. A row with a complex descent or
//! real type I descent is computed by the direct recursion over its extremal
//! elements, followed by the mu correction against the row one length down
//! and completion of the `ImaginaryTypeII` columns by Cayley pairs. Rows
//! whose descents are all `ImaginaryCompact`/`RealTypeII` go through the
//! extended recursion, which walks the primitive row top-down and solves for
//! each entry from a `RealNonparity` generator of `y`.
//!
//! Only primitive columns with a non-zero polynomial are stored; lookups
//! primitivise the column first and substitute zero on a miss.

use tracing::debug;

use crate::bitset::{BitMap, RankFlags};
use crate::block::{Block, BlockElt, DescentStatus, Length, MuCoeff, UNDEF_BLOCK};
use crate::error::{KlError, Result};
use crate::polynomial::{PolRef, Poly, PolyError};
use crate::store::{KlIndex, KlStore, StoreParams, KL_ONE, KL_ZERO};
use crate::support::KlSupport;

/// Non-zero mu coefficients of one row, sorted by column.
pub type MuRow = Vec<(BlockElt, MuCoeff)>;

pub struct KlContext<'a> {
    support: KlSupport<'a>,
    prim: Vec<Vec<BlockElt>>,
    kl: Vec<Vec<KlIndex>>,
    mu: Vec<MuRow>,
    store: KlStore,
    /// Rows below this index are complete and queryable.
    filled_rows: BlockElt,
}

fn arith(x: BlockElt, y: BlockElt) -> impl Fn(PolyError) -> KlError {
    move |e| match e {
        PolyError::Underflow => KlError::NegativeCoefficient { x, y },
        PolyError::Overflow => KlError::DegreeOverflow { x, y },
    }
}

impl<'a> KlContext<'a> {
    pub fn new(block: &'a dyn Block) -> Result<Self> {
        Self::with_params(block, StoreParams::default())
    }

    pub fn with_params(block: &'a dyn Block, params: StoreParams) -> Result<Self> {
        let n = block.size() as usize;
        for x in 1..block.size() {
            if block.length(x - 1) > block.length(x) {
                return Err(KlError::Input("block indices not sorted by length".into()));
            }
        }
        Ok(KlContext {
            support: KlSupport::new(block),
            prim: vec![Vec::new(); n],
            kl: vec![Vec::new(); n],
            mu: vec![Vec::new(); n],
            store: KlStore::new(params),
            filled_rows: 0,
        })
    }

    #[inline]
    pub fn size(&self) -> BlockElt {
        self.support.size()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.support.rank()
    }

    #[inline]
    pub fn length(&self, x: BlockElt) -> Length {
        self.support.length(x)
    }

    #[inline]
    pub fn descent_set(&self, x: BlockElt) -> RankFlags {
        self.support.descent_set(x)
    }

    #[inline]
    pub fn support(&self) -> &KlSupport<'a> {
        &self.support
    }

    #[inline]
    pub fn pol_store(&self) -> &KlStore {
        &self.store
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled_rows == self.size()
    }

    /// Columns of row `y` carrying a non-zero polynomial, ascending, ending
    /// with `y` itself.
    pub fn primitive_row(&self, y: BlockElt) -> &[BlockElt] {
        &self.prim[y as usize]
    }

    /// Store numbers parallel to [`Self::primitive_row`].
    pub fn kl_row(&self, y: BlockElt) -> &[KlIndex] {
        &self.kl[y as usize]
    }

    pub fn mu_row(&self, y: BlockElt) -> &MuRow {
        &self.mu[y as usize]
    }

    /// Compute every row. Idempotent; on failure the rows completed so far
    /// stay queryable.
    pub fn fill(&mut self) -> Result<()> {
        let n = self.size();
        if self.filled_rows == n {
            return Ok(());
        }
        debug!(size = n, rank = self.rank(), "kl fill start");
        for y in self.filled_rows..n {
            self.fill_row(y)?;
            self.fill_mu_row(y);
            self.filled_rows = y + 1;
        }
        debug!(
            rows = n,
            polynomials = self.store.len(),
            pool = self.store.pool_len(),
            "kl fill done"
        );
        Ok(())
    }

    /// The polynomial `P(x, y)`, possibly zero. Fails with `NotFilled` for a
    /// row that has not been computed yet.
    pub fn kl_pol(&self, x: BlockElt, y: BlockElt) -> Result<PolRef<'_, u32>> {
        if x >= self.size() || y >= self.size() {
            return Err(KlError::Input(format!("pair ({x},{y}) out of range")));
        }
        if y >= self.filled_rows {
            return Err(KlError::NotFilled { y });
        }
        Ok(self.pol_in_row(x, y))
    }

    /// The coefficient `mu(x, y)`, zero when absent.
    pub fn mu(&self, x: BlockElt, y: BlockElt) -> Result<MuCoeff> {
        if x >= self.size() || y >= self.size() {
            return Err(KlError::Input(format!("pair ({x},{y}) out of range")));
        }
        if y >= self.filled_rows {
            return Err(KlError::NotFilled { y });
        }
        let row = &self.mu[y as usize];
        Ok(match row.binary_search_by_key(&x, |e| e.0) {
            Ok(i) => row[i].1,
            Err(_) => 0,
        })
    }

    /// Row lookup against a completed row.
    fn pol_in_row(&self, x: BlockElt, y: BlockElt) -> PolRef<'_, u32> {
        if x > y {
            return self.store.get(KL_ZERO);
        }
        let xp = self.support.primitivize_elt(x, self.support.descent_set(y));
        if xp == UNDEF_BLOCK || xp > y {
            return self.store.get(KL_ZERO);
        }
        match self.prim[y as usize].binary_search(&xp) {
            Ok(i) => self.store.get(self.kl[y as usize][i]),
            Err(_) => self.store.get(KL_ZERO),
        }
    }

    fn first_direct_recursion(&self, y: BlockElt) -> Option<usize> {
        let block = self.support.block();
        (0..self.rank()).find(|&s| block.descent_value(s, y).is_direct_recursion())
    }

    /// Candidates of row `y`: extremal or primitive, ascending, last is `y`.
    fn make_row(&self, y: BlockElt, extremal: bool) -> Vec<BlockElt> {
        let n = self.size() as usize;
        let mut map = BitMap::new(n);
        map.fill_below(self.support.length_less(self.length(y) as usize) as usize);
        map.insert(y as usize);
        let d = self.support.descent_set(y);
        if extremal {
            self.support.extremalize(&mut map, d);
        } else {
            self.support.primitivize(&mut map, d);
        }
        map.iter().map(|i| i as BlockElt).collect()
    }

    fn fill_row(&mut self, y: BlockElt) -> Result<()> {
        if self.length(y) == 0 {
            self.prim[y as usize] = vec![y];
            self.kl[y as usize] = vec![KL_ONE];
            return Ok(());
        }
        let (pr, polys) = match self.first_direct_recursion(y) {
            Some(s) => {
                let e = self.make_row(y, true);
                let klv = self.recursion_row(&e, y, s)?;
                let pr = self.make_row(y, false);
                let polys = self.complete_primitives(&pr, &e, klv, y)?;
                (pr, polys)
            }
            None => self.new_recursion_row(y)?,
        };
        self.commit_row(y, pr, polys)
    }

    /// Direct recursion in the descent `s` of `y` over the extremal row,
    /// mu-corrected; the self entry is 1.
    fn recursion_row(&self, e: &[BlockElt], y: BlockElt, s: usize) -> Result<Vec<Poly<u32>>> {
        let block = self.support.block();
        let sy = match block.descent_value(s, y) {
            DescentStatus::ComplexDescent => block.cross(s, y),
            DescentStatus::RealTypeI => block.inverse_cayley(s, y).0,
            _ => {
                return Err(KlError::InvariantViolation {
                    x: y,
                    y,
                    what: "direct recursion generator is not a direct descent",
                })
            }
        };

        let mut klv = Vec::with_capacity(e.len());
        for &x in &e[..e.len() - 1] {
            let mut p;
            match block.descent_value(s, x) {
                DescentStatus::ImaginaryCompact => {
                    // (q+1) P(x, sy)
                    let r = self.pol_in_row(x, sy);
                    p = Poly::zero();
                    p.add_scaled(r, 1, 0).map_err(arith(x, y))?;
                    p.add_scaled(r, 1, 1).map_err(arith(x, y))?;
                }
                DescentStatus::ComplexDescent => {
                    // P(sx, sy) + q P(x, sy)
                    p = self.pol_in_row(block.cross(s, x), sy).to_poly();
                    p.add_scaled(self.pol_in_row(x, sy), 1, 1).map_err(arith(x, y))?;
                }
                DescentStatus::RealTypeI => {
                    // P(c1, sy) + P(c2, sy) + (q-1) P(x, sy)
                    let (c1, c2) = block.inverse_cayley(s, x);
                    p = self.pol_in_row(c1, sy).to_poly();
                    if c2 != UNDEF_BLOCK {
                        p.add_scaled(self.pol_in_row(c2, sy), 1, 0).map_err(arith(x, y))?;
                    }
                    let r = self.pol_in_row(x, sy);
                    p.add_scaled(r, 1, 1).map_err(arith(x, y))?;
                    p.sub_scaled(r, 1, 0).map_err(arith(x, y))?;
                }
                DescentStatus::RealTypeII => {
                    // P(c1, sy) + q P(x, sy) - P(cross(s,x), sy)
                    let c1 = block.inverse_cayley(s, x).0;
                    p = self.pol_in_row(c1, sy).to_poly();
                    p.add_scaled(self.pol_in_row(x, sy), 1, 1).map_err(arith(x, y))?;
                    p.sub_scaled(self.pol_in_row(block.cross(s, x), sy), 1, 0)
                        .map_err(arith(x, y))?;
                }
                _ => {
                    return Err(KlError::InvariantViolation {
                        x,
                        y,
                        what: "extremal element without descent in the recursion generator",
                    })
                }
            }
            klv.push(p);
        }
        klv.push(Poly::one());

        self.mu_correction(&mut klv, e, y, s, sy)?;
        Ok(klv)
    }

    /// Subtract `mu(z, sy) q^((l(y)-l(z))/2) P(x, z)` over the mu row of
    /// `sy`, restricted to `z` with `s` in their descent set.
    fn mu_correction(
        &self,
        klv: &mut [Poly<u32>],
        e: &[BlockElt],
        y: BlockElt,
        s: usize,
        sy: BlockElt,
    ) -> Result<()> {
        let ly = self.length(y);
        let one = self.store.get(KL_ONE);
        for &(z, m) in &self.mu[sy as usize] {
            if !self.support.descent_set(z).test(s) {
                continue;
            }
            let lz = self.length(z);
            let d = ((ly - lz) / 2) as usize;
            for (j, &x) in e[..e.len() - 1].iter().enumerate() {
                let lx = self.length(x);
                if lx > lz {
                    break;
                }
                if lx == lz {
                    if x == z {
                        klv[j].sub_scaled(one, m, d).map_err(arith(x, y))?;
                    }
                    continue;
                }
                let pxz = self.pol_in_row(x, z);
                if !pxz.is_zero() {
                    klv[j].sub_scaled(pxz, m, d).map_err(arith(x, y))?;
                }
            }
        }
        Ok(())
    }

    /// Spread the extremal values over the primitive row and resolve the
    /// `ImaginaryTypeII` columns from their Cayley pairs, walking down from
    /// the top so every lookup hits an already-settled position.
    fn complete_primitives(
        &self,
        pr: &[BlockElt],
        e: &[BlockElt],
        mut klv: Vec<Poly<u32>>,
        y: BlockElt,
    ) -> Result<Vec<Option<Poly<u32>>>> {
        let block = self.support.block();
        let d_y = self.support.descent_set(y);
        let mut polys: Vec<Option<Poly<u32>>> = vec![None; pr.len()];
        for i in (0..pr.len()).rev() {
            let x = pr[i];
            let p = if let Ok(j) = e.binary_search(&x) {
                std::mem::replace(&mut klv[j], Poly::zero())
            } else {
                let s2 = d_y
                    .iter()
                    .find(|&t| block.descent_value(t, x) == DescentStatus::ImaginaryTypeII)
                    .ok_or(KlError::InvariantViolation {
                        x,
                        y,
                        what: "primitive non-extremal element without type II ascent",
                    })?;
                let (c1, c2) = block.cayley(s2, x);
                let mut p = self.partial_pol(c1, y, pr, &polys)?;
                let q2 = self.partial_pol(c2, y, pr, &polys)?;
                p.add_scaled(q2.as_ref(), 1, 0).map_err(arith(x, y))?;
                p
            };
            polys[i] = Some(p);
        }
        Ok(polys)
    }

    /// Lookup of `P(x, y)` inside the row currently under construction.
    fn partial_pol(
        &self,
        x: BlockElt,
        y: BlockElt,
        pr: &[BlockElt],
        polys: &[Option<Poly<u32>>],
    ) -> Result<Poly<u32>> {
        let xp = self.support.primitivize_elt(x, self.support.descent_set(y));
        if xp == UNDEF_BLOCK || xp > y {
            return Ok(Poly::zero());
        }
        match pr.binary_search(&xp) {
            Ok(i) => polys[i].clone().ok_or(KlError::InvariantViolation {
                x,
                y,
                what: "upward reference into an unsettled row position",
            }),
            Err(_) => Ok(Poly::zero()),
        }
    }

    /// Row fill for `y` without a direct-recursion descent: all descents of
    /// `y` are `ImaginaryCompact`/`RealTypeII`. The primitive row is walked
    /// by descending length; extremal entries are solved from a
    /// `RealNonparity` generator of `y`, the rest complete by Cayley pairs.
    /// Mu values of the row grow alongside and feed the later entries.
    fn new_recursion_row(&self, y: BlockElt) -> Result<(Vec<BlockElt>, Vec<Option<Poly<u32>>>)> {
        let pr = self.make_row(y, false);
        let m = pr.len();
        let ly = self.length(y);
        let mut polys: Vec<Option<Poly<u32>>> = vec![None; m];
        polys[m - 1] = Some(Poly::one());
        let mut partial_mu: MuRow = Vec::new();
        let mut gap1_done = false;

        // group the proper part of the row by length
        let mut groups: Vec<(usize, usize)> = Vec::new();
        let mut start = 0usize;
        for i in 0..m - 1 {
            if self.length(pr[i]) != self.length(pr[start]) {
                groups.push((start, i));
                start = i;
            }
        }
        if start < m - 1 {
            groups.push((start, m - 1));
        }

        for &(lo, hi) in groups.iter().rev() {
            let lvl = self.length(pr[lo]);
            if !gap1_done && ly >= 1 && lvl < ly - 1 {
                self.gap1_mus(y, &pr, &polys, &mut partial_mu);
                gap1_done = true;
            }
            for i in (lo..hi).rev() {
                let x = pr[i];
                let p = if self.support.descent_set(y).is_subset_of(self.support.descent_set(x)) {
                    self.extended_formula(x, y, &pr, &polys, &partial_mu)?
                } else {
                    let block = self.support.block();
                    let s2 = self
                        .support
                        .descent_set(y)
                        .iter()
                        .find(|&t| block.descent_value(t, x) == DescentStatus::ImaginaryTypeII)
                        .ok_or(KlError::InvariantViolation {
                            x,
                            y,
                            what: "primitive non-extremal element without type II ascent",
                        })?;
                    let (c1, c2) = block.cayley(s2, x);
                    let mut p = self.partial_pol(c1, y, &pr, &polys)?;
                    let q2 = self.partial_pol(c2, y, &pr, &polys)?;
                    p.add_scaled(q2.as_ref(), 1, 0).map_err(arith(x, y))?;
                    p
                };
                polys[i] = Some(p);
            }
            // the settled level contributes its mu values
            for i in lo..hi {
                let x = pr[i];
                let gap = ly - lvl;
                if gap % 2 == 1 {
                    let p = polys[i].as_ref().expect("level settled above");
                    let d = ((gap - 1) / 2) as usize;
                    if p.degree() == Some(d) {
                        partial_mu.push((x, p.coef_at(d)));
                    }
                }
            }
            if !gap1_done && lvl == ly - 1 {
                self.gap1_mus(y, &pr, &polys, &mut partial_mu);
                gap1_done = true;
            }
        }

        Ok((pr, polys))
    }

    /// Mu entries of length gap one that sit outside the primitive row,
    /// found through primitivised lookups into the partially built row.
    fn gap1_mus(
        &self,
        y: BlockElt,
        pr: &[BlockElt],
        polys: &[Option<Poly<u32>>],
        partial_mu: &mut MuRow,
    ) {
        let ly = self.length(y) as usize;
        let lo = self.support.length_less(ly - 1);
        let hi = self.support.length_less(ly);
        for x in lo..hi {
            if pr.binary_search(&x).is_ok() {
                continue;
            }
            let xp = self.support.primitivize_elt(x, self.support.descent_set(y));
            if xp == UNDEF_BLOCK || xp > y {
                continue;
            }
            if let Ok(i) = pr.binary_search(&xp) {
                if let Some(p) = polys[i].as_ref() {
                    let c = p.coef_at(0);
                    if c != 0 && p.degree() == Some(0) {
                        partial_mu.push((x, c));
                    }
                }
            }
        }
    }

    /// Solve one extremal entry of a row without direct recursion. Works in
    /// a signed scratch polynomial: the self term of the mu sum re-enters
    /// with the (unknown) top coefficient, which is recovered from the
    /// coefficient of `q^((gap+1)/2)` and stripped.
    fn extended_formula(
        &self,
        x: BlockElt,
        y: BlockElt,
        pr: &[BlockElt],
        polys: &[Option<Poly<u32>>],
        partial_mu: &MuRow,
    ) -> Result<Poly<u32>> {
        let block = self.support.block();
        let mut choice: Option<(usize, DescentStatus)> = None;
        for s in 0..self.rank() {
            if block.descent_value(s, y) != DescentStatus::RealNonparity {
                continue;
            }
            match block.descent_value(s, x) {
                v @ (DescentStatus::ComplexAscent | DescentStatus::ImaginaryTypeII) => {
                    choice = Some((s, v));
                    break;
                }
                v @ DescentStatus::ImaginaryTypeI => {
                    if choice.is_none() {
                        choice = Some((s, v));
                    }
                }
                _ => {}
            }
        }
        let Some((s, v)) = choice else {
            // no usable generator: the polynomial vanishes
            return Ok(Poly::zero());
        };

        let gap = self.length(y) - self.length(x);
        let mut sum = Poly::<i32>::zero();
        for &(z, mz) in partial_mu {
            if !self.support.descent_set(z).test(s) {
                continue;
            }
            let pxz = self.pol_in_row(x, z);
            if pxz.is_zero() {
                continue;
            }
            let shift = ((self.length(y) + 1 - self.length(z)) / 2) as usize;
            let wide = Poly::from_unsigned(pxz).map_err(arith(x, y))?;
            sum.add_scaled(wide.as_ref(), mz as i32, shift).map_err(arith(x, y))?;
        }

        let halved = match v {
            DescentStatus::ComplexAscent => {
                // P(x,y) = sum - q P(cross(s,x), y)
                let psx = self.partial_pol(block.cross(s, x), y, pr, polys)?;
                let wide = Poly::from_unsigned(psx.as_ref()).map_err(arith(x, y))?;
                sum.sub_scaled(wide.as_ref(), 1, 1).map_err(arith(x, y))?;
                false
            }
            DescentStatus::ImaginaryTypeII => {
                // 2 P(x,y) = sum - (q-1)(P(c1,y) + P(c2,y))
                let (c1, c2) = block.cayley(s, x);
                for c in [c1, c2] {
                    let pc = self.partial_pol(c, y, pr, polys)?;
                    let wide = Poly::from_unsigned(pc.as_ref()).map_err(arith(x, y))?;
                    sum.sub_scaled(wide.as_ref(), 1, 1).map_err(arith(x, y))?;
                    sum.add_scaled(wide.as_ref(), 1, 0).map_err(arith(x, y))?;
                }
                true
            }
            DescentStatus::ImaginaryTypeI => {
                // the cross pair shares the value: 2 P(x,y) = sum - (q-1) P(c,y)
                let c = block.cayley(s, x).0;
                let pc = self.partial_pol(c, y, pr, polys)?;
                let wide = Poly::from_unsigned(pc.as_ref()).map_err(arith(x, y))?;
                sum.sub_scaled(wide.as_ref(), 1, 1).map_err(arith(x, y))?;
                sum.add_scaled(wide.as_ref(), 1, 0).map_err(arith(x, y))?;
                true
            }
            _ => unreachable!("choice is restricted to proper ascents"),
        };

        let mut mu_self = 0i32;
        if gap % 2 == 1 {
            let d = ((gap + 1) / 2) as usize;
            mu_self = -sum.take_coef(d);
            if mu_self < 0 {
                return Err(KlError::InvariantViolation {
                    x,
                    y,
                    what: "negative mu recovered in the extended recursion",
                });
            }
        }
        let signed = if halved {
            sum.halve_exact().ok_or(KlError::InvariantViolation {
                x,
                y,
                what: "odd coefficient in the halved extended recursion",
            })?
        } else {
            sum
        };
        let p = signed.into_unsigned().map_err(arith(x, y))?;

        // degree bound, strict at even gap
        let bound = if gap % 2 == 1 { (gap - 1) / 2 } else { gap / 2 };
        if let Some(d) = p.degree() {
            if d > bound as usize || (gap % 2 == 0 && d == bound as usize && gap > 0) {
                return Err(KlError::DegreeOverflow { x, y });
            }
        }
        if mu_self > 0 && p.coef_at(((gap - 1) / 2) as usize) != mu_self as u32 {
            return Err(KlError::InvariantViolation {
                x,
                y,
                what: "mu mismatch between recovered and stored top coefficient",
            });
        }
        Ok(p)
    }

    /// Store the non-zero polynomials of a settled row.
    fn commit_row(
        &mut self,
        y: BlockElt,
        pr: Vec<BlockElt>,
        mut polys: Vec<Option<Poly<u32>>>,
    ) -> Result<()> {
        let mut prow = Vec::with_capacity(pr.len());
        let mut klrow = Vec::with_capacity(pr.len());
        for (i, &x) in pr.iter().enumerate() {
            let p = polys[i].take().ok_or(KlError::InvariantViolation {
                x,
                y,
                what: "row committed with an unsettled position",
            })?;
            if p.is_zero() && x != y {
                continue;
            }
            let idx = self.store.insert(&p).map_err(|e| match e {
                KlError::DegreeOverflow { .. } => KlError::DegreeOverflow { x, y },
                other => other,
            })?;
            prow.push(x);
            klrow.push(idx);
        }
        self.prim[y as usize] = prow;
        self.kl[y as usize] = klrow;
        Ok(())
    }

    /// Mu row of a freshly committed row: primitive entries whose degree
    /// attains the bound, plus the length gap one slice through primitivised
    /// lookups.
    fn fill_mu_row(&mut self, y: BlockElt) {
        let ly = self.length(y);
        let mut row: MuRow = Vec::new();
        let prim = &self.prim[y as usize];
        let klr = &self.kl[y as usize];
        for i in 0..prim.len().saturating_sub(1) {
            let x = prim[i];
            let gap = ly - self.length(x);
            if gap % 2 == 0 {
                continue;
            }
            let d = ((gap - 1) / 2) as usize;
            let p = self.store.get(klr[i]);
            if p.degree() == Some(d) {
                row.push((x, p.coef_at(d)));
            }
        }
        if ly > 0 {
            let lo = self.support.length_less(ly as usize - 1);
            let hi = self.support.length_less(ly as usize);
            for x in lo..hi {
                if prim.binary_search(&x).is_ok() {
                    continue;
                }
                let p = self.pol_in_row(x, y);
                if p.degree() == Some(0) {
                    row.push((x, p.coef_at(0)));
                }
            }
        }
        row.sort_unstable_by_key(|e| e.0);
        self.mu[y as usize] = row;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockBuilder, BlockData, DescentStatus::*};

    /// Scenario: singleton block of rank zero.
    fn singleton() -> BlockData {
        let mut b = BlockBuilder::new(0);
        b.add(0);
        b.build().unwrap()
    }

    /// Scenario: split A1 with two elements, type I Cayley with a singleton
    /// fibre.
    fn split_a1() -> BlockData {
        let mut b = BlockBuilder::new(1);
        let x0 = b.add(0);
        let x1 = b.add(1);
        b.set(0, x0, ImaginaryTypeI, x0);
        b.set_cayley(0, x0, x1, UNDEF_BLOCK);
        b.set(0, x1, RealTypeI, x1);
        b.build().unwrap()
    }

    /// Rank one block with two discrete series under one principal series.
    fn sl2r() -> BlockData {
        let mut b = BlockBuilder::new(1);
        let x0 = b.add(0);
        let x1 = b.add(0);
        let x2 = b.add(1);
        b.set(0, x0, ImaginaryTypeI, x1);
        b.set_cayley(0, x0, x2, UNDEF_BLOCK);
        b.set(0, x1, ImaginaryTypeI, x0);
        b.set_cayley(0, x1, x2, UNDEF_BLOCK);
        b.set(0, x2, RealTypeI, x2);
        b.build().unwrap()
    }

    /// The dual of `sl2r`: one type II element under a cross pair of real
    /// type II elements. Its rows have no direct recursion descent.
    fn sl2r_dual() -> BlockData {
        let mut b = BlockBuilder::new(1);
        let x0 = b.add(0);
        let x1 = b.add(1);
        let x2 = b.add(1);
        b.set(0, x0, ImaginaryTypeII, x0);
        b.set_cayley(0, x0, x1, x2);
        b.set(0, x1, RealTypeII, x2);
        b.set(0, x2, RealTypeII, x1);
        b.build().unwrap()
    }

    #[test]
    fn singleton_block_fills() {
        let blk = singleton();
        let mut ctx = KlContext::new(&blk).unwrap();
        ctx.fill().unwrap();
        assert!(ctx.is_filled());
        let p = ctx.kl_pol(0, 0).unwrap();
        assert_eq!(p.degree(), Some(0));
        assert_eq!(p.coef_at(0), 1);
        assert_eq!(ctx.mu(0, 0).unwrap(), 0);
        // exactly the pinned zero and one
        assert_eq!(ctx.pol_store().len(), 2);
    }

    #[test]
    fn split_a1_scenario() {
        let blk = split_a1();
        let mut ctx = KlContext::new(&blk).unwrap();
        ctx.fill().unwrap();
        assert_eq!(ctx.kl_pol(0, 1).unwrap().coef_at(0), 1);
        assert_eq!(ctx.kl_pol(0, 1).unwrap().degree(), Some(0));
        assert_eq!(ctx.kl_pol(1, 1).unwrap().coef_at(0), 1);
        assert_eq!(ctx.mu(0, 1).unwrap(), 1);
        assert_eq!(ctx.primitive_row(1), &[1]);
    }

    #[test]
    fn sl2r_row_and_mu() {
        let blk = sl2r();
        let mut ctx = KlContext::new(&blk).unwrap();
        ctx.fill().unwrap();
        for x in 0..3 {
            let p = ctx.kl_pol(x, 2).unwrap();
            assert_eq!(p.degree(), Some(0), "P({x},2) should be 1");
        }
        assert_eq!(ctx.mu(0, 2).unwrap(), 1);
        assert_eq!(ctx.mu(1, 2).unwrap(), 1);
        assert_eq!(ctx.mu(0, 1).unwrap(), 0);
        // discrete series rows are trivial
        assert_eq!(ctx.primitive_row(0), &[0]);
        assert_eq!(ctx.primitive_row(1), &[1]);
    }

    #[test]
    fn type_two_completion_in_the_dual_block() {
        let blk = sl2r_dual();
        let mut ctx = KlContext::new(&blk).unwrap();
        ctx.fill().unwrap();
        // rows 1 and 2 have only real type II descents: extended path
        assert_eq!(ctx.kl_pol(0, 1).unwrap().degree(), Some(0));
        assert_eq!(ctx.kl_pol(0, 2).unwrap().degree(), Some(0));
        assert!(ctx.kl_pol(1, 2).unwrap().is_zero());
        assert_eq!(ctx.mu(0, 1).unwrap(), 1);
        assert_eq!(ctx.mu(0, 2).unwrap(), 1);
        // the type II column is stored explicitly
        assert_eq!(ctx.primitive_row(1), &[0, 1]);
    }

    #[test]
    fn zero_above_the_diagonal_and_partial_fill() {
        let blk = sl2r();
        let mut ctx = KlContext::new(&blk).unwrap();
        assert!(matches!(ctx.kl_pol(0, 2), Err(KlError::NotFilled { y: 2 })));
        ctx.fill().unwrap();
        assert!(ctx.kl_pol(2, 0).unwrap().is_zero());
        assert!(ctx.kl_pol(2, 1).unwrap().is_zero());
        assert!(matches!(ctx.kl_pol(0, 7), Err(KlError::Input(_))));
    }

    #[test]
    fn minimal_complex_descent_row() {
        let mut b = BlockBuilder::new(1);
        let x0 = b.add(0);
        let x1 = b.add(1);
        b.set(0, x0, ComplexAscent, x1);
        b.set(0, x1, ComplexDescent, x0);
        let blk = b.build().unwrap();
        let mut ctx = KlContext::new(&blk).unwrap();
        ctx.fill().unwrap();
        assert_eq!(ctx.kl_pol(0, 1).unwrap().degree(), Some(0));
        assert_eq!(ctx.mu(0, 1).unwrap(), 1);
    }

    #[test]
    fn forced_zero_row_with_compact_descent() {
        // the only descent of y is imaginary compact and nothing below is
        // primitive: the row is all zeroes, the mu row empty
        let mut b = BlockBuilder::new(1);
        let x0 = b.add(0);
        let x1 = b.add(1);
        b.set(0, x0, RealNonparity, x0);
        b.set(0, x1, ImaginaryCompact, x1);
        let blk = b.build().unwrap();
        let mut ctx = KlContext::new(&blk).unwrap();
        ctx.fill().unwrap();
        assert!(ctx.kl_pol(0, 1).unwrap().is_zero());
        assert_eq!(ctx.mu(0, 1).unwrap(), 0);
        assert_eq!(ctx.primitive_row(1), &[1]);
        assert_eq!(ctx.kl_pol(1, 1).unwrap().coef_at(0), 1);
    }

    #[test]
    fn primitivisation_is_a_fixed_point() {
        let blk = sl2r();
        let ctx = KlContext::new(&blk).unwrap();
        let d = ctx.descent_set(2);
        let p = ctx.support().primitivize_elt(0, d);
        assert_eq!(ctx.support().primitivize_elt(p, d), p);
    }
}
