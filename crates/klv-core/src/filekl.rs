//! Binary interchange files for blocks, KL matrices and coefficients.
//!
//! All integers are little-endian. The matrix file starts with a magic code
//! in its new format; readers dispatch on it and also accept the legacy
//! stream of bare rows. The block file records, per (element, generator), a
//! 32-bit successor word that is exactly what primitivisation needs:
//! `NO_GOOD_ASCENT` for descents and type II ascents, `UNDEF_BLOCK` for
//! nonparity ascents, and the ascended element otherwise.

use std::io::{Read, Write};

use tracing::debug;

use crate::bitset::RankFlags;
use crate::block::{Block, BlockElt, DescentStatus, Length, MuCoeff, UNDEF_BLOCK};
use crate::error::{KlError, Result};
use crate::kl::KlContext;
use crate::polynomial::Poly;
use crate::store::KlIndex;
use crate::wgraph::WGraph;

/// Magic code opening a new-format matrix file.
pub const MATRIX_MAGIC: u32 = 0x06AB_DCF0;

/// Successor sentinel: the generator is a descent or a type II ascent.
pub const NO_GOOD_ASCENT: u32 = 0xFFFF_FFFE;

fn w8(w: &mut dyn Write, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

fn w32(w: &mut dyn Write, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Bounds-checked little-endian parser over an in-memory buffer.
struct Parser {
    buf: Vec<u8>,
    pos: usize,
}

impl Parser {
    fn new(r: &mut dyn Read) -> Result<Parser> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(Parser { buf, pos: 0 })
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(KlError::Format("unexpected end of file".into()));
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(KlError::Format("unexpected end of file".into()));
        }
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().expect("4 bytes"));
        self.pos += 4;
        Ok(v)
    }
}

/// First-index-of-length table: entries for lengths `1..=max`, with the
/// implicit `ll[0] = 0` and `ll[max+1] = size`.
fn length_first(block: &dyn Block) -> Vec<BlockElt> {
    let max = block.max_length() as usize;
    let n = block.size();
    let mut ll = vec![0 as BlockElt; max + 2];
    let mut cur = 0usize;
    for x in 0..n {
        let l = block.length(x) as usize;
        while cur < l {
            cur += 1;
            ll[cur] = x;
        }
    }
    for l in cur + 1..=max + 1 {
        ll[l] = n;
    }
    ll
}

/// Successor word of one (element, generator) pair.
fn successor(block: &dyn Block, s: usize, x: BlockElt) -> u32 {
    match block.descent_value(s, x) {
        v if v.is_descent() => NO_GOOD_ASCENT,
        DescentStatus::ImaginaryTypeII => NO_GOOD_ASCENT,
        DescentStatus::RealNonparity => UNDEF_BLOCK,
        DescentStatus::ComplexAscent => block.cross(s, x),
        DescentStatus::ImaginaryTypeI => block.cayley(s, x).0,
        _ => unreachable!("status cases are exhaustive"),
    }
}

/// Persist the block file: size, rank, maximal length, length table, packed
/// descent words, successor table.
pub fn write_block_file(block: &dyn Block, w: &mut dyn Write) -> Result<()> {
    let n = block.size();
    let rank = block.rank();
    let max = block.max_length();
    if max > u8::MAX as Length {
        return Err(KlError::Input(format!("maximal length {max} exceeds the block format")));
    }
    let ll = length_first(block);

    w32(w, n)?;
    w8(w, rank as u8)?;
    w8(w, max as u8)?;
    for l in 1..=max as usize {
        w32(w, ll[l])?;
    }
    for x in 0..n {
        w32(w, block.descent_set(x).0)?;
    }
    for x in 0..n {
        for s in 0..rank {
            w32(w, successor(block, s, x))?;
        }
    }
    debug!(size = n, rank, "block file written");
    Ok(())
}

/// In-memory image of a persisted block file.
pub struct FileBlock {
    pub rank: usize,
    pub lengths: Vec<Length>,
    pub descent: Vec<RankFlags>,
    successors: Vec<u32>,
}

impl FileBlock {
    pub fn size(&self) -> BlockElt {
        self.lengths.len() as BlockElt
    }

    /// Primitivise `x` for the descent set `d` using the successor table.
    /// `UNDEF_BLOCK` when a nonparity ascent is hit.
    pub fn primitivize(&self, x: BlockElt, d: RankFlags) -> BlockElt {
        let mut x = x;
        'outer: loop {
            for s in d.iter() {
                match self.successors[x as usize * self.rank + s] {
                    NO_GOOD_ASCENT => continue,
                    UNDEF_BLOCK => return UNDEF_BLOCK,
                    next => {
                        x = next;
                        continue 'outer;
                    }
                }
            }
            return x;
        }
    }
}

pub fn read_block_file(r: &mut dyn Read) -> Result<FileBlock> {
    let mut p = Parser::new(r)?;
    let n = p.u32()? as usize;
    let rank = p.u8()? as usize;
    let max = p.u8()? as usize;

    let mut ll = vec![0 as BlockElt; max + 2];
    for l in 1..=max {
        ll[l] = p.u32()?;
    }
    ll[max + 1] = n as BlockElt;
    let mut lengths = vec![0 as Length; n];
    for l in 0..=max {
        let hi = if l == max { n as BlockElt } else { ll[l + 1] };
        for x in ll[l]..hi {
            if x as usize >= n {
                return Err(KlError::Format("length table out of range".into()));
            }
            lengths[x as usize] = l as Length;
        }
    }

    let mut descent = Vec::with_capacity(n);
    for _ in 0..n {
        descent.push(RankFlags(p.u32()?));
    }
    let mut successors = Vec::with_capacity(n * rank);
    for _ in 0..n * rank {
        successors.push(p.u32()?);
    }
    Ok(FileBlock {
        rank,
        lengths,
        descent,
        successors,
    })
}

/// Persist the matrix file in the new format: magic, size, length table,
/// descent words, per-row offsets, row payload, tail offset table.
pub fn write_matrix_file(ctx: &KlContext<'_>, w: &mut dyn Write) -> Result<()> {
    if !ctx.is_filled() {
        return Err(KlError::NotFilled { y: ctx.size() });
    }
    let n = ctx.size();
    let block = ctx.support().block();
    let max = block.max_length();
    if max > u8::MAX as Length {
        return Err(KlError::Input(format!("maximal length {max} exceeds the matrix format")));
    }
    let ll = length_first(block);

    // row payload and offsets
    let mut payload: Vec<u8> = Vec::new();
    let mut offsets = Vec::with_capacity(n as usize);
    for y in 0..n {
        offsets.push(payload.len() as u32);
        let prow = ctx.primitive_row(y);
        let klr = ctx.kl_row(y);
        payload.extend_from_slice(&(prow.len() as u32).to_le_bytes());
        for (i, &x) in prow.iter().enumerate() {
            payload.extend_from_slice(&x.to_le_bytes());
            payload.extend_from_slice(&klr[i].to_le_bytes());
        }
    }

    w32(w, MATRIX_MAGIC)?;
    w32(w, n)?;
    w8(w, max as u8)?;
    for l in 1..=max as usize {
        w32(w, ll[l])?;
    }
    for x in 0..n {
        w32(w, ctx.descent_set(x).0)?;
    }
    for &o in &offsets {
        w32(w, o)?;
    }
    w.write_all(&payload)?;
    for &o in &offsets {
        w32(w, o)?;
    }
    debug!(rows = n, payload = payload.len(), "matrix file written");
    Ok(())
}

/// Rows of a matrix file: per element, the (column, polynomial number)
/// pairs. Accepts both the magic-prefixed format and the legacy bare row
/// stream.
pub fn read_matrix_file(r: &mut dyn Read) -> Result<Vec<Vec<(BlockElt, KlIndex)>>> {
    let mut p = Parser::new(r)?;
    if p.remaining() >= 4 {
        let head = u32::from_le_bytes(p.buf[0..4].try_into().expect("4 bytes"));
        if head == MATRIX_MAGIC {
            return read_matrix_new(&mut p);
        }
    }
    // legacy: rows from byte zero, no header, no tail
    let mut rows = Vec::new();
    while p.remaining() > 0 {
        rows.push(read_row(&mut p)?);
    }
    Ok(rows)
}

fn read_row(p: &mut Parser) -> Result<Vec<(BlockElt, KlIndex)>> {
    let count = p.u32()? as usize;
    let mut row = Vec::with_capacity(count);
    for _ in 0..count {
        let x = p.u32()?;
        let idx = p.u32()?;
        row.push((x, idx));
    }
    Ok(row)
}

fn read_matrix_new(p: &mut Parser) -> Result<Vec<Vec<(BlockElt, KlIndex)>>> {
    let magic = p.u32()?;
    debug_assert_eq!(magic, MATRIX_MAGIC);
    let n = p.u32()? as usize;
    let max = p.u8()? as usize;
    for _ in 1..=max {
        p.u32()?; // length table, unused here
    }
    for _ in 0..n {
        p.u32()?; // descent words, unused here
    }
    let mut offsets = Vec::with_capacity(n);
    for _ in 0..n {
        offsets.push(p.u32()? as usize);
    }
    let payload_start = p.pos;
    let mut rows = Vec::with_capacity(n);
    for &o in &offsets {
        p.pos = payload_start
            .checked_add(o)
            .ok_or_else(|| KlError::Format("row offset overflow".into()))?;
        if p.pos > p.buf.len() {
            return Err(KlError::Format("row offset out of range".into()));
        }
        rows.push(read_row(p)?);
    }
    Ok(rows)
}

/// Persist the coefficient file: polynomial count, then degree, valuation
/// and the stored coefficients of each polynomial.
pub fn write_coef_file(ctx: &KlContext<'_>, w: &mut dyn Write) -> Result<()> {
    let store = ctx.pol_store();
    w32(w, store.len() as u32)?;
    for (deg, val, coefs) in store.entries() {
        w8(w, deg as u8)?;
        w8(w, val as u8)?;
        for &c in coefs {
            w32(w, c)?;
        }
    }
    debug!(polynomials = store.len(), "coefficient file written");
    Ok(())
}

pub fn read_coef_file(r: &mut dyn Read) -> Result<Vec<Poly<u32>>> {
    let mut p = Parser::new(r)?;
    let count = p.u32()? as usize;
    let mut pols = Vec::with_capacity(count);
    for _ in 0..count {
        let deg = p.u8()? as usize;
        let val = p.u8()? as usize;
        let mut coef = vec![0u32; val];
        if val <= deg {
            for _ in val..=deg {
                coef.push(p.u32()?);
            }
        }
        pols.push(Poly::from_coefs(coef));
    }
    Ok(pols)
}

/// Read-side view over the three persisted files, answering the same
/// queries as a filled context.
pub struct FileKlView {
    block: FileBlock,
    rows: Vec<Vec<(BlockElt, KlIndex)>>,
    pols: Vec<Poly<u32>>,
}

impl FileKlView {
    pub fn new(
        block: FileBlock,
        rows: Vec<Vec<(BlockElt, KlIndex)>>,
        pols: Vec<Poly<u32>>,
    ) -> Result<FileKlView> {
        if rows.len() != block.size() as usize {
            return Err(KlError::Format("matrix row count disagrees with the block".into()));
        }
        for row in &rows {
            for &(_, idx) in row {
                if idx as usize >= pols.len() {
                    return Err(KlError::Format("polynomial number out of range".into()));
                }
            }
        }
        Ok(FileKlView { block, rows, pols })
    }

    pub fn size(&self) -> BlockElt {
        self.block.size()
    }

    pub fn length(&self, x: BlockElt) -> Length {
        self.block.lengths[x as usize]
    }

    pub fn kl_pol(&self, x: BlockElt, y: BlockElt) -> &Poly<u32> {
        if x > y {
            return &self.pols[0];
        }
        let xp = self.block.primitivize(x, self.block.descent[y as usize]);
        if xp == UNDEF_BLOCK || xp > y {
            return &self.pols[0];
        }
        let row = &self.rows[y as usize];
        match row.binary_search_by_key(&xp, |e| e.0) {
            Ok(i) => &self.pols[row[i].1 as usize],
            Err(_) => &self.pols[0],
        }
    }

    pub fn mu(&self, x: BlockElt, y: BlockElt) -> MuCoeff {
        if x >= y {
            return 0;
        }
        let gap = self.length(y) - self.length(x);
        if gap % 2 == 0 {
            return 0;
        }
        let d = ((gap - 1) / 2) as usize;
        let p = self.kl_pol(x, y);
        if p.degree() == Some(d) {
            p.coef_at(d)
        } else {
            0
        }
    }

    /// W-graph of the persisted data; edge multiset equal to the in-memory
    /// extraction.
    pub fn wgraph(&self) -> WGraph {
        let n = self.size();
        let mut wg = WGraph::empty(self.block.rank, n as usize);
        for x in 0..n {
            wg.set_descent(x, self.block.descent[x as usize]);
        }
        for y in 0..n {
            for x in 0..y {
                let m = self.mu(x, y);
                if m != 0 {
                    wg.add_mu_pair(x, y, m);
                }
            }
        }
        wg
    }
}

/// Rebuild the W-graph from the three persisted files.
pub fn wgraph_from_files(
    block_file: &mut dyn Read,
    matrix_file: &mut dyn Read,
    coef_file: &mut dyn Read,
) -> Result<WGraph> {
    let block = read_block_file(block_file)?;
    let rows = read_matrix_file(matrix_file)?;
    let pols = read_coef_file(coef_file)?;
    Ok(FileKlView::new(block, rows, pols)?.wgraph())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockBuilder, BlockData, DescentStatus::*};

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

    fn filled(blk: &BlockData) -> KlContext<'_> {
        let mut ctx = KlContext::new(blk).unwrap();
        ctx.fill().unwrap();
        ctx
    }

    #[test]
    fn block_file_round_trip() {
        let blk = sl2r();
        let mut buf = Vec::new();
        write_block_file(&blk, &mut buf).unwrap();
        let fb = read_block_file(&mut buf.as_slice()).unwrap();
        assert_eq!(fb.size(), 3);
        assert_eq!(fb.rank, 1);
        assert_eq!(fb.lengths, vec![0, 0, 1]);
        assert!(fb.descent[2].test(0));
        // successor of a type I ascent is its Cayley image
        assert_eq!(fb.primitivize(0, fb.descent[2]), 2);
    }

    #[test]
    fn matrix_magic_dispatch() {
        let blk = sl2r();
        let ctx = filled(&blk);
        let mut buf = Vec::new();
        write_matrix_file(&ctx, &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), MATRIX_MAGIC);
        let rows = read_matrix_file(&mut buf.as_slice()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec![(2, 1)]);
    }

    #[test]
    fn legacy_matrix_rows_are_accepted() {
        // bare rows, no header: row payload only
        let mut buf = Vec::new();
        for row in [vec![(0u32, 1u32)], vec![(0, 1), (1, 2)]] {
            buf.extend_from_slice(&(row.len() as u32).to_le_bytes());
            for (x, i) in row {
                buf.extend_from_slice(&x.to_le_bytes());
                buf.extend_from_slice(&i.to_le_bytes());
            }
        }
        let rows = read_matrix_file(&mut buf.as_slice()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn coef_file_round_trip() {
        let blk = sl2r();
        let ctx = filled(&blk);
        let mut buf = Vec::new();
        write_coef_file(&ctx, &mut buf).unwrap();
        let pols = read_coef_file(&mut buf.as_slice()).unwrap();
        assert_eq!(pols.len(), ctx.pol_store().len());
        assert!(pols[0].is_zero());
        assert_eq!(pols[1].coef_at(0), 1);
        for (i, p) in pols.iter().enumerate() {
            assert_eq!(*p, ctx.pol_store().get(i as u32).to_poly());
        }
    }

    #[test]
    fn view_answers_like_the_context() {
        let blk = sl2r();
        let ctx = filled(&blk);
        let (mut b, mut m, mut c) = (Vec::new(), Vec::new(), Vec::new());
        write_block_file(&blk, &mut b).unwrap();
        write_matrix_file(&ctx, &mut m).unwrap();
        write_coef_file(&ctx, &mut c).unwrap();

        let view = FileKlView::new(
            read_block_file(&mut b.as_slice()).unwrap(),
            read_matrix_file(&mut m.as_slice()).unwrap(),
            read_coef_file(&mut c.as_slice()).unwrap(),
        )
        .unwrap();

        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(
                    *view.kl_pol(x, y),
                    ctx.kl_pol(x, y).unwrap().to_poly(),
                    "P({x},{y})"
                );
                if x < y {
                    assert_eq!(view.mu(x, y), ctx.mu(x, y).unwrap());
                }
            }
        }
    }

    #[test]
    fn truncated_files_are_rejected() {
        let blk = sl2r();
        let mut buf = Vec::new();
        write_block_file(&blk, &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            read_block_file(&mut buf.as_slice()),
            Err(KlError::Format(_))
        ));
    }
}
