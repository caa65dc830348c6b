//! Hash-consed storage for the distinct KL polynomials of one block.
//!
//! Coefficient sequences live in one flat pool; the index groups sixteen
//! polynomials per entry, each described by a packed (degree, valuation)
//! byte, so only the coefficients between valuation and degree are physically
//! stored. Pool and index are reserved up front and never reallocate during
//! fill; running out is [`KlError::StorageExhausted`]. Indices 0 and 1 always
//! hold the zero and one polynomials.

use rustc_hash::FxHashMap;

use crate::error::{KlError, Result};
use crate::polynomial::{PolRef, Poly};

/// Number of a distinct polynomial in the store.
pub type KlIndex = u32;

pub const KL_ZERO: KlIndex = 0;
pub const KL_ONE: KlIndex = 1;

/// Hard degree cap: degrees must fit the 5 packed bits.
pub const DEG_LIMIT: usize = 32;
/// Soft valuation cap: larger valuations store a few explicit zeros.
pub const VAL_LIMIT: usize = 8;

const GROUP_BITS: usize = 4;
const GROUP_SIZE: usize = 1 << GROUP_BITS;

#[inline]
fn pack(deg: usize, val: usize) -> u8 {
    debug_assert!(deg < DEG_LIMIT && val < VAL_LIMIT || (deg == 0 && val == 1));
    ((deg & 0x1f) | (val << 5)) as u8
}

#[inline]
fn unpack_deg(b: u8) -> usize {
    (b & 0x1f) as usize
}

#[inline]
fn unpack_val(b: u8) -> usize {
    (b >> 5) as usize
}

/// Stored coefficient count for one packed byte.
#[inline]
fn stored_len(b: u8) -> usize {
    unpack_deg(b) + 1 - unpack_val(b)
}

/// Sixteen consecutive polynomials sharing one base offset into the pool.
struct IndexGroup {
    base: usize,
    deg_val: [u8; GROUP_SIZE],
}

/// Capacity reservations for [`KlStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreParams {
    /// Coefficient pool capacity (u32 slots).
    pub pool_capacity: usize,
    /// Maximal number of distinct polynomials.
    pub index_capacity: usize,
}

impl Default for StoreParams {
    fn default() -> Self {
        StoreParams {
            pool_capacity: 1 << 22,
            index_capacity: 1 << 20,
        }
    }
}

pub struct KlStore {
    pool: Vec<u32>,
    index: Vec<IndexGroup>,
    len: usize,
    params: StoreParams,
    /// Value-based map from full coefficient vector to index.
    lookup: FxHashMap<Box<[u32]>, KlIndex>,
}

impl KlStore {
    pub fn new(params: StoreParams) -> Self {
        let mut store = KlStore {
            pool: Vec::with_capacity(params.pool_capacity),
            index: Vec::with_capacity(params.index_capacity.div_ceil(GROUP_SIZE)),
            len: 0,
            params,
            lookup: FxHashMap::default(),
        };
        // indices 0 and 1 are pinned
        let zero = store.insert(&Poly::zero()).expect("reserved capacity");
        let one = store.insert(&Poly::one()).expect("reserved capacity");
        debug_assert_eq!((zero, one), (KL_ZERO, KL_ONE));
        store
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes-equivalent footprint of the coefficient pool, for logging.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Intern a polynomial: the existing index when the value is already
    /// present, a fresh one otherwise.
    pub fn insert(&mut self, p: &Poly<u32>) -> Result<KlIndex> {
        if let Some(&i) = self.lookup.get(p.coefs()) {
            return Ok(i);
        }

        let (deg, val) = if p.is_zero() {
            (0, 1) // stores no coefficients
        } else {
            let deg = p.degree().unwrap_or(0);
            if deg >= DEG_LIMIT {
                return Err(KlError::DegreeOverflow {
                    x: UNDEF_CONTEXT,
                    y: UNDEF_CONTEXT,
                });
            }
            (deg, p.valuation().min(VAL_LIMIT - 1))
        };

        if self.len >= self.params.index_capacity {
            return Err(KlError::StorageExhausted);
        }
        let stored = &p.coefs()[val.min(p.coefs().len())..];
        if self.pool.len() + stored.len() > self.params.pool_capacity {
            return Err(KlError::StorageExhausted);
        }

        let pos = self.len & (GROUP_SIZE - 1);
        if pos == 0 {
            self.index.push(IndexGroup {
                base: self.pool.len(),
                deg_val: [0; GROUP_SIZE],
            });
        }
        let group = self.index.last_mut().expect("group pushed above");
        group.deg_val[pos] = pack(deg, val);
        self.pool.extend_from_slice(stored);

        let i = self.len as KlIndex;
        self.len += 1;
        self.lookup.insert(p.coefs().into(), i);
        Ok(i)
    }

    /// Borrowed view of polynomial number `i`; valid until the next insert.
    pub fn get(&self, i: KlIndex) -> PolRef<'_, u32> {
        let i = i as usize;
        assert!(i < self.len, "polynomial number out of range");
        let group = &self.index[i >> GROUP_BITS];
        let pos = i & (GROUP_SIZE - 1);
        let mut offset = group.base;
        for k in 0..pos {
            offset += stored_len(group.deg_val[k]);
        }
        let b = group.deg_val[pos];
        PolRef {
            val: unpack_val(b),
            coef: &self.pool[offset..offset + stored_len(b)],
        }
    }

    /// (degree, valuation, stored coefficients) triplets in index order, as
    /// persisted by the coefficient file.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, &[u32])> + '_ {
        (0..self.len as KlIndex).map(|i| {
            let r = self.get(i);
            let deg = if r.coef.is_empty() { 0 } else { r.val + r.coef.len() - 1 };
            (deg, if r.coef.is_empty() { 1 } else { r.val }, r.coef)
        })
    }
}

// degree overflow detected inside the store has no block context; the engine
// rewrites the indices before surfacing the error
const UNDEF_CONTEXT: u32 = u32::MAX;
