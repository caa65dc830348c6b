//! Dense polynomials in `q` with small integer coefficients.
//!
//! The untwisted engine works over `u32` with checked subtraction (an
//! underflow is the non-negativity invariant failing); the twisted engine
//! works over `i32`. [`PolRef`] is the borrowed view handed out by the
//! polynomial stores: a valuation plus the physically stored coefficient
//! slice.

use std::fmt;

/// Coefficient ring bound for [`Poly`].
pub trait Coeff: Copy + Eq + std::hash::Hash + fmt::Debug + fmt::Display {
    const ZERO: Self;
    const ONE: Self;
    fn checked_add(self, rhs: Self) -> Option<Self>;
    fn checked_sub(self, rhs: Self) -> Option<Self>;
    fn checked_mul(self, rhs: Self) -> Option<Self>;
}

impl Coeff for u32 {
    const ZERO: u32 = 0;
    const ONE: u32 = 1;
    #[inline]
    fn checked_add(self, rhs: u32) -> Option<u32> {
        u32::checked_add(self, rhs)
    }
    #[inline]
    fn checked_sub(self, rhs: u32) -> Option<u32> {
        u32::checked_sub(self, rhs)
    }
    #[inline]
    fn checked_mul(self, rhs: u32) -> Option<u32> {
        u32::checked_mul(self, rhs)
    }
}

impl Coeff for i32 {
    const ZERO: i32 = 0;
    const ONE: i32 = 1;
    #[inline]
    fn checked_add(self, rhs: i32) -> Option<i32> {
        i32::checked_add(self, rhs)
    }
    #[inline]
    fn checked_sub(self, rhs: i32) -> Option<i32> {
        i32::checked_sub(self, rhs)
    }
    #[inline]
    fn checked_mul(self, rhs: i32) -> Option<i32> {
        i32::checked_mul(self, rhs)
    }
}

/// Arithmetic failure inside a polynomial operation; the engine attaches the
/// offending `(x, y)` pair when it surfaces one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyError {
    /// A coefficient went below zero (unsigned ring only).
    Underflow,
    /// Coefficient magnitude overflow.
    Overflow,
}

/// Borrowed view of a stored polynomial: coefficients of
/// `q^val ..= q^(val + coef.len() - 1)`. The zero polynomial has an empty
/// slice.
#[derive(Debug, Clone, Copy)]
pub struct PolRef<'a, C> {
    pub val: usize,
    pub coef: &'a [C],
}

impl<'a, C: Coeff> PolRef<'a, C> {
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.coef.is_empty()
    }

    /// `None` for the zero polynomial.
    #[inline]
    pub fn degree(&self) -> Option<usize> {
        if self.coef.is_empty() {
            None
        } else {
            Some(self.val + self.coef.len() - 1)
        }
    }

    /// Coefficient of `q^d` (zero outside the stored window).
    #[inline]
    pub fn coef_at(&self, d: usize) -> C {
        if d < self.val || d >= self.val + self.coef.len() {
            C::ZERO
        } else {
            self.coef[d - self.val]
        }
    }

    pub fn to_poly(&self) -> Poly<C> {
        let mut coef = vec![C::ZERO; self.val];
        coef.extend_from_slice(self.coef);
        Poly::from_coefs(coef)
    }
}

/// Owned dense polynomial; no trailing zero coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Poly<C> {
    coef: Vec<C>,
}

impl<C: Coeff> Poly<C> {
    pub fn zero() -> Self {
        Poly { coef: Vec::new() }
    }

    pub fn one() -> Self {
        Poly { coef: vec![C::ONE] }
    }

    /// Take ownership of a coefficient vector, trimming trailing zeros.
    pub fn from_coefs(coef: Vec<C>) -> Self {
        let mut p = Poly { coef };
        p.trim();
        p
    }

    /// `c * q^d`; the zero polynomial when `c` is zero.
    pub fn monomial(c: C, d: usize) -> Self {
        if c == C::ZERO {
            return Poly::zero();
        }
        let mut coef = vec![C::ZERO; d + 1];
        coef[d] = c;
        Poly { coef }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.coef.is_empty()
    }

    #[inline]
    pub fn degree(&self) -> Option<usize> {
        self.coef.len().checked_sub(1)
    }

    #[inline]
    pub fn coef_at(&self, d: usize) -> C {
        self.coef.get(d).copied().unwrap_or(C::ZERO)
    }

    pub fn coefs(&self) -> &[C] {
        &self.coef
    }

    /// Index of the first non-zero coefficient; 0 for the zero polynomial.
    pub fn valuation(&self) -> usize {
        self.coef.iter().position(|&c| c != C::ZERO).unwrap_or(0)
    }

    #[inline]
    pub fn as_ref(&self) -> PolRef<'_, C> {
        PolRef { val: 0, coef: &self.coef }
    }

    fn trim(&mut self) {
        while self.coef.last() == Some(&C::ZERO) {
            self.coef.pop();
        }
    }

    /// `self += factor * q^shift * p`.
    pub fn add_scaled(&mut self, p: PolRef<'_, C>, factor: C, shift: usize) -> std::result::Result<(), PolyError> {
        if p.is_zero() || factor == C::ZERO {
            return Ok(());
        }
        let top = p.val + p.coef.len() + shift;
        if self.coef.len() < top {
            self.coef.resize(top, C::ZERO);
        }
        for (i, &c) in p.coef.iter().enumerate() {
            let d = p.val + shift + i;
            let t = factor.checked_mul(c).ok_or(PolyError::Overflow)?;
            self.coef[d] = self.coef[d].checked_add(t).ok_or(PolyError::Overflow)?;
        }
        self.trim();
        Ok(())
    }

    /// `self -= factor * q^shift * p`; fails with `Underflow` the moment a
    /// coefficient would leave the ring.
    pub fn sub_scaled(&mut self, p: PolRef<'_, C>, factor: C, shift: usize) -> std::result::Result<(), PolyError> {
        if p.is_zero() || factor == C::ZERO {
            return Ok(());
        }
        let top = p.val + p.coef.len() + shift;
        if self.coef.len() < top {
            self.coef.resize(top, C::ZERO);
        }
        for (i, &c) in p.coef.iter().enumerate() {
            let d = p.val + shift + i;
            let t = factor.checked_mul(c).ok_or(PolyError::Overflow)?;
            self.coef[d] = self.coef[d].checked_sub(t).ok_or(PolyError::Underflow)?;
        }
        self.trim();
        Ok(())
    }

    /// Product, used by the twisted mu correction.
    pub fn mul(&self, other: &Poly<C>) -> std::result::Result<Poly<C>, PolyError> {
        if self.is_zero() || other.is_zero() {
            return Ok(Poly::zero());
        }
        let mut out = vec![C::ZERO; self.coef.len() + other.coef.len() - 1];
        for (i, &a) in self.coef.iter().enumerate() {
            if a == C::ZERO {
                continue;
            }
            for (j, &b) in other.coef.iter().enumerate() {
                let t = a.checked_mul(b).ok_or(PolyError::Overflow)?;
                out[i + j] = out[i + j].checked_add(t).ok_or(PolyError::Overflow)?;
            }
        }
        let mut p = Poly { coef: out };
        p.trim();
        Ok(p)
    }

    /// Drop the coefficient of `q^d`, returning its previous value.
    pub fn take_coef(&mut self, d: usize) -> C {
        if d >= self.coef.len() {
            return C::ZERO;
        }
        let c = self.coef[d];
        self.coef[d] = C::ZERO;
        self.trim();
        c
    }
}

impl Poly<i32> {
    /// Widen an unsigned view into the signed workspace.
    pub fn from_unsigned(p: PolRef<'_, u32>) -> std::result::Result<Poly<i32>, PolyError> {
        let mut coef = vec![0i32; p.val];
        for &c in p.coef {
            coef.push(i32::try_from(c).map_err(|_| PolyError::Overflow)?);
        }
        let mut q = Poly { coef };
        q.trim();
        Ok(q)
    }

    /// Exact division by two; `None` when some coefficient is odd.
    pub fn halve_exact(&self) -> Option<Poly<i32>> {
        let mut coef = Vec::with_capacity(self.coef.len());
        for &c in &self.coef {
            if c % 2 != 0 {
                return None;
            }
            coef.push(c / 2);
        }
        Some(Poly { coef })
    }

    /// Back to the non-negative ring; `Underflow` on any negative
    /// coefficient.
    pub fn into_unsigned(self) -> std::result::Result<Poly<u32>, PolyError> {
        let mut coef = Vec::with_capacity(self.coef.len());
        for c in self.coef {
            coef.push(u32::try_from(c).map_err(|_| PolyError::Underflow)?);
        }
        Ok(Poly { coef })
    }
}

impl<C: Coeff> fmt::Display for Poly<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut first = true;
        for (d, &c) in self.coef.iter().enumerate().rev() {
            if c == C::ZERO {
                continue;
            }
            if !first {
                write!(f, "+")?;
            }
            first = false;
            match d {
                0 => write!(f, "{c}")?,
                1 => write!(f, "{c}q")?,
                _ => write!(f, "{c}q^{d}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q_plus_one() -> Poly<u32> {
        let mut p = Poly::one();
        p.add_scaled(Poly::one().as_ref(), 1, 1).unwrap();
        p
    }

    #[test]
    fn add_and_degree() {
        let p = q_plus_one();
        assert_eq!(p.degree(), Some(1));
        assert_eq!(p.coef_at(0), 1);
        assert_eq!(p.coef_at(1), 1);
        assert_eq!(p.coef_at(5), 0);
        assert_eq!(p.to_string(), "1q+1");
    }

    #[test]
    fn subtraction_underflow_is_detected() {
        let mut p = Poly::one();
        let q = q_plus_one();
        assert_eq!(p.sub_scaled(q.as_ref(), 1, 0), Err(PolyError::Underflow));
    }

    #[test]
    fn subtract_to_zero_trims() {
        let mut p = q_plus_one();
        p.sub_scaled(q_plus_one().as_ref(), 1, 0).unwrap();
        assert!(p.is_zero());
        assert_eq!(p.degree(), None);
    }

    #[test]
    fn shifted_scaled_accumulation() {
        // 3 q^2 (q + 1) = 3q^3 + 3q^2
        let mut p = Poly::zero();
        p.add_scaled(q_plus_one().as_ref(), 3, 2).unwrap();
        assert_eq!(p.coef_at(2), 3);
        assert_eq!(p.coef_at(3), 3);
        assert_eq!(p.valuation(), 2);
    }

    #[test]
    fn signed_product_matches_hand_expansion() {
        // (q^2 - q)(q + 1) = q^3 - q
        let mut a = Poly::<i32>::monomial(1, 2);
        a.add_scaled(Poly::monomial(1, 1).as_ref(), -1, 0).unwrap();
        let mut b = Poly::<i32>::one();
        b.add_scaled(Poly::one().as_ref(), 1, 1).unwrap();
        let p = a.mul(&b).unwrap();
        assert_eq!(p.coef_at(3), 1);
        assert_eq!(p.coef_at(2), 0);
        assert_eq!(p.coef_at(1), -1);
    }

    #[test]
    fn halve_and_unsign() {
        let mut p = Poly::<i32>::monomial(2, 1);
        p.add_scaled(Poly::one().as_ref(), 4, 0).unwrap();
        let h = p.halve_exact().unwrap();
        assert_eq!(h.coef_at(0), 2);
        assert_eq!(h.coef_at(1), 1);
        assert!(Poly::<i32>::monomial(3, 1).halve_exact().is_none());
        assert!(Poly::<i32>::monomial(-1, 0).into_unsigned().is_err());
    }

    #[test]
    fn take_coef_strips_and_trims() {
        let mut p = Poly::<i32>::monomial(-2, 3);
        assert_eq!(p.take_coef(3), -2);
        assert!(p.is_zero());
    }

    #[test]
    fn polref_window() {
        let r = PolRef::<u32> { val: 2, coef: &[5, 0, 7] };
        assert_eq!(r.degree(), Some(4));
        assert_eq!(r.coef_at(1), 0);
        assert_eq!(r.coef_at(2), 5);
        assert_eq!(r.coef_at(4), 7);
        let p = r.to_poly();
        assert_eq!(p.valuation(), 2);
        assert_eq!(p.degree(), Some(4));
    }
}
