//! Integer affine expressions over index names.
//!
//! An [`Affine`] is `constant + Σ coef * index`. Terms with a zero
//! coefficient are never stored, so structural equality is semantic equality
//! and the zero expression is exactly `Affine::default()`.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Affine {
    constant: i64,
    terms: BTreeMap<String, i64>,
}

impl Affine {
    /// The constant expression `value`.
    pub fn constant(value: i64) -> Self {
        Self {
            constant: value,
            terms: BTreeMap::new(),
        }
    }

    /// The expression `1 * name`.
    pub fn var(name: impl Into<String>) -> Self {
        Self::term(name, 1)
    }

    /// The expression `coef * name`.
    pub fn term(name: impl Into<String>, coef: i64) -> Self {
        let mut affine = Self::default();
        affine.add_term(name, coef);
        affine
    }

    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.terms.is_empty()
    }

    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    /// Coefficient of `name`, zero when absent.
    pub fn get(&self, name: &str) -> i64 {
        self.terms.get(name).copied().unwrap_or(0)
    }

    /// Non-zero terms in name order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.terms.iter().map(|(name, coef)| (name.as_str(), *coef))
    }

    pub fn add_term(&mut self, name: impl Into<String>, coef: i64) {
        if coef == 0 {
            return;
        }
        let name = name.into();
        let entry = self.terms.entry(name.clone()).or_insert(0);
        *entry = entry.saturating_add(coef);
        if *entry == 0 {
            self.terms.remove(&name);
        }
    }

    pub fn add_constant(&mut self, value: i64) {
        self.constant = self.constant.saturating_add(value);
    }

    /// Replace every occurrence of `name` with `with`.
    pub fn substitute(&self, name: &str, with: &Affine) -> Affine {
        let coef = self.get(name);
        if coef == 0 {
            return self.clone();
        }
        let mut out = self.clone();
        out.terms.remove(name);
        out + with.clone() * coef
    }
}

impl Add for Affine {
    type Output = Affine;

    fn add(mut self, rhs: Affine) -> Affine {
        self.constant = self.constant.saturating_add(rhs.constant);
        for (name, coef) in rhs.terms {
            self.add_term(name, coef);
        }
        self
    }
}

impl Sub for Affine {
    type Output = Affine;

    fn sub(self, rhs: Affine) -> Affine {
        self + (-rhs)
    }
}

impl Neg for Affine {
    type Output = Affine;

    fn neg(self) -> Affine {
        self * -1
    }
}

impl Mul<i64> for Affine {
    type Output = Affine;

    fn mul(mut self, rhs: i64) -> Affine {
        if rhs == 0 {
            return Affine::default();
        }
        self.constant = self.constant.saturating_mul(rhs);
        for coef in self.terms.values_mut() {
            *coef = coef.saturating_mul(rhs);
        }
        self
    }
}

impl fmt::Display for Affine {
    /// Renders as `2*i + j - 3`; the zero expression renders as `0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut first = true;
        for (name, coef) in self.terms() {
            let magnitude = coef.unsigned_abs();
            match (first, coef < 0) {
                (true, true) => write!(f, "-")?,
                (true, false) => {}
                (false, true) => write!(f, " - ")?,
                (false, false) => write!(f, " + ")?,
            }
            if magnitude == 1 {
                write!(f, "{name}")?;
            } else {
                write!(f, "{magnitude}*{name}")?;
            }
            first = false;
        }
        if self.constant != 0 {
            let magnitude = self.constant.unsigned_abs();
            match (first, self.constant < 0) {
                (true, true) => write!(f, "-{magnitude}")?,
                (true, false) => write!(f, "{magnitude}")?,
                (false, true) => write!(f, " - {magnitude}")?,
                (false, false) => write!(f, " + {magnitude}")?,
            }
        }
        Ok(())
    }
}
