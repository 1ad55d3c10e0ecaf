use core::ops::{Add, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A fixed-dimension real vector standing for a symbol (or a blend of symbols).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SemanticPointer {
    v: Vec<f32>,
}

impl SemanticPointer {
    pub fn zeros(dimensions: usize) -> Self {
        Self {
            v: vec![0.0; dimensions],
        }
    }

    pub fn from_vec(v: Vec<f32>) -> Self {
        Self { v }
    }

    pub fn dimensions(&self) -> usize {
        self.v.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.v
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.v
    }

    /// Dot product against a raw slice. Extra elements on either side are ignored;
    /// use [`SemanticPointer::try_dot`] when the sizes come from user wiring.
    #[inline]
    pub fn dot(&self, other: &[f32]) -> f32 {
        self.v.iter().zip(other).map(|(a, b)| a * b).sum()
    }

    pub fn try_dot(&self, other: &[f32]) -> Result<f32> {
        check_dims(self.v.len(), other.len())?;
        Ok(self.dot(other))
    }

    pub fn norm(&self) -> f32 {
        self.dot(&self.v).sqrt()
    }

    /// Unit-length copy. The zero pointer stays zero.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n <= f32::EPSILON {
            return self.clone();
        }
        self.scaled(1.0 / n)
    }

    pub fn scaled(&self, k: f32) -> Self {
        Self {
            v: self.v.iter().map(|x| x * k).collect(),
        }
    }

    /// `self += k * other`
    pub fn add_scaled(&mut self, k: f32, other: &[f32]) {
        for (a, b) in self.v.iter_mut().zip(other) {
            *a += k * b;
        }
    }

    /// [`SemanticPointer::add_scaled`] that refuses a size mismatch.
    pub fn try_add_scaled(&mut self, k: f32, other: &[f32]) -> Result<()> {
        check_dims(self.v.len(), other.len())?;
        self.add_scaled(k, other);
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.v.iter().all(|x| *x == 0.0)
    }
}

pub(crate) fn check_dims(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

impl AsRef<[f32]> for SemanticPointer {
    fn as_ref(&self) -> &[f32] {
        &self.v
    }
}

impl Add for &SemanticPointer {
    type Output = SemanticPointer;

    fn add(self, rhs: &SemanticPointer) -> SemanticPointer {
        let mut out = self.clone();
        out.add_scaled(1.0, &rhs.v);
        out
    }
}

impl Sub for &SemanticPointer {
    type Output = SemanticPointer;

    fn sub(self, rhs: &SemanticPointer) -> SemanticPointer {
        let mut out = self.clone();
        out.add_scaled(-1.0, &rhs.v);
        out
    }
}

impl Mul<f32> for &SemanticPointer {
    type Output = SemanticPointer;

    fn mul(self, k: f32) -> SemanticPointer {
        self.scaled(k)
    }
}

impl Neg for &SemanticPointer {
    type Output = SemanticPointer;

    fn neg(self) -> SemanticPointer {
        self.scaled(-1.0)
    }
}
