use crate::action::argmax;
use crate::error::{Error, Result};
use crate::pointer::{check_dims, SemanticPointer};

/// Default similarity an attention slot needs before its word is shown.
pub const DEFAULT_ATTENTION_THRESHOLD: f32 = 0.5;

/// Shows one of several words depending on which attention slot is active.
///
/// Stateless: the output is a function of the current attention vector only.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionEnvironment {
    slots: Vec<(String, SemanticPointer)>,
    words: Vec<(String, SemanticPointer)>,
    threshold: f32,
    output_dimensions: usize,
}

impl AttentionEnvironment {
    /// `slots[i]` selects `words[i]`.
    pub fn new(
        slots: Vec<(String, SemanticPointer)>,
        words: Vec<(String, SemanticPointer)>,
        threshold: f32,
    ) -> Result<Self> {
        if slots.is_empty() {
            return Err(Error::Config("environment needs at least one attention slot"));
        }
        if slots.len() != words.len() {
            return Err(Error::Config("environment needs exactly one word per attention slot"));
        }
        if !threshold.is_finite() {
            return Err(Error::Config("attention threshold must be finite"));
        }
        let input_dims = slots[0].1.dimensions();
        for (_, s) in &slots {
            check_dims(input_dims, s.dimensions())?;
        }
        let output_dimensions = words[0].1.dimensions();
        for (_, w) in &words {
            check_dims(output_dimensions, w.dimensions())?;
        }
        Ok(Self {
            slots,
            words,
            threshold,
            output_dimensions,
        })
    }

    pub fn input_dimensions(&self) -> usize {
        self.slots[0].1.dimensions()
    }

    pub fn output_dimensions(&self) -> usize {
        self.output_dimensions
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(|(k, _)| k.as_str())
    }

    /// Index of the attended slot, if its similarity reaches the threshold.
    /// Ties between slots go to the first one.
    pub fn attended(&self, attention: &[f32]) -> Option<usize> {
        let sims: Vec<f32> = self.slots.iter().map(|(_, s)| s.dot(attention)).collect();
        let i = argmax(&sims)?;
        if sims[i] < self.threshold {
            None
        } else {
            Some(i)
        }
    }

    /// Write the visible word (or zeros) into `out`.
    pub fn present_into(&self, attention: &[f32], out: &mut [f32]) {
        match self.attended(attention) {
            Some(i) => out.copy_from_slice(self.words[i].1.as_slice()),
            None => out.iter_mut().for_each(|x| *x = 0.0),
        }
    }

    pub fn present(&self, attention: &[f32]) -> Result<SemanticPointer> {
        check_dims(self.input_dimensions(), attention.len())?;
        let mut out = SemanticPointer::zeros(self.output_dimensions);
        self.present_into(attention, out.as_mut_slice());
        Ok(out)
    }
}
