use crate::error::{Error, Result};
use crate::pointer::{check_dims, SemanticPointer};
use crate::vocab::Vocabulary;

/// Default recognition threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Similarity-threshold cleanup memory.
///
/// Keys are copied out of the vocabulary when the memory is built, so symbols
/// added to the vocabulary afterwards (distractor words, the default key) are
/// not recognized.
#[derive(Debug, Clone)]
pub struct AssociativeMemory {
    keys: Vec<String>,
    vectors: Vec<SemanticPointer>,
    dimensions: usize,
    threshold: f32,
    default: Option<(String, SemanticPointer)>,
}

/// Result of one lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Recall {
    /// Index of the best-matching stored key (set even when below threshold).
    pub index: Option<usize>,
    pub similarity: f32,
    pub recognized: bool,
    pub output: SemanticPointer,
}

impl Recall {
    /// Scalar recognition signal: the winning similarity, or 0 when nothing
    /// crossed the threshold.
    pub fn activity(&self) -> f32 {
        if self.recognized {
            self.similarity
        } else {
            0.0
        }
    }
}

impl AssociativeMemory {
    pub fn new(vocab: &Vocabulary, threshold: f32) -> Result<Self> {
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(Error::Config("memory threshold must be in [0, 1)"));
        }
        if vocab.is_empty() {
            return Err(Error::Config("memory vocabulary has no symbols"));
        }
        Ok(Self {
            keys: vocab.keys().to_vec(),
            vectors: vocab.iter().map(|(_, v)| v.clone()).collect(),
            dimensions: vocab.dimensions(),
            threshold,
            default: None,
        })
    }

    /// Output `key`'s pointer when nothing is recognized.
    ///
    /// The key is added to `vocab` if missing; it is never matched against.
    pub fn with_default(mut self, vocab: &mut Vocabulary, key: &str) -> Result<Self> {
        check_dims(self.dimensions, vocab.dimensions())?;
        vocab.ensure(key)?;
        let p = vocab.pointer(key)?.clone();
        self.default = Some((key.to_string(), p));
        Ok(self)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn default_key(&self) -> Option<&str> {
        self.default.as_ref().map(|(k, _)| k.as_str())
    }

    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Clean up `input`: the most similar stored key wins (ties go to the key
    /// stored first); above threshold the clean pointer scaled by similarity is
    /// returned, otherwise the default pointer or zero.
    pub fn recall(&self, input: &[f32]) -> Result<Recall> {
        check_dims(self.dimensions, input.len())?;
        Ok(self.lookup(input))
    }

    /// [`recall`](Self::recall) for callers that already checked the size.
    pub(crate) fn lookup(&self, input: &[f32]) -> Recall {
        let mut best: Option<(usize, f32)> = None;
        for (i, v) in self.vectors.iter().enumerate() {
            let s = v.dot(input);
            if best.map(|b| s > b.1).unwrap_or(true) {
                best = Some((i, s));
            }
        }

        let (index, similarity) = match best {
            Some((i, s)) => (Some(i), s),
            None => (None, 0.0),
        };
        let recognized = index.is_some() && similarity > self.threshold;

        let output = match (recognized, index, &self.default) {
            (true, Some(i), _) => self.vectors[i].scaled(similarity),
            (false, _, Some((_, d))) => d.clone(),
            _ => SemanticPointer::zeros(self.dimensions),
        };

        Recall {
            index,
            similarity,
            recognized,
            output,
        }
    }
}
