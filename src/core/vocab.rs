use hashbrown::HashMap;

use crate::error::{Error, Result};
use crate::pointer::{check_dims, SemanticPointer};
use crate::prng::Prng;

/// Default bound on `|dot|` between any two generated vectors.
pub const DEFAULT_MAX_SIMILARITY: f32 = 0.1;
/// Default number of draws per symbol when trying to satisfy the bound.
pub const DEFAULT_ATTEMPTS: usize = 100;

/// Named set of quasi-orthogonal unit vectors.
///
/// Keys keep their definition order; every "first match wins" tie-break in the
/// crate refers to that order.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    name: String,
    dimensions: usize,
    keys: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Vec<SemanticPointer>,
    max_similarity: f32,
    attempts: usize,
    rng: Prng,
}

impl Vocabulary {
    pub fn new(name: &str, dimensions: usize, seed: u64) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("vocabulary dimensions must be >= 1"));
        }
        Ok(Self {
            name: name.to_string(),
            dimensions,
            keys: Vec::new(),
            index: HashMap::new(),
            vectors: Vec::new(),
            max_similarity: DEFAULT_MAX_SIMILARITY,
            attempts: DEFAULT_ATTEMPTS,
            rng: Prng::new(seed),
        })
    }

    /// Set the similarity bound and number of draws used by [`Vocabulary::add`].
    pub fn with_sampling(mut self, max_similarity: f32, attempts: usize) -> Self {
        self.max_similarity = max_similarity;
        self.attempts = attempts.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&SemanticPointer> {
        self.index.get(key).map(|&i| &self.vectors[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SemanticPointer)> {
        self.keys.iter().map(String::as_str).zip(self.vectors.iter())
    }

    /// Pointer for `key`, or `UnknownSymbol`.
    pub fn pointer(&self, key: &str) -> Result<&SemanticPointer> {
        self.get(key).ok_or_else(|| Error::UnknownSymbol {
            symbol: key.to_string(),
            vocabulary: self.name.clone(),
        })
    }

    /// Define a new symbol with a fresh random unit vector.
    pub fn add(&mut self, key: &str) -> Result<&SemanticPointer> {
        validate_key(key)?;
        if self.contains(key) {
            return Err(Error::DuplicateSymbol {
                symbol: key.to_string(),
                vocabulary: self.name.clone(),
            });
        }

        let mut best: Option<(SemanticPointer, f32)> = None;
        for _ in 0..self.attempts {
            let candidate = self.random_unit();
            let worst = self
                .vectors
                .iter()
                .map(|v| v.dot(candidate.as_slice()).abs())
                .fold(0.0f32, f32::max);
            let better = best.as_ref().map(|b| worst < b.1).unwrap_or(true);
            if better {
                best = Some((candidate, worst));
            }
            if worst < self.max_similarity {
                break;
            }
        }

        // attempts >= 1, so at least one candidate was drawn.
        let (vector, worst) = best.unwrap_or_else(|| (self.random_unit(), 0.0));
        if worst >= self.max_similarity {
            tracing::warn!(
                vocabulary = %self.name,
                key,
                similarity = worst,
                bound = self.max_similarity,
                "could not keep new symbol below the similarity bound"
            );
        }

        let i = self.keys.len();
        self.keys.push(key.to_string());
        self.index.insert(key.to_string(), i);
        self.vectors.push(vector);
        Ok(&self.vectors[i])
    }

    /// Define every key in a `+`-separated list, e.g. `"A+B+C"`.
    pub fn populate(&mut self, keys: &str) -> Result<()> {
        for key in keys.split('+').map(str::trim).filter(|k| !k.is_empty()) {
            self.add(key)?;
        }
        Ok(())
    }

    /// Add `key` unless it is already defined.
    pub fn ensure(&mut self, key: &str) -> Result<()> {
        if !self.contains(key) {
            self.add(key)?;
        }
        Ok(())
    }

    /// Evaluate a linear expression over defined symbols.
    ///
    /// Grammar: `term (('+' | '-') term)*`, `term := [number '*'] KEY | number`.
    /// A bare number contributes nothing except when it is the literal `0`,
    /// which is the usual way of writing "no symbol".
    pub fn parse(&self, expr: &str) -> Result<SemanticPointer> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Err(parse_error(expr, "empty expression"));
        }

        let mut out = SemanticPointer::zeros(self.dimensions);
        let mut pos = 0;
        let mut sign = 1.0f32;

        // Optional leading sign.
        if let Some(Token::Op(op)) = tokens.first() {
            sign = if *op == '-' { -1.0 } else { 1.0 };
            pos = 1;
        }

        loop {
            let (coef, key, next) = self.parse_term(expr, &tokens, pos)?;
            if let Some(key) = key {
                out.try_add_scaled(sign * coef, self.pointer(key)?.as_slice())?;
            } else if coef != 0.0 {
                return Err(parse_error(expr, "a bare number other than 0 has no pointer"));
            }
            pos = next;

            match tokens.get(pos) {
                None => break,
                Some(Token::Op(op)) => {
                    sign = if *op == '-' { -1.0 } else { 1.0 };
                    pos += 1;
                }
                Some(_) => return Err(parse_error(expr, "expected `+` or `-` between terms")),
            }
        }

        Ok(out)
    }

    fn parse_term<'t>(
        &self,
        expr: &str,
        tokens: &'t [Token],
        pos: usize,
    ) -> Result<(f32, Option<&'t str>, usize)> {
        match tokens.get(pos) {
            Some(Token::Key(k)) => Ok((1.0, Some(k.as_str()), pos + 1)),
            Some(Token::Number(x)) => match tokens.get(pos + 1) {
                Some(Token::Star) => match tokens.get(pos + 2) {
                    Some(Token::Key(k)) => Ok((*x, Some(k.as_str()), pos + 3)),
                    _ => Err(parse_error(expr, "expected a symbol after `*`")),
                },
                _ => Ok((*x, None, pos + 1)),
            },
            _ => Err(parse_error(expr, "expected a symbol or number")),
        }
    }

    /// Similarity of `v` to every key, in definition order.
    pub fn dot(&self, v: &[f32]) -> Result<Vec<f32>> {
        check_dims(self.dimensions, v.len())?;
        Ok(self.vectors.iter().map(|p| p.dot(v)).collect())
    }

    /// Best-matching key; ties go to the earliest key.
    pub fn closest(&self, v: &[f32]) -> Result<Option<(&str, f32)>> {
        let sims = self.dot(v)?;
        let mut best: Option<(usize, f32)> = None;
        for (i, s) in sims.into_iter().enumerate() {
            if best.map(|b| s > b.1).unwrap_or(true) {
                best = Some((i, s));
            }
        }
        Ok(best.map(|(i, s)| (self.keys[i].as_str(), s)))
    }

    fn random_unit(&mut self) -> SemanticPointer {
        let v: Vec<f32> = (0..self.dimensions)
            .map(|_| self.rng.next_gaussian())
            .collect();
        SemanticPointer::from_vec(v).normalized()
    }
}

fn validate_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let ok = matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !ok {
        return Err(Error::InvalidSymbolName(key.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Number(f32),
    Op(char),
    Star,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '+' || c == '-' {
            out.push(Token::Op(c));
            i += 1;
        } else if c == '*' {
            out.push(Token::Star);
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            let x = s
                .parse::<f32>()
                .map_err(|_| parse_error(expr, "malformed number"))?;
            out.push(Token::Number(x));
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let key: String = chars[start..i].iter().collect();
            validate_key(&key)?;
            out.push(Token::Key(key));
        } else {
            return Err(parse_error(expr, &format!("unexpected character `{c}`")));
        }
    }
    Ok(out)
}

fn parse_error(expr: &str, reason: &str) -> Error {
    Error::Parse {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words() -> Vocabulary {
        let mut v = Vocabulary::new("memory", 16, 1).unwrap();
        v.populate("A+B+C+D+E+F").unwrap();
        v
    }

    #[test]
    fn vectors_are_unit_and_nearly_orthogonal() {
        let v = words();
        assert_eq!(v.len(), 6);
        for (i, (_, a)) in v.iter().enumerate() {
            assert!((a.norm() - 1.0).abs() < 1e-4);
            for (j, (_, b)) in v.iter().enumerate() {
                if i != j {
                    assert!(a.dot(b.as_slice()).abs() < 0.3);
                }
            }
        }
    }

    #[test]
    fn same_seed_same_vectors() {
        let a = words();
        let b = words();
        for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
            assert_eq!(ka, kb);
            assert_eq!(va, vb);
        }
    }

    #[test]
    fn parse_handles_sums_coefficients_and_zero() {
        let v = words();
        let a = v.pointer("A").unwrap();
        let b = v.pointer("B").unwrap();

        let p = v.parse("A + 0.5*B").unwrap();
        let expected = &(a + &(b * 0.5));
        for (x, y) in p.as_slice().iter().zip(expected.as_slice()) {
            assert!((x - y).abs() < 1e-6);
        }

        assert!(v.parse("0").unwrap().is_zero());
        let neg = v.parse("-A").unwrap();
        assert!((neg.dot(a.as_slice()) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn parse_rejects_undefined_symbols() {
        let v = words();
        let err = v.parse("A+Q").unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol { ref symbol, .. } if symbol == "Q"));
    }

    #[test]
    fn parse_rejects_garbage() {
        let v = words();
        assert!(matches!(v.parse(""), Err(Error::Parse { .. })));
        assert!(matches!(v.parse("A B"), Err(Error::Parse { .. })));
        assert!(matches!(v.parse("2*"), Err(Error::Parse { .. })));
        assert!(matches!(v.parse("A$"), Err(Error::Parse { .. })));
    }

    #[test]
    fn symbol_names_are_checked() {
        let mut v = words();
        assert!(matches!(v.add("lower"), Err(Error::InvalidSymbolName(_))));
        assert!(matches!(v.add("A"), Err(Error::DuplicateSymbol { .. })));
    }

    #[test]
    fn closest_finds_the_defining_key() {
        let v = words();
        for key in ["A", "C", "F"] {
            let p = v.pointer(key).unwrap().clone();
            let (k, s) = v.closest(p.as_slice()).unwrap().unwrap();
            assert_eq!(k, key);
            assert!(s > 0.99);
        }
    }

    #[test]
    fn dot_checks_dimensions() {
        let v = words();
        assert!(matches!(
            v.dot(&[0.0; 4]),
            Err(Error::DimensionMismatch {
                expected: 16,
                actual: 4
            })
        ));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(
            Vocabulary::new("x", 0, 1),
            Err(Error::Config(_))
        ));
    }
}
