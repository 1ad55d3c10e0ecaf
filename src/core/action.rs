//! Rule-based action selection: a basal-ganglia style winner choice followed by
//! a thalamus stage that smooths the switch between rules.
//!
//! Utilities are small typed expression trees built once at model-build time and
//! evaluated against the current signals every step.

use core::ops::{Add, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::NodeId;
use crate::pointer::SemanticPointer;

/// Read access to the signals a utility may depend on.
pub trait SignalSource {
    fn vector(&self, node: NodeId) -> &[f32];
    fn scalar(&self, node: NodeId) -> f32;
}

/// `dot(channel, SYMBOL)`
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityTerm {
    pub channel: NodeId,
    pub symbol: String,
    pub pointer: SemanticPointer,
}

/// The value of a scalar node, e.g. the evidence accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarTerm {
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Utility {
    Similarity(SimilarityTerm),
    Scalar(ScalarTerm),
    Constant(f32),
    WeightedSum(Vec<(f32, Utility)>),
}

impl Utility {
    pub fn constant(x: f32) -> Self {
        Utility::Constant(x)
    }

    pub fn evaluate<S: SignalSource + ?Sized>(&self, src: &S) -> f32 {
        match self {
            Utility::Similarity(t) => t.pointer.dot(src.vector(t.channel)),
            Utility::Scalar(t) => src.scalar(t.node),
            Utility::Constant(x) => *x,
            Utility::WeightedSum(terms) => terms.iter().map(|(w, u)| w * u.evaluate(src)).sum(),
        }
    }

    /// Every node this utility reads.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        match self {
            Utility::Similarity(t) => out.push(t.channel),
            Utility::Scalar(t) => out.push(t.node),
            Utility::Constant(_) => {}
            Utility::WeightedSum(terms) => terms.iter().for_each(|(_, u)| u.collect_nodes(out)),
        }
    }

    fn into_terms(self, weight: f32) -> Vec<(f32, Utility)> {
        match self {
            Utility::WeightedSum(terms) => terms
                .into_iter()
                .map(|(w, u)| (w * weight, u))
                .collect(),
            other => vec![(weight, other)],
        }
    }
}

impl Add for Utility {
    type Output = Utility;

    fn add(self, rhs: Utility) -> Utility {
        let mut terms = self.into_terms(1.0);
        terms.extend(rhs.into_terms(1.0));
        Utility::WeightedSum(terms)
    }
}

impl Sub for Utility {
    type Output = Utility;

    fn sub(self, rhs: Utility) -> Utility {
        let mut terms = self.into_terms(1.0);
        terms.extend(rhs.into_terms(-1.0));
        Utility::WeightedSum(terms)
    }
}

impl Add<f32> for Utility {
    type Output = Utility;

    fn add(self, rhs: f32) -> Utility {
        self + Utility::Constant(rhs)
    }
}

impl Sub<f32> for Utility {
    type Output = Utility;

    fn sub(self, rhs: f32) -> Utility {
        self - Utility::Constant(rhs)
    }
}

impl Mul<f32> for Utility {
    type Output = Utility;

    fn mul(self, k: f32) -> Utility {
        Utility::WeightedSum(self.into_terms(k))
    }
}

impl Neg for Utility {
    type Output = Utility;

    fn neg(self) -> Utility {
        self * -1.0
    }
}

/// Drive a vector channel toward a symbol while the rule is active.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub channel: NodeId,
    pub symbol: String,
    pub pointer: SemanticPointer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub utility: Utility,
    pub effects: Vec<Effect>,
}

impl Rule {
    pub fn new(name: &str, utility: Utility, effects: Vec<Effect>) -> Self {
        Self {
            name: name.to_string(),
            utility,
            effects,
        }
    }
}

/// How utilities turn into target activations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Selection {
    /// Highest utility gets 1, everything else 0. Ties go to the lowest rule index.
    #[default]
    WinnerTakeAll,
    /// `exp(beta * u)` normalised; weights under `floor` are dropped and the rest
    /// renormalised. Needs a steep `beta` (>= 100) for threshold-crossing rules,
    /// otherwise rules just below threshold leak into their effects.
    Softmax { beta: f32, floor: f32 },
}

impl Selection {
    pub fn validate(&self) -> Result<()> {
        if let Selection::Softmax { beta, floor } = *self {
            if !beta.is_finite() || beta <= 0.0 {
                return Err(Error::Config("softmax beta must be finite and > 0"));
            }
            if !floor.is_finite() || !(0.0..1.0).contains(&floor) {
                return Err(Error::Config("softmax floor must be in [0, 1)"));
            }
        }
        Ok(())
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(xs: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &x) in xs.iter().enumerate() {
        if best.map(|b| x > b.1).unwrap_or(true) {
            best = Some((i, x));
        }
    }
    best.map(|(i, _)| i)
}

/// Winner selection over rule utilities.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BasalGanglia {
    pub selection: Selection,
}

impl BasalGanglia {
    pub fn new(selection: Selection) -> Self {
        Self { selection }
    }

    /// Write target activations for `utilities` into `out`.
    pub fn select(&self, utilities: &[f32], out: &mut [f32]) {
        out.iter_mut().for_each(|x| *x = 0.0);
        let Some(winner) = argmax(utilities) else {
            return;
        };

        match self.selection {
            Selection::WinnerTakeAll => out[winner] = 1.0,
            Selection::Softmax { beta, floor } => {
                let max = utilities[winner];
                let mut sum = 0.0;
                for (o, u) in out.iter_mut().zip(utilities) {
                    *o = (beta * (u - max)).exp();
                    sum += *o;
                }
                for o in out.iter_mut() {
                    *o /= sum;
                    if *o < floor {
                        *o = 0.0;
                    }
                }
                let kept: f32 = out.iter().sum();
                if kept <= f32::EPSILON {
                    out[winner] = 1.0;
                } else {
                    out.iter_mut().for_each(|o| *o /= kept);
                }
            }
        }
    }
}

/// Low-passes rule activations so effects fade in and out instead of jumping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thalamus {
    pub tau: f32,
}

impl Thalamus {
    pub fn step(&self, current: &[f32], target: &[f32], dt: f32, out: &mut [f32]) {
        crate::dynamics::lowpass_into(current, target, dt, self.tau, out);
    }
}

/// The full selection circuit of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSelection {
    pub rules: Vec<Rule>,
    pub basal_ganglia: BasalGanglia,
    pub thalamus: Thalamus,
}

impl ActionSelection {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate<S: SignalSource + ?Sized>(&self, src: &S, out: &mut [f32]) {
        for (o, r) in out.iter_mut().zip(&self.rules) {
            *o = r.utility.evaluate(src);
        }
    }

    /// Rule with the highest utility; ties go to the lowest index.
    pub fn dominant(&self, utilities: &[f32]) -> Option<&Rule> {
        argmax(utilities).and_then(|i| self.rules.get(i))
    }

    /// Add `activation`-weighted effect pointers aimed at `channel` into `acc`.
    pub fn route(&self, activations: &[f32], channel: NodeId, acc: &mut [f32]) {
        for (rule, &a) in self.rules.iter().zip(activations) {
            if a == 0.0 {
                continue;
            }
            for e in rule.effects.iter().filter(|e| e.channel == channel) {
                for (x, p) in acc.iter_mut().zip(e.pointer.as_slice()) {
                    *x += a * p;
                }
            }
        }
    }

    /// Whether any rule writes to `channel`.
    pub fn drives(&self, channel: NodeId) -> bool {
        self.rules
            .iter()
            .any(|r| r.effects.iter().any(|e| e.channel == channel))
    }
}
