#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::action::Selection;
use crate::dynamics::{check_tau, AccumulatorParams};
use crate::error::{Error, Result};
use crate::vocab::{DEFAULT_ATTEMPTS, DEFAULT_MAX_SIMILARITY};

/// Evidence rate of the two simple recognition scripts.
pub const SLOW_EVIDENCE_SCALE: f32 = 0.1;

/// Smallest pointer size a task accepts. Below it the word, motor and slot
/// vocabularies cannot stay near-orthogonal and unknown words start to pass
/// as known ones.
pub const MIN_DIMENSIONS: usize = 16;

/// Parameters shared by every task variant.
///
/// Defaults are the constants of the word-recognition scripts, except
/// `reset_gain` (see [`AccumulatorParams`]).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModelConfig {
    pub dimensions: usize,
    pub seed: u64,
    /// Simulation step (s).
    pub dt: f32,
    /// Seconds a trial runs for.
    pub duration: f32,

    /// Words the recognition memory knows.
    pub known_words: Vec<String>,
    /// Words shown to the model: the stimulus for the single-word tasks, one
    /// per attention slot for the sequential task.
    pub words: Vec<String>,

    pub memory_threshold: f32,
    pub evidence_scale: f32,
    pub evidence_tau: f32,
    pub evidence_feedback: f32,
    pub evidence_radius: f32,
    pub reset_gain: f32,
    pub reset_tau: f32,

    /// Synapse on every vector channel (stim, motor, attention, reset).
    pub channel_tau: f32,
    pub thalamus_tau: f32,
    /// Evidence level a decision rule has to beat.
    pub action_threshold: f32,
    pub attention_threshold: f32,
    /// How long the initial W1 cue is held (s).
    pub attention_cue: f32,
    /// Motor similarity that counts as a response.
    pub response_threshold: f32,

    pub max_similarity: f32,
    pub vocab_attempts: usize,
    pub selection: Selection,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let acc = AccumulatorParams::default();
        Self {
            dimensions: MIN_DIMENSIONS,
            seed: 1,
            dt: 0.001,
            duration: 2.0,
            known_words: ["A", "B", "C", "D", "E", "F"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            words: vec!["C".to_string(), "B".to_string()],
            memory_threshold: 0.3,
            evidence_scale: 0.3,
            evidence_tau: acc.tau,
            evidence_feedback: acc.feedback,
            evidence_radius: acc.radius,
            reset_gain: acc.reset_gain,
            reset_tau: acc.reset_tau,
            channel_tau: 0.01,
            thalamus_tau: 0.01,
            action_threshold: 0.8,
            attention_threshold: 0.5,
            attention_cue: 0.1,
            response_threshold: 0.5,
            max_similarity: DEFAULT_MAX_SIMILARITY,
            vocab_attempts: DEFAULT_ATTEMPTS,
            selection: Selection::WinnerTakeAll,
        }
    }
}

impl ModelConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_words<S: AsRef<str>>(mut self, words: &[S]) -> Self {
        self.words = words.iter().map(|w| w.as_ref().to_string()).collect();
        self
    }

    pub fn with_scale(mut self, evidence_scale: f32) -> Self {
        self.evidence_scale = evidence_scale;
        self
    }

    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_reset_gain(mut self, gain: f32) -> Self {
        self.reset_gain = gain;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn accumulator(&self) -> AccumulatorParams {
        AccumulatorParams {
            tau: self.evidence_tau,
            feedback: self.evidence_feedback,
            radius: self.evidence_radius,
            reset_gain: self.reset_gain,
            reset_tau: self.reset_tau,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions < MIN_DIMENSIONS || self.dimensions > 4096 {
            return Err(Error::Config("dimensions must be in [16, 4096]"));
        }
        if !self.dt.is_finite() || self.dt <= 0.0 || self.dt > 0.1 {
            return Err(Error::Config("dt must be in (0, 0.1]"));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(Error::Config("duration must be finite and >= 0"));
        }
        check_tau(self.channel_tau, self.dt)?;
        check_tau(self.thalamus_tau, self.dt)?;
        self.accumulator().validate(self.dt)?;

        if !(0.0..1.0).contains(&self.memory_threshold) {
            return Err(Error::Config("memory_threshold must be in [0, 1)"));
        }
        if !self.evidence_scale.is_finite()
            || self.evidence_scale <= 0.0
            || self.evidence_scale > 1.0
        {
            return Err(Error::Config("evidence_scale must be in (0, 1]"));
        }
        if !self.action_threshold.is_finite() || self.action_threshold <= 0.0 {
            return Err(Error::Config("action_threshold must be finite and > 0"));
        }
        if !(0.0..=1.0).contains(&self.attention_threshold) {
            return Err(Error::Config("attention_threshold must be in [0, 1]"));
        }
        if !self.attention_cue.is_finite() || self.attention_cue < 0.0 {
            return Err(Error::Config("attention_cue must be finite and >= 0"));
        }
        if !(0.0..=1.0).contains(&self.response_threshold) {
            return Err(Error::Config("response_threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.max_similarity) {
            return Err(Error::Config("max_similarity must be in [0, 1]"));
        }
        if self.vocab_attempts == 0 {
            return Err(Error::Config("vocab_attempts must be >= 1"));
        }
        if self.known_words.is_empty() {
            return Err(Error::Config("known_words must not be empty"));
        }
        if self.words.is_empty() {
            return Err(Error::Config("words must not be empty"));
        }
        self.selection.validate()
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ModelConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dimensions, MIN_DIMENSIONS);
        assert_eq!(cfg.words, vec!["C", "B"]);
        assert_eq!(cfg.known_words.len(), 6);
    }

    #[test]
    fn too_few_dimensions_are_rejected() {
        for dimensions in [0, 8, MIN_DIMENSIONS - 1, 4097] {
            let cfg = ModelConfig {
                dimensions,
                ..ModelConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(Error::Config(_))), "{dimensions}");
        }
        let cfg = ModelConfig {
            dimensions: MIN_DIMENSIONS,
            ..ModelConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = ModelConfig {
            channel_tau: -0.01,
            ..ModelConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidTimeConstant(_))));

        let bad = ModelConfig::default().with_scale(0.0);
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let bad = ModelConfig::default().with_dt(0.5);
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let bad = ModelConfig {
            memory_threshold: 1.5,
            ..ModelConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = ModelConfig::default().with_words::<&str>(&[]);
        assert!(bad.validate().is_err());

        let bad = ModelConfig::default().with_selection(Selection::Softmax {
            beta: -1.0,
            floor: 0.0,
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn accumulator_params_follow_config() {
        let cfg = ModelConfig::default().with_reset_gain(5.0);
        let p = cfg.accumulator();
        assert_eq!(p.reset_gain, 5.0);
        assert_eq!(p.tau, 0.1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg = ModelConfig::from_json_str(r#"{ "seed": 7, "words": ["D", "J"] }"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.words, vec!["D", "J"]);
        assert_eq!(cfg.dt, 0.001);

        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(ModelConfig::from_json_str(&json).unwrap(), cfg);

        assert!(matches!(
            ModelConfig::from_json_str(r#"{ "dt": -1.0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ModelConfig::from_json_str("{ nope"),
            Err(Error::Json(_))
        ));
    }
}
