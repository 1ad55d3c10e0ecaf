//! The four word-recognition tasks, from a bare evidence accumulator up to
//! the two-word sequential-attention model.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::action::Utility;
use crate::config::{ModelConfig, SLOW_EVIDENCE_SCALE};
use crate::environment::AttentionEnvironment;
use crate::error::{Error, Result};
use crate::memory::DEFAULT_THRESHOLD;
use crate::model::{Model, ModelBuilder, NodeId, NodeKind, Schedule, VocabId};
use crate::simulator::Simulator;

pub const RESET_KEY: &str = "EVIDENCE";
pub const DEFAULT_KEY: &str = "NONE";
pub const YES: &str = "YES";
pub const NO: &str = "NO";
pub const WAIT: &str = "WAIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Variant {
    /// Stimulus, memory and accumulator only.
    Recognition,
    /// Adds an externally driven reset.
    Resettable,
    /// Rules turn accumulated evidence into YES/NO and reset it.
    Threshold,
    /// Two words read one after the other under attention control.
    Sequential,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Recognition,
        Variant::Resettable,
        Variant::Threshold,
        Variant::Sequential,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Recognition => "recognition",
            Variant::Resettable => "resettable",
            Variant::Threshold => "threshold",
            Variant::Sequential => "sequential",
        }
    }

    /// Default parameters: the first two tasks accumulate evidence slower.
    pub fn default_config(self) -> ModelConfig {
        match self {
            Variant::Recognition | Variant::Resettable => {
                ModelConfig::default().with_scale(SLOW_EVIDENCE_SCALE)
            }
            Variant::Threshold | Variant::Sequential => ModelConfig::default(),
        }
    }

    pub fn build(self, cfg: &ModelConfig) -> Result<Task> {
        match self {
            Variant::Recognition => recognition(cfg),
            Variant::Resettable => resettable(cfg),
            Variant::Threshold => threshold(cfg),
            Variant::Sequential => sequential(cfg),
        }
    }
}

/// A built task model plus the nodes callers read and drive.
#[derive(Debug, Clone)]
pub struct Task {
    pub variant: Variant,
    pub model: Model,
    /// External stimulus input (single-word tasks).
    pub stimulus: Option<NodeId>,
    /// The word channel the memory reads.
    pub stim: NodeId,
    pub memory: NodeId,
    pub evidence: NodeId,
    /// External reset input (resettable task).
    pub reset_stimulus: Option<NodeId>,
    pub reset: Option<NodeId>,
    pub motor: Option<NodeId>,
    pub attention: Option<NodeId>,
    pub environment: Option<NodeId>,
    pub response_threshold: f32,
    pub duration: f32,
}

struct RecognitionCore {
    b: ModelBuilder,
    words: VocabId,
    stim: NodeId,
    memory: NodeId,
    evidence: NodeId,
}

/// Vocabulary, word channel, recognition memory and evidence accumulator.
fn recognition_core(cfg: &ModelConfig) -> Result<RecognitionCore> {
    cfg.validate()?;
    let mut b = ModelBuilder::new(cfg.dt, cfg.seed)?
        .with_sampling(cfg.max_similarity, cfg.vocab_attempts);

    let words = b.vocabulary("memory", cfg.dimensions)?;
    for w in &cfg.known_words {
        b.vocab_mut(words)?.add(w)?;
    }
    let memory = b.memory("memory", words, cfg.memory_threshold, Some(DEFAULT_KEY))?;
    // Unknown words exist as symbols but the memory was built without them.
    for w in &cfg.words {
        b.vocab_mut(words)?.ensure(w)?;
    }

    let stim = b.state("stim", words, cfg.channel_tau)?;
    let evidence = b.accumulator("evidence", cfg.accumulator())?;
    b.feed(stim, memory)?;
    b.evidence(memory, evidence, cfg.evidence_scale)?;

    Ok(RecognitionCore {
        b,
        words,
        stim,
        memory,
        evidence,
    })
}

/// Reset channel and its cleanup memory, inhibiting the accumulator.
fn reset_path(
    b: &mut ModelBuilder,
    cfg: &ModelConfig,
    evidence: NodeId,
) -> Result<(VocabId, NodeId)> {
    let vocab = b.vocabulary("reset", cfg.dimensions)?;
    b.vocab_mut(vocab)?.add(RESET_KEY)?;
    let reset = b.state("reset", vocab, cfg.channel_tau)?;
    let memory = b.memory("reset_memory", vocab, DEFAULT_THRESHOLD, None)?;
    b.feed(reset, memory)?;
    b.inhibit(memory, evidence)?;
    Ok((vocab, reset))
}

fn motor_channel(b: &mut ModelBuilder, cfg: &ModelConfig) -> Result<NodeId> {
    let vocab = b.vocabulary("motor", cfg.dimensions)?;
    b.vocab_mut(vocab)?.populate("YES+NO+WAIT")?;
    b.state("motor", vocab, cfg.channel_tau)
}

fn stimulus_input(b: &mut ModelBuilder, words: VocabId, cfg: &ModelConfig) -> Result<NodeId> {
    let word = cfg
        .words
        .first()
        .ok_or(Error::Config("words must not be empty"))?;
    let p = b.vocab(words)?.pointer(word)?.clone();
    b.input("stimulus", words, Schedule::Constant(p))
}

/// stim → memory → evidence.
pub fn recognition(cfg: &ModelConfig) -> Result<Task> {
    let RecognitionCore {
        mut b,
        words,
        stim,
        memory,
        evidence,
    } = recognition_core(cfg)?;
    let stimulus = stimulus_input(&mut b, words, cfg)?;
    b.feed(stimulus, stim)?;

    Ok(Task {
        variant: Variant::Recognition,
        model: b.build()?,
        stimulus: Some(stimulus),
        stim,
        memory,
        evidence,
        reset_stimulus: None,
        reset: None,
        motor: None,
        attention: None,
        environment: None,
        response_threshold: cfg.response_threshold,
        duration: cfg.duration,
    })
}

/// [`recognition`] plus a reset the caller triggers through `reset_stimulus`.
pub fn resettable(cfg: &ModelConfig) -> Result<Task> {
    let RecognitionCore {
        mut b,
        words,
        stim,
        memory,
        evidence,
    } = recognition_core(cfg)?;
    let stimulus = stimulus_input(&mut b, words, cfg)?;
    b.feed(stimulus, stim)?;

    let (reset_vocab, reset) = reset_path(&mut b, cfg, evidence)?;
    let reset_stimulus = b.input("reset_stimulus", reset_vocab, Schedule::Off)?;
    b.feed(reset_stimulus, reset)?;

    Ok(Task {
        variant: Variant::Resettable,
        model: b.build()?,
        stimulus: Some(stimulus),
        stim,
        memory,
        evidence,
        reset_stimulus: Some(reset_stimulus),
        reset: Some(reset),
        motor: None,
        attention: None,
        environment: None,
        response_threshold: cfg.response_threshold,
        duration: cfg.duration,
    })
}

/// Accumulate to threshold: `evidence` answers YES, `-evidence` answers NO,
/// both reset the accumulator; `action_threshold` holds WAIT until then.
pub fn threshold(cfg: &ModelConfig) -> Result<Task> {
    let RecognitionCore {
        mut b,
        words,
        stim,
        memory,
        evidence,
    } = recognition_core(cfg)?;
    let stimulus = stimulus_input(&mut b, words, cfg)?;
    b.feed(stimulus, stim)?;

    let (_, reset) = reset_path(&mut b, cfg, evidence)?;
    let motor = motor_channel(&mut b, cfg)?;

    let e = b.scalar(evidence)?;
    let effects = vec![b.set(motor, YES)?, b.set(reset, RESET_KEY)?];
    b.rule("yes", e.clone(), effects)?;
    let effects = vec![b.set(motor, NO)?, b.set(reset, RESET_KEY)?];
    b.rule("no", -e, effects)?;
    let effects = vec![b.set(motor, WAIT)?];
    b.rule("wait", Utility::constant(cfg.action_threshold), effects)?;
    b.selection(cfg.selection, cfg.thalamus_tau)?;

    Ok(Task {
        variant: Variant::Threshold,
        model: b.build()?,
        stimulus: Some(stimulus),
        stim,
        memory,
        evidence,
        reset_stimulus: None,
        reset: Some(reset),
        motor: Some(motor),
        attention: None,
        environment: None,
        response_threshold: cfg.response_threshold,
        duration: cfg.duration,
    })
}

/// Attend to the first word; reject it, or reset and move on to the second,
/// which decides the answer.
pub fn sequential(cfg: &ModelConfig) -> Result<Task> {
    if cfg.words.len() != 2 {
        return Err(Error::Config("the sequential task needs exactly two words"));
    }
    let RecognitionCore {
        mut b,
        words,
        stim,
        memory,
        evidence,
    } = recognition_core(cfg)?;

    let (_, reset) = reset_path(&mut b, cfg, evidence)?;
    let motor = motor_channel(&mut b, cfg)?;

    let slots = b.vocabulary("attention", cfg.dimensions)?;
    b.vocab_mut(slots)?.populate("W1+W2")?;
    let attention = b.state("attention", slots, cfg.channel_tau)?;
    let first = b.pointer(slots, "W1")?;
    let cue = b.input(
        "cue",
        slots,
        Schedule::Until {
            pointer: first,
            until: cfg.attention_cue,
        },
    )?;
    b.feed(cue, attention)?;

    let shown: Vec<&str> = cfg.words.iter().map(String::as_str).collect();
    let environment = b.environment(
        "environment",
        slots,
        &["W1", "W2"],
        words,
        &shown,
        cfg.attention_threshold,
    )?;
    b.feed(attention, environment)?;
    b.feed(environment, stim)?;

    let e = b.scalar(evidence)?;
    let k = cfg.action_threshold;
    let w1 = b.similarity(attention, "W1")?;
    let w2 = b.similarity(attention, "W2")?;

    // first word: reject, or accept and move attention on
    let effects = vec![b.set(motor, NO)?, b.set(attention, "W1")?];
    b.rule("w1_reject", w1.clone() - e.clone() - k, effects)?;
    let effects = vec![b.set(attention, "W2")?, b.set(reset, RESET_KEY)?];
    b.rule("w1_accept", w1.clone() + e.clone() - k, effects)?;
    let effects = vec![b.set(attention, "W1")?];
    b.rule("w1_hold", w1, effects)?;

    // second word decides
    let effects = vec![b.set(motor, NO)?, b.set(attention, "W2")?];
    b.rule("w2_reject", w2.clone() - e.clone() - k, effects)?;
    let effects = vec![b.set(motor, YES)?, b.set(attention, "W2")?];
    b.rule("w2_accept", w2.clone() + e - k, effects)?;
    let effects = vec![b.set(attention, "W2")?];
    b.rule("w2_hold", w2, effects)?;
    b.selection(cfg.selection, cfg.thalamus_tau)?;

    Ok(Task {
        variant: Variant::Sequential,
        model: b.build()?,
        stimulus: None,
        stim,
        memory,
        evidence,
        reset_stimulus: None,
        reset: Some(reset),
        motor: Some(motor),
        attention: Some(attention),
        environment: Some(environment),
        response_threshold: cfg.response_threshold,
        duration: cfg.duration,
    })
}

/// A motor response that started at `time`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResponseEvent {
    pub time: f32,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialOutcome {
    /// Motor symbol held at the end of the trial, if any clears the response
    /// threshold.
    pub response: Option<String>,
    /// Start of the run of `response` that lasted to the end.
    pub response_time: Option<f32>,
    /// Every response onset, in order.
    pub responses: Vec<ResponseEvent>,
    /// Whether attention ever selected the second word.
    pub reached_second_word: bool,
    pub final_evidence: f32,
    pub peak_evidence: f32,
    pub min_evidence: f32,
}

impl TrialOutcome {
    /// First YES or NO onset (WAIT skipped).
    pub fn decision(&self) -> Option<&ResponseEvent> {
        self.responses.iter().find(|r| r.symbol != WAIT)
    }
}

impl Task {
    pub fn simulator(&self) -> Simulator<'_> {
        Simulator::new(&self.model)
    }

    /// Show `word` (or nothing) on the stimulus input.
    pub fn present(&self, sim: &mut Simulator<'_>, word: Option<&str>) -> Result<()> {
        let input = self
            .stimulus
            .ok_or(Error::Config("this task reads its words from the environment"))?;
        let value = match word {
            Some(w) => {
                let vocab = self
                    .model
                    .vocabulary_of(input)
                    .ok_or(Error::UnknownNode(input.index()))?;
                Some(vocab.pointer(w)?.clone())
            }
            None => Some(crate::pointer::SemanticPointer::zeros(
                sim.value(input).len(),
            )),
        };
        sim.set_input(input, value)
    }

    /// Drive (or release) the external reset.
    pub fn hold_reset(&self, sim: &mut Simulator<'_>, on: bool) -> Result<()> {
        let input = self
            .reset_stimulus
            .ok_or(Error::Config("this task has no external reset"))?;
        let value = if on {
            let vocab = self
                .model
                .vocabulary_of(input)
                .ok_or(Error::UnknownNode(input.index()))?;
            Some(vocab.pointer(RESET_KEY)?.clone())
        } else {
            None
        };
        sim.set_input(input, value)
    }

    /// Run a fresh simulator for the configured duration.
    pub fn run(&self) -> TrialOutcome {
        self.run_for(self.duration)
    }

    pub fn run_for(&self, seconds: f32) -> TrialOutcome {
        let mut sim = self.simulator();
        let mut recorder = ResponseRecorder::new(self);
        let steps = (seconds / self.model.dt()).round().max(0.0) as u64;
        for _ in 0..steps {
            sim.step();
            recorder.observe(&sim);
        }
        let outcome = recorder.finish(&sim);
        tracing::debug!(
            task = self.variant.name(),
            response = ?outcome.response,
            response_time = ?outcome.response_time,
            evidence = outcome.final_evidence,
            "trial finished"
        );
        outcome
    }

    fn attention_environment(&self) -> Option<&AttentionEnvironment> {
        let node = self.model.node(self.environment?).ok()?;
        match &node.kind {
            NodeKind::Environment { environment, .. } => Some(environment),
            _ => None,
        }
    }
}

/// Turns the motor channel into discrete response events while a trial runs.
pub struct ResponseRecorder<'t> {
    task: &'t Task,
    environment: Option<&'t AttentionEnvironment>,
    current: Option<String>,
    since: f32,
    outcome: TrialOutcome,
}

impl<'t> ResponseRecorder<'t> {
    pub fn new(task: &'t Task) -> Self {
        Self {
            task,
            environment: task.attention_environment(),
            current: None,
            since: 0.0,
            outcome: TrialOutcome::default(),
        }
    }

    /// Motor symbol above the response threshold right now.
    pub fn response(&self, sim: &Simulator<'_>) -> Option<String> {
        let motor = self.task.motor?;
        let (key, s) = sim.read(motor)?;
        (s >= self.task.response_threshold).then(|| key.to_string())
    }

    pub fn observe(&mut self, sim: &Simulator<'_>) {
        let e = sim.value(self.task.evidence)[0];
        self.outcome.peak_evidence = self.outcome.peak_evidence.max(e);
        self.outcome.min_evidence = self.outcome.min_evidence.min(e);

        if let (Some(env), Some(attention)) = (self.environment, self.task.attention) {
            if env.attended(sim.value(attention)) == Some(1) {
                self.outcome.reached_second_word = true;
            }
        }

        let response = self.response(sim);
        if response != self.current {
            if let Some(symbol) = &response {
                tracing::debug!(t = sim.time(), response = %symbol, "response onset");
                self.outcome.responses.push(ResponseEvent {
                    time: sim.time(),
                    symbol: symbol.clone(),
                });
            }
            self.current = response;
            self.since = sim.time();
        }
    }

    pub fn finish(mut self, sim: &Simulator<'_>) -> TrialOutcome {
        self.outcome.final_evidence = sim.value(self.task.evidence)[0];
        self.outcome.response_time = self.current.as_ref().map(|_| self.since);
        self.outcome.response = self.current;
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(variant: Variant, w: &str) -> ModelConfig {
        variant.default_config().with_words(&[w])
    }

    #[test]
    fn recognition_evidence_follows_familiarity() {
        let task = recognition(&word(Variant::Recognition, "C")).unwrap();
        let out = task.run_for(0.5);
        // 0.1 / 0.1 per second
        assert!((out.final_evidence - 0.5).abs() < 0.05, "{}", out.final_evidence);
        assert_eq!(out.response, None);

        let task = recognition(&word(Variant::Recognition, "H")).unwrap();
        let out = task.run_for(0.5);
        assert!(out.final_evidence < -0.4);
    }

    #[test]
    fn distractor_words_are_symbols_the_memory_does_not_know() {
        let task = recognition(&word(Variant::Recognition, "H")).unwrap();
        let memory = task.model.node(task.memory).unwrap();
        let NodeKind::Memory { memory, .. } = &memory.kind else {
            panic!("not a memory");
        };
        assert!(!memory.keys().iter().any(|k| k == "H"));
        assert!(task.model.vocabulary_of(task.stim).unwrap().contains("H"));
    }

    #[test]
    fn invalid_words_are_rejected() {
        assert!(matches!(
            recognition(&word(Variant::Recognition, "lower")),
            Err(Error::InvalidSymbolName(_))
        ));
        let cfg = ModelConfig::default().with_words(&["A", "B", "C"]);
        assert!(matches!(sequential(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn external_reset_clears_evidence() {
        let task = resettable(&word(Variant::Resettable, "C")).unwrap();
        let mut sim = task.simulator();
        sim.run(0.6);
        let before = sim.value(task.evidence)[0];
        assert!(before > 0.5);
        task.hold_reset(&mut sim, true).unwrap();
        sim.run(0.4);
        assert!(sim.value(task.evidence)[0].abs() < 0.1);
        task.hold_reset(&mut sim, false).unwrap();
        sim.run(0.8);
        assert!(sim.value(task.evidence)[0] > 0.3);
    }

    #[test]
    fn present_swaps_the_stimulus() {
        let task = recognition(&word(Variant::Recognition, "C")).unwrap();
        let mut sim = task.simulator();
        task.present(&mut sim, Some("H")).unwrap();
        sim.run(0.2);
        assert!(sim.value(task.evidence)[0] < 0.0);
        task.present(&mut sim, None).unwrap();
        assert!(task.hold_reset(&mut sim, true).is_err());
        assert!(matches!(
            task.present(&mut sim, Some("Q")),
            Err(Error::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn threshold_task_answers_after_waiting() {
        let task = threshold(&word(Variant::Threshold, "C")).unwrap();
        let out = task.run_for(1.0);
        assert_eq!(out.responses.first().map(|r| r.symbol.as_str()), Some(WAIT));
        let decision = out.decision().unwrap();
        assert_eq!(decision.symbol, YES);
        assert!(decision.time > 0.2 && decision.time < 0.5, "{}", decision.time);

        let task = threshold(&word(Variant::Threshold, "H")).unwrap();
        let out = task.run_for(1.0);
        assert_eq!(out.decision().unwrap().symbol, NO);
    }

    #[test]
    fn sequential_rules_are_named_per_slot() {
        let task = sequential(&ModelConfig::default()).unwrap();
        let names: Vec<&str> = task
            .model
            .actions()
            .unwrap()
            .rules
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["w1_reject", "w1_accept", "w1_hold", "w2_reject", "w2_accept", "w2_hold"]
        );
    }
}
