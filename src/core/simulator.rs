//! Fixed-step simulator over a built [`Model`].
//!
//! Every step is synchronous: all next values are computed from the current
//! ones and swapped in together, like the double-buffered amplitude update in
//! a recurrent substrate. Stateless nodes (inputs, environments, memories) are
//! re-evaluated from the new state at the end of each step.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::action::{Rule, SignalSource};
use crate::dynamics::{evidence_drive, lowpass_into, Accumulator};
use crate::error::{Error, Result};
use crate::memory::Recall;
use crate::model::{Edge, Model, NodeId, NodeKind};
use crate::pointer::{check_dims, SemanticPointer};

/// Handle to a recording registered with [`Simulator::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeId(usize);

/// Samples of one node, taken every `every` steps.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trace {
    pub node: String,
    pub times: Vec<f32>,
    pub samples: Vec<Vec<f32>>,
}

impl Trace {
    /// Dot product of every sample with `pointer`.
    pub fn similarity(&self, pointer: &SemanticPointer) -> Vec<f32> {
        self.samples.iter().map(|s| pointer.dot(s)).collect()
    }

    /// First element of every sample (scalar nodes).
    pub fn scalars(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|s| s.first().copied().unwrap_or(0.0))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Probe {
    node: NodeId,
    every: u64,
    trace: Trace,
}

pub struct Simulator<'m> {
    model: &'m Model,
    steps: u64,

    values: Vec<Vec<f32>>,
    next_values: Vec<Vec<f32>>,
    recalls: Vec<Option<Recall>>,
    accumulators: Vec<Option<Accumulator>>,
    overrides: Vec<Option<SemanticPointer>>,

    utilities: Vec<f32>,
    targets: Vec<f32>,
    activations: Vec<f32>,
    next_activations: Vec<f32>,

    dominant: Option<&'m Rule>,

    scratch: Vec<f32>,
    probes: Vec<Probe>,
}

impl<'m> Simulator<'m> {
    pub fn new(model: &'m Model) -> Self {
        let n = model.nodes().len();
        let values: Vec<Vec<f32>> = (0..n)
            .map(|i| vec![0.0; model.output_dimensions(NodeId::new(i))])
            .collect();
        let accumulators = model
            .nodes()
            .iter()
            .map(|node| match node.kind {
                NodeKind::Accumulator { params } => Some(Accumulator::new(params)),
                _ => None,
            })
            .collect();
        let rules = model.actions().map(|a| a.len()).unwrap_or(0);
        let widest = model
            .nodes()
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Environment { environment, .. } => Some(environment.input_dimensions()),
                _ => None,
            })
            .chain(values.iter().map(Vec::len))
            .max()
            .unwrap_or(0);

        let mut sim = Self {
            model,
            steps: 0,
            next_values: values.clone(),
            values,
            recalls: vec![None; n],
            accumulators,
            overrides: vec![None; n],
            utilities: vec![0.0; rules],
            targets: vec![0.0; rules],
            activations: vec![0.0; rules],
            next_activations: vec![0.0; rules],
            dominant: None,
            scratch: vec![0.0; widest],
            probes: Vec::new(),
        };
        sim.evaluate_stateless();
        sim
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated time in seconds.
    pub fn time(&self) -> f32 {
        self.steps as f32 * self.model.dt()
    }

    /// Back to t = 0 with every state zeroed. Probes are kept but emptied;
    /// input overrides are kept.
    pub fn reset(&mut self) {
        self.steps = 0;
        self.dominant = None;
        for v in self.values.iter_mut().chain(self.next_values.iter_mut()) {
            v.iter_mut().for_each(|x| *x = 0.0);
        }
        for acc in self.accumulators.iter_mut().flatten() {
            acc.clear();
        }
        for buf in [
            &mut self.utilities,
            &mut self.targets,
            &mut self.activations,
            &mut self.next_activations,
        ] {
            buf.iter_mut().for_each(|x| *x = 0.0);
        }
        for p in &mut self.probes {
            p.trace.times.clear();
            p.trace.samples.clear();
        }
        self.evaluate_stateless();
    }

    /// Replace an input node's schedule until cleared with `None`.
    pub fn set_input(&mut self, node: NodeId, value: Option<SemanticPointer>) -> Result<()> {
        let n = self.model.node(node)?;
        let NodeKind::Input { .. } = n.kind else {
            return Err(Error::NodeKind {
                node: n.name.clone(),
                expected: "an input node",
            });
        };
        if let Some(v) = &value {
            check_dims(self.values[node.index()].len(), v.dimensions())?;
        }
        self.overrides[node.index()] = value;
        self.evaluate_stateless();
        Ok(())
    }

    /// Record `node` every `every` steps (and once at registration).
    pub fn probe(&mut self, node: NodeId, every: u64) -> Result<ProbeId> {
        let name = self.model.node(node)?.name.clone();
        let mut probe = Probe {
            node,
            every: every.max(1),
            trace: Trace {
                node: name,
                ..Trace::default()
            },
        };
        probe.trace.times.push(self.time());
        probe.trace.samples.push(self.values[node.index()].clone());
        self.probes.push(probe);
        Ok(ProbeId(self.probes.len() - 1))
    }

    pub fn trace(&self, id: ProbeId) -> Option<&Trace> {
        self.probes.get(id.0).map(|p| &p.trace)
    }

    /// Current output of a node. Scalar nodes yield a one-element slice.
    pub fn value(&self, node: NodeId) -> &[f32] {
        &self.values[node.index()]
    }

    /// Latest lookup of a memory node.
    pub fn recall(&self, node: NodeId) -> Option<&Recall> {
        self.recalls.get(node.index())?.as_ref()
    }

    pub fn utilities(&self) -> &[f32] {
        &self.utilities
    }

    pub fn activations(&self) -> &[f32] {
        &self.activations
    }

    /// Rule with the highest utility at the last step, by name.
    pub fn dominant_rule(&self) -> Option<&'m str> {
        self.dominant.map(|r| r.name.as_str())
    }

    /// Similarity of a node's output with one of its vocabulary's symbols.
    pub fn similarity(&self, node: NodeId, symbol: &str) -> Result<f32> {
        let vocab = self
            .model
            .vocabulary_of(node)
            .ok_or(Error::Config("node has no vocabulary"))?;
        Ok(vocab.pointer(symbol)?.dot(self.value(node)))
    }

    /// Best-matching symbol for a node's output, if any.
    pub fn read(&self, node: NodeId) -> Option<(&'m str, f32)> {
        let vocab = self.model.vocabulary_of(node)?;
        vocab.closest(self.value(node)).ok().flatten()
    }

    pub fn run(&mut self, seconds: f32) {
        let n = (seconds / self.model.dt()).round().max(0.0) as u64;
        self.run_steps(n);
    }

    pub fn run_steps(&mut self, n: u64) {
        for _ in 0..n {
            self.step();
        }
    }

    pub fn step(&mut self) {
        let model = self.model;
        let dt = model.dt();

        if let Some(actions) = model.actions() {
            let mut utilities = std::mem::take(&mut self.utilities);
            actions.evaluate(&*self, &mut utilities);
            actions.basal_ganglia.select(&utilities, &mut self.targets);

            let dominant = actions.dominant(&utilities);
            if dominant.map(|r| &r.name) != self.dominant.map(|r| &r.name) {
                tracing::debug!(
                    t = self.time(),
                    rule = dominant.map(|r| r.name.as_str()),
                    "dominant rule changed"
                );
                self.dominant = dominant;
            }
            self.utilities = utilities;
        }

        for (i, node) in model.nodes().iter().enumerate() {
            let id = NodeId::new(i);
            match &node.kind {
                NodeKind::State { tau, .. } => {
                    let dims = self.values[i].len();
                    let mut input = std::mem::take(&mut self.scratch);
                    input[..dims].iter_mut().for_each(|x| *x = 0.0);
                    self.sum_feeds(id, &mut input[..dims]);
                    if let Some(actions) = model.actions() {
                        actions.route(&self.activations, id, &mut input[..dims]);
                    }
                    lowpass_into(&self.values[i], &input[..dims], dt, *tau, &mut self.next_values[i]);
                    self.scratch = input;
                }
                NodeKind::Accumulator { .. } => {
                    let (drive, reset) = self.accumulator_inputs(id);
                    if let Some(acc) = self.accumulators[i].as_mut() {
                        self.next_values[i][0] = acc.step(drive, reset, dt);
                    }
                }
                _ => {}
            }
        }

        if let Some(actions) = model.actions() {
            actions
                .thalamus
                .step(&self.activations, &self.targets, dt, &mut self.next_activations);
            std::mem::swap(&mut self.activations, &mut self.next_activations);
        }

        for (i, node) in model.nodes().iter().enumerate() {
            if node.is_stateful() {
                std::mem::swap(&mut self.values[i], &mut self.next_values[i]);
            }
        }

        self.steps += 1;
        self.evaluate_stateless();
        self.record();

        tracing::trace!(step = self.steps, rule = ?self.dominant_rule(), "step");
    }

    fn record(&mut self) {
        let t = self.time();
        for p in &mut self.probes {
            if self.steps % p.every == 0 {
                p.trace.times.push(t);
                p.trace.samples.push(self.values[p.node.index()].clone());
            }
        }
    }

    /// Recompute inputs, environments and memories from the current state.
    fn evaluate_stateless(&mut self) {
        let model = self.model;
        let t = self.time();
        for &id in model.stateless_order() {
            let i = id.index();
            let Some(node) = model.nodes().get(i) else {
                continue;
            };
            match &node.kind {
                NodeKind::Input { schedule, .. } => {
                    let value = self.overrides[i].as_ref().or_else(|| schedule.value_at(t));
                    match value {
                        Some(p) => self.values[i].copy_from_slice(p.as_slice()),
                        None => self.values[i].iter_mut().for_each(|x| *x = 0.0),
                    }
                }
                NodeKind::Environment { environment, .. } => {
                    let dims = environment.input_dimensions();
                    let mut input = std::mem::take(&mut self.scratch);
                    input[..dims].iter_mut().for_each(|x| *x = 0.0);
                    self.sum_feeds(id, &mut input[..dims]);
                    environment.present_into(&input[..dims], &mut self.values[i]);
                    self.scratch = input;
                }
                NodeKind::Memory { memory, .. } => {
                    let dims = memory.dimensions();
                    let mut input = std::mem::take(&mut self.scratch);
                    input[..dims].iter_mut().for_each(|x| *x = 0.0);
                    self.sum_feeds(id, &mut input[..dims]);
                    let recall = memory.lookup(&input[..dims]);
                    self.values[i].copy_from_slice(recall.output.as_slice());
                    self.recalls[i] = Some(recall);
                    self.scratch = input;
                }
                NodeKind::State { .. } | NodeKind::Accumulator { .. } => {}
            }
        }
    }

    fn sum_feeds(&self, to: NodeId, out: &mut [f32]) {
        for e in self.model.edges() {
            if let Edge::Feed { from, to: dst } = *e {
                if dst == to {
                    for (o, x) in out.iter_mut().zip(&self.values[from.index()]) {
                        *o += x;
                    }
                }
            }
        }
    }

    fn accumulator_inputs(&self, acc: NodeId) -> (f32, f32) {
        let mut drive = 0.0;
        let mut reset = 0.0;
        for e in self.model.edges() {
            match *e {
                Edge::Evidence {
                    memory,
                    accumulator,
                    scale,
                } if accumulator == acc => {
                    if let Some(r) = self.recall(memory) {
                        drive += evidence_drive(r, scale);
                    }
                }
                Edge::Inhibit {
                    memory,
                    accumulator,
                } if accumulator == acc => {
                    if let Some(r) = self.recall(memory) {
                        reset += r.activity();
                    }
                }
                _ => {}
            }
        }
        (drive, reset)
    }
}

impl SignalSource for Simulator<'_> {
    fn vector(&self, node: NodeId) -> &[f32] {
        &self.values[node.index()]
    }

    fn scalar(&self, node: NodeId) -> f32 {
        self.values[node.index()].first().copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::AccumulatorParams;
    use crate::model::{ModelBuilder, Schedule};

    const DT: f32 = 0.001;

    fn recognizer(word: &str) -> (Model, NodeId, NodeId) {
        let mut b = ModelBuilder::new(DT, 3).unwrap();
        let words = b.vocabulary("memory", 16).unwrap();
        b.vocab_mut(words).unwrap().populate("A+B+C+D+E+F").unwrap();
        let memory = b.memory("memory", words, 0.3, Some("NONE")).unwrap();
        b.vocab_mut(words).unwrap().ensure(word).unwrap();
        let p = b.pointer(words, word).unwrap();
        let stim = b.input("stim", words, Schedule::Constant(p)).unwrap();
        let evidence = b.accumulator("evidence", AccumulatorParams::default()).unwrap();
        b.feed(stim, memory).unwrap();
        b.evidence(memory, evidence, 0.3).unwrap();
        (b.build().unwrap(), memory, evidence)
    }

    #[test]
    fn known_word_accumulates_positive_evidence() {
        let (model, memory, evidence) = recognizer("C");
        let mut sim = Simulator::new(&model);
        assert!(sim.recall(memory).unwrap().recognized);
        sim.run(0.5);
        assert_eq!(sim.steps(), 500);
        assert!(sim.scalar(evidence) > 0.9);
    }

    #[test]
    fn unknown_word_accumulates_negative_evidence() {
        let (model, memory, evidence) = recognizer("H");
        let mut sim = Simulator::new(&model);
        assert!(!sim.recall(memory).unwrap().recognized);
        sim.run(0.5);
        assert!(sim.scalar(evidence) < -0.9);
        assert!(sim.similarity(memory, "NONE").unwrap() > 0.99);
    }

    #[test]
    fn runs_are_deterministic_and_reset_restarts() {
        let (model, _, evidence) = recognizer("C");
        let mut a = Simulator::new(&model);
        let mut b = Simulator::new(&model);
        a.run(0.2);
        b.run(0.2);
        assert_eq!(a.scalar(evidence), b.scalar(evidence));

        let v = a.scalar(evidence);
        a.reset();
        assert_eq!(a.scalar(evidence), 0.0);
        assert_eq!(a.time(), 0.0);
        a.run(0.2);
        assert_eq!(a.scalar(evidence), v);
    }

    #[test]
    fn input_override_replaces_schedule() {
        let (model, memory, evidence) = recognizer("C");
        let stim = model.find("stim").unwrap();
        let mut sim = Simulator::new(&model);
        sim.set_input(stim, Some(SemanticPointer::zeros(16))).unwrap();
        assert!(!sim.recall(memory).unwrap().recognized);
        sim.run(0.1);
        assert!(sim.scalar(evidence) < 0.0);
        assert!(sim.set_input(evidence, None).is_err());
        assert!(matches!(
            sim.set_input(stim, Some(SemanticPointer::zeros(3))),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn probes_sample_on_schedule() {
        let (model, _, evidence) = recognizer("C");
        let mut sim = Simulator::new(&model);
        let probe = sim.probe(evidence, 10).unwrap();
        sim.run_steps(100);
        let trace = sim.trace(probe).unwrap();
        assert_eq!(trace.times.len(), 11);
        let values = trace.scalars();
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn state_follows_its_feed_with_channel_lag() {
        let mut b = ModelBuilder::new(DT, 1).unwrap();
        let v = b.vocabulary("v", 16).unwrap();
        b.vocab_mut(v).unwrap().populate("X").unwrap();
        let x = b.pointer(v, "X").unwrap();
        let input = b.input("in", v, Schedule::Constant(x)).unwrap();
        let state = b.state("state", v, 0.01).unwrap();
        b.feed(input, state).unwrap();
        let model = b.build().unwrap();
        let mut sim = Simulator::new(&model);
        sim.run_steps(10);
        let s = sim.similarity(state, "X").unwrap();
        assert!((s - 0.65).abs() < 0.02, "{s}");
        sim.run(0.1);
        assert_eq!(sim.read(state).unwrap().0, "X");
    }

    #[test]
    fn rules_drive_states_through_the_thalamus() {
        let mut b = ModelBuilder::new(DT, 1).unwrap();
        let motor = b.vocabulary("motor", 16).unwrap();
        b.vocab_mut(motor).unwrap().populate("YES+NO").unwrap();
        let out = b.state("motor", motor, 0.01).unwrap();
        let yes = b.set(out, "YES").unwrap();
        let no = b.set(out, "NO").unwrap();
        b.rule("yes", crate::action::Utility::constant(0.9), vec![yes]).unwrap();
        b.rule("no", crate::action::Utility::constant(0.2), vec![no]).unwrap();
        let model = b.build().unwrap();
        let mut sim = Simulator::new(&model);
        sim.run(0.2);
        assert_eq!(sim.dominant_rule(), Some("yes"));
        assert!(sim.activations()[0] > 0.99);
        assert_eq!(sim.activations()[1], 0.0);
        assert!(sim.similarity(out, "YES").unwrap() > 0.95);
    }
}
