//! Model graph: an arena of typed nodes plus an explicit edge list.
//!
//! A `ModelBuilder` checks every connection as it is made (node kinds,
//! dimensions, symbol names). `build()` freezes the result into an immutable
//! `Model` that any number of simulators can run.

use crate::action::{
    ActionSelection, BasalGanglia, Effect, Rule, ScalarTerm, Selection, SimilarityTerm, Thalamus,
    Utility,
};
use crate::dynamics::{check_tau, AccumulatorParams};
use crate::environment::AttentionEnvironment;
use crate::error::{Error, Result};
use crate::memory::AssociativeMemory;
use crate::pointer::{check_dims, SemanticPointer};
use crate::prng::Prng;
use crate::vocab::{Vocabulary, DEFAULT_ATTEMPTS, DEFAULT_MAX_SIMILARITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VocabId(usize);

impl VocabId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Time course of an external input.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    Off,
    Constant(SemanticPointer),
    /// On for `t < until`, zero afterwards.
    Until { pointer: SemanticPointer, until: f32 },
    /// On for `from <= t < until`.
    Window {
        pointer: SemanticPointer,
        from: f32,
        until: f32,
    },
}

impl Schedule {
    pub fn value_at(&self, t: f32) -> Option<&SemanticPointer> {
        match self {
            Schedule::Off => None,
            Schedule::Constant(p) => Some(p),
            Schedule::Until { pointer, until } => (t < *until).then_some(pointer),
            Schedule::Window {
                pointer,
                from,
                until,
            } => (t >= *from && t < *until).then_some(pointer),
        }
    }

    fn dimensions(&self) -> Option<usize> {
        match self {
            Schedule::Off => None,
            Schedule::Constant(p)
            | Schedule::Until { pointer: p, .. }
            | Schedule::Window { pointer: p, .. } => Some(p.dimensions()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Vector channel: low-passed sum of its feeds and routed rule effects.
    State { vocab: VocabId, tau: f32 },
    /// Cleanup memory over the sum of its feeds.
    Memory {
        vocab: VocabId,
        memory: AssociativeMemory,
    },
    /// Scalar evidence integrator.
    Accumulator { params: AccumulatorParams },
    /// Attention-driven word source.
    Environment {
        environment: AttentionEnvironment,
        slots: VocabId,
        words: VocabId,
    },
    /// Externally scheduled vector.
    Input { vocab: VocabId, schedule: Schedule },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::State { .. } => "state",
            NodeKind::Memory { .. } => "memory",
            NodeKind::Accumulator { .. } => "accumulator",
            NodeKind::Environment { .. } => "environment",
            NodeKind::Input { .. } => "input",
        }
    }

    /// Size of the value this node produces.
    pub fn output_dimensions(&self, model_vocabs: &[Vocabulary]) -> usize {
        match &self.kind {
            NodeKind::State { vocab, .. }
            | NodeKind::Memory { vocab, .. }
            | NodeKind::Input { vocab, .. } => model_vocabs[vocab.0].dimensions(),
            NodeKind::Environment { environment, .. } => environment.output_dimensions(),
            NodeKind::Accumulator { .. } => 1,
        }
    }

    /// Size a feed into this node must have, if it takes feeds at all.
    fn input_dimensions(&self, model_vocabs: &[Vocabulary]) -> Option<usize> {
        match &self.kind {
            NodeKind::State { vocab, .. } => Some(model_vocabs[vocab.0].dimensions()),
            NodeKind::Memory { memory, .. } => Some(memory.dimensions()),
            NodeKind::Environment { environment, .. } => Some(environment.input_dimensions()),
            NodeKind::Accumulator { .. } | NodeKind::Input { .. } => None,
        }
    }

    /// The vocabulary this node's output is read in.
    pub fn vocab(&self) -> Option<VocabId> {
        match &self.kind {
            NodeKind::State { vocab, .. }
            | NodeKind::Memory { vocab, .. }
            | NodeKind::Input { vocab, .. } => Some(*vocab),
            NodeKind::Environment { words, .. } => Some(*words),
            NodeKind::Accumulator { .. } => None,
        }
    }

    /// State and accumulator nodes carry values across steps; everything else
    /// is recomputed from them each step.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::State { .. } | NodeKind::Accumulator { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    /// Vector output of `from` is added to the input of `to`.
    Feed { from: NodeId, to: NodeId },
    /// `+scale` into the accumulator while the memory recognizes, `-scale` otherwise.
    Evidence {
        memory: NodeId,
        accumulator: NodeId,
        scale: f32,
    },
    /// Memory activity drives the accumulator's reset inhibition.
    Inhibit { memory: NodeId, accumulator: NodeId },
}

/// Immutable assembled model.
#[derive(Debug, Clone)]
pub struct Model {
    dt: f32,
    vocabs: Vec<Vocabulary>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    actions: Option<ActionSelection>,
    stateless_order: Vec<NodeId>,
}

impl Model {
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.0))
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn actions(&self) -> Option<&ActionSelection> {
        self.actions.as_ref()
    }

    pub fn vocabularies(&self) -> &[Vocabulary] {
        &self.vocabs
    }

    pub fn vocabulary(&self, id: VocabId) -> Result<&Vocabulary> {
        self.vocabs.get(id.0).ok_or(Error::UnknownVocabulary(id.0))
    }

    pub fn vocabulary_named(&self, name: &str) -> Option<&Vocabulary> {
        self.vocabs.iter().find(|v| v.name() == name)
    }

    /// Vocabulary a node's output should be read in.
    pub fn vocabulary_of(&self, id: NodeId) -> Option<&Vocabulary> {
        let vocab = self.nodes.get(id.0)?.vocab()?;
        self.vocabs.get(vocab.0)
    }

    pub fn output_dimensions(&self, id: NodeId) -> usize {
        self.nodes[id.0].output_dimensions(&self.vocabs)
    }

    /// Nodes without state, in an order where every feed is computed before
    /// it is read.
    pub fn stateless_order(&self) -> &[NodeId] {
        &self.stateless_order
    }
}

/// Assembles a [`Model`].
#[derive(Debug)]
pub struct ModelBuilder {
    dt: f32,
    rng: Prng,
    max_similarity: f32,
    attempts: usize,
    vocabs: Vec<Vocabulary>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    rules: Vec<Rule>,
    selection: Selection,
    thalamus_tau: f32,
}

impl ModelBuilder {
    pub fn new(dt: f32, seed: u64) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(Error::Config("dt must be finite and > 0"));
        }
        Ok(Self {
            dt,
            rng: Prng::new(seed),
            max_similarity: DEFAULT_MAX_SIMILARITY,
            attempts: DEFAULT_ATTEMPTS,
            vocabs: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            rules: Vec::new(),
            selection: Selection::default(),
            thalamus_tau: 0.01,
        })
    }

    /// Sampling bound applied to vocabularies created after this call.
    pub fn with_sampling(mut self, max_similarity: f32, attempts: usize) -> Self {
        self.max_similarity = max_similarity;
        self.attempts = attempts;
        self
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    // -- vocabularies -----------------------------------------------------

    pub fn vocabulary(&mut self, name: &str, dimensions: usize) -> Result<VocabId> {
        let salt = self.vocabs.len() as u64 + 1;
        let seed = self.rng.fork(salt).next_u64();
        let v = Vocabulary::new(name, dimensions, seed)?
            .with_sampling(self.max_similarity, self.attempts);
        self.vocabs.push(v);
        Ok(VocabId(self.vocabs.len() - 1))
    }

    pub fn vocab(&self, id: VocabId) -> Result<&Vocabulary> {
        self.vocabs.get(id.0).ok_or(Error::UnknownVocabulary(id.0))
    }

    pub fn vocab_mut(&mut self, id: VocabId) -> Result<&mut Vocabulary> {
        self.vocabs.get_mut(id.0).ok_or(Error::UnknownVocabulary(id.0))
    }

    /// Parse `expr` in vocabulary `id`.
    pub fn pointer(&self, id: VocabId, expr: &str) -> Result<SemanticPointer> {
        self.vocab(id)?.parse(expr)
    }

    // -- nodes -------------------------------------------------------------

    fn push(&mut self, name: &str, kind: NodeKind) -> Result<NodeId> {
        if self.nodes.iter().any(|n| n.name == name) {
            return Err(Error::DuplicateNode(name.to_string()));
        }
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.0))
    }

    pub fn state(&mut self, name: &str, vocab: VocabId, tau: f32) -> Result<NodeId> {
        self.vocab(vocab)?;
        check_tau(tau, self.dt)?;
        self.push(name, NodeKind::State { vocab, tau })
    }

    /// Cleanup memory over the symbols `vocab` holds right now; `default` is
    /// added to the vocabulary if needed and output when nothing matches.
    pub fn memory(
        &mut self,
        name: &str,
        vocab: VocabId,
        threshold: f32,
        default: Option<&str>,
    ) -> Result<NodeId> {
        let mut memory = AssociativeMemory::new(self.vocab(vocab)?, threshold)?;
        if let Some(key) = default {
            memory = memory.with_default(self.vocab_mut(vocab)?, key)?;
        }
        self.push(name, NodeKind::Memory { vocab, memory })
    }

    pub fn accumulator(&mut self, name: &str, params: AccumulatorParams) -> Result<NodeId> {
        params.validate(self.dt)?;
        self.push(name, NodeKind::Accumulator { params })
    }

    /// Word source: attending to `slot_keys[i]` shows `word_keys[i]`.
    pub fn environment(
        &mut self,
        name: &str,
        slots: VocabId,
        slot_keys: &[&str],
        words: VocabId,
        word_keys: &[&str],
        threshold: f32,
    ) -> Result<NodeId> {
        let slot_vocab = self.vocab(slots)?;
        let word_vocab = self.vocab(words)?;
        let s = slot_keys
            .iter()
            .map(|k| Ok((k.to_string(), slot_vocab.pointer(k)?.clone())))
            .collect::<Result<Vec<_>>>()?;
        let w = word_keys
            .iter()
            .map(|k| Ok((k.to_string(), word_vocab.pointer(k)?.clone())))
            .collect::<Result<Vec<_>>>()?;
        let environment = AttentionEnvironment::new(s, w, threshold)?;
        self.push(
            name,
            NodeKind::Environment {
                environment,
                slots,
                words,
            },
        )
    }

    pub fn input(&mut self, name: &str, vocab: VocabId, schedule: Schedule) -> Result<NodeId> {
        let dims = self.vocab(vocab)?.dimensions();
        if let Some(d) = schedule.dimensions() {
            check_dims(dims, d)?;
        }
        self.push(name, NodeKind::Input { vocab, schedule })
    }

    // -- edges -------------------------------------------------------------

    pub fn feed(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let src = self.get(from)?;
        if matches!(src.kind, NodeKind::Accumulator { .. }) {
            return Err(kind_error(src, "a vector-valued node"));
        }
        let out_dims = src.output_dimensions(&self.vocabs);

        let dst = self.get(to)?;
        let in_dims = dst
            .input_dimensions(&self.vocabs)
            .ok_or_else(|| kind_error(dst, "a state, memory or environment node"))?;
        check_dims(in_dims, out_dims)?;

        self.edges.push(Edge::Feed { from, to });
        Ok(())
    }

    pub fn evidence(&mut self, memory: NodeId, accumulator: NodeId, scale: f32) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(Error::Config("evidence scale must be in (0, 1]"));
        }
        self.expect_memory(memory)?;
        self.expect_accumulator(accumulator)?;
        self.edges.push(Edge::Evidence {
            memory,
            accumulator,
            scale,
        });
        Ok(())
    }

    pub fn inhibit(&mut self, memory: NodeId, accumulator: NodeId) -> Result<()> {
        self.expect_memory(memory)?;
        self.expect_accumulator(accumulator)?;
        self.edges.push(Edge::Inhibit {
            memory,
            accumulator,
        });
        Ok(())
    }

    fn expect_memory(&self, id: NodeId) -> Result<()> {
        let n = self.get(id)?;
        match n.kind {
            NodeKind::Memory { .. } => Ok(()),
            _ => Err(kind_error(n, "a memory node")),
        }
    }

    fn expect_accumulator(&self, id: NodeId) -> Result<()> {
        let n = self.get(id)?;
        match n.kind {
            NodeKind::Accumulator { .. } => Ok(()),
            _ => Err(kind_error(n, "an accumulator node")),
        }
    }

    // -- action rules --------------------------------------------------------

    /// `dot(channel, symbol)` as a utility term.
    pub fn similarity(&self, channel: NodeId, symbol: &str) -> Result<Utility> {
        let node = self.get(channel)?;
        let vocab = node
            .vocab()
            .ok_or_else(|| kind_error(node, "a vector-valued node"))?;
        let pointer = self.vocab(vocab)?.pointer(symbol)?.clone();
        Ok(Utility::Similarity(SimilarityTerm {
            channel,
            symbol: symbol.to_string(),
            pointer,
        }))
    }

    /// An accumulator's value as a utility term.
    pub fn scalar(&self, node: NodeId) -> Result<Utility> {
        self.expect_accumulator(node)?;
        Ok(Utility::Scalar(ScalarTerm { node }))
    }

    /// Effect: drive state `channel` toward `symbol`.
    pub fn set(&self, channel: NodeId, symbol: &str) -> Result<Effect> {
        let node = self.get(channel)?;
        let NodeKind::State { vocab, .. } = node.kind else {
            return Err(kind_error(node, "a state node"));
        };
        let pointer = self.vocab(vocab)?.pointer(symbol)?.clone();
        Ok(Effect {
            channel,
            symbol: symbol.to_string(),
            pointer,
        })
    }

    pub fn rule(&mut self, name: &str, utility: Utility, effects: Vec<Effect>) -> Result<()> {
        for id in utility.nodes() {
            self.get(id)?;
        }
        for e in &effects {
            self.get(e.channel)?;
        }
        self.rules.push(Rule::new(name, utility, effects));
        Ok(())
    }

    pub fn selection(&mut self, selection: Selection, thalamus_tau: f32) -> Result<()> {
        selection.validate()?;
        check_tau(thalamus_tau, self.dt)?;
        self.selection = selection;
        self.thalamus_tau = thalamus_tau;
        Ok(())
    }

    pub fn build(self) -> Result<Model> {
        let stateless_order = stateless_order(&self.nodes, &self.edges)?;

        let actions = if self.rules.is_empty() {
            None
        } else {
            Some(ActionSelection {
                rules: self.rules,
                basal_ganglia: BasalGanglia::new(self.selection),
                thalamus: Thalamus {
                    tau: self.thalamus_tau,
                },
            })
        };

        tracing::info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            rules = actions.as_ref().map(|a| a.len()).unwrap_or(0),
            vocabularies = self.vocabs.len(),
            "model built"
        );

        Ok(Model {
            dt: self.dt,
            vocabs: self.vocabs,
            nodes: self.nodes,
            edges: self.edges,
            actions,
            stateless_order,
        })
    }
}

fn kind_error(node: &Node, expected: &'static str) -> Error {
    Error::NodeKind {
        node: format!("{} ({})", node.name, node.kind_name()),
        expected,
    }
}

/// Topological order over stateless nodes (feeds between them must not loop).
fn stateless_order(nodes: &[Node], edges: &[Edge]) -> Result<Vec<NodeId>> {
    let n = nodes.len();
    let mut indegree = vec![0usize; n];
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
    for e in edges {
        if let Edge::Feed { from, to } = *e {
            if !nodes[from.0].is_stateful() && !nodes[to.0].is_stateful() {
                indegree[to.0] += 1;
                out[from.0].push(to.0);
            }
        }
    }

    let mut ready: Vec<usize> = (0..n)
        .filter(|&i| !nodes[i].is_stateful() && indegree[i] == 0)
        .rev()
        .collect();
    let mut order = Vec::new();
    while let Some(i) = ready.pop() {
        order.push(NodeId(i));
        for &j in &out[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(j);
            }
        }
    }

    let stateless = nodes.iter().filter(|n| !n.is_stateful()).count();
    if order.len() != stateless {
        return Err(Error::Config("feed loop between stateless nodes (route it through a state)"));
    }
    Ok(order)
}
