#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::model::{NodeId, NodeKind};
use crate::simulator::Simulator;

/// A read-only snapshot of what a running model is doing.
///
/// Observers cannot step or steer the simulator. Snapshotting is on demand and
/// allocates; the step loop is unaffected.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimSnapshot {
    pub time: f32,
    pub steps: u64,
    /// Every accumulator, by node name.
    pub scalars: Vec<(String, f32)>,
    /// Every vector channel with its best-matching symbol.
    pub channels: Vec<ChannelReading>,
    pub dominant_rule: Option<String>,
    /// Rule name and thalamic activation, for rules that are active at all.
    pub active_rules: Vec<(String, f32)>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelReading {
    pub name: String,
    pub symbol: Option<String>,
    pub similarity: f32,
}

impl SimSnapshot {
    pub fn scalar(&self, name: &str) -> Option<f32> {
        self.scalars.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelReading> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// One line: time, scalars, then `channel=SYMBOL(sim)` for readable channels.
    pub fn summary(&self) -> String {
        let mut line = format!("t={:.3}", self.time);
        for (name, v) in &self.scalars {
            line.push_str(&format!(" {name}={v:+.3}"));
        }
        for c in &self.channels {
            if let Some(sym) = &c.symbol {
                line.push_str(&format!(" {}={}({:.2})", c.name, sym, c.similarity));
            }
        }
        if let Some(rule) = &self.dominant_rule {
            line.push_str(&format!(" rule={rule}"));
        }
        line
    }
}

pub struct SimAdapter<'a, 'm> {
    sim: &'a Simulator<'m>,
}

impl<'a, 'm> SimAdapter<'a, 'm> {
    pub fn new(sim: &'a Simulator<'m>) -> Self {
        Self { sim }
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let model = self.sim.model();
        let mut scalars = Vec::new();
        let mut channels = Vec::new();

        for (i, node) in model.nodes().iter().enumerate() {
            let id = NodeId::new(i);
            match node.kind {
                NodeKind::Accumulator { .. } => {
                    scalars.push((node.name.clone(), self.sim.value(id)[0]));
                }
                NodeKind::State { .. } | NodeKind::Memory { .. } => {
                    let (symbol, similarity) = match self.sim.read(id) {
                        Some((k, s)) if s > 0.0 => (Some(k.to_string()), s),
                        _ => (None, 0.0),
                    };
                    channels.push(ChannelReading {
                        name: node.name.clone(),
                        symbol,
                        similarity,
                    });
                }
                NodeKind::Environment { .. } | NodeKind::Input { .. } => {}
            }
        }

        let active_rules = model
            .actions()
            .map(|a| {
                a.rules
                    .iter()
                    .zip(self.sim.activations())
                    .filter(|(_, &x)| x > 0.01)
                    .map(|(r, &x)| (r.name.clone(), x))
                    .collect()
            })
            .unwrap_or_default();

        SimSnapshot {
            time: self.sim.time(),
            steps: self.sim.steps(),
            scalars,
            channels,
            dominant_rule: self.sim.dominant_rule().map(str::to_string),
            active_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::tasks::{threshold, Variant};

    #[test]
    fn snapshot_reads_channels_and_rules() {
        let cfg = Variant::Threshold.default_config().with_words(&["C"]);
        let task = threshold(&cfg).unwrap();
        let mut sim = task.simulator();
        sim.run(0.1);

        let snap = SimAdapter::new(&sim).snapshot();
        assert_eq!(snap.steps, 100);
        assert!(snap.scalar("evidence").unwrap() > 0.2);
        assert_eq!(snap.channel("motor").unwrap().symbol.as_deref(), Some("WAIT"));
        assert_eq!(snap.channel("stim").unwrap().symbol.as_deref(), Some("C"));
        assert_eq!(snap.dominant_rule.as_deref(), Some("wait"));
        assert!(snap.active_rules.iter().any(|(n, _)| n == "wait"));
        assert!(snap.summary().starts_with("t=0.100"));
    }

    #[test]
    fn snapshots_do_not_disturb_the_run() {
        let task = threshold(&ModelConfig::default().with_words(&["C"])).unwrap();
        let mut a = task.simulator();
        let mut b = task.simulator();
        for _ in 0..50 {
            a.step();
            let _ = SimAdapter::new(&a).snapshot();
            b.step();
        }
        assert_eq!(a.value(task.evidence), b.value(task.evidence));
    }
}
