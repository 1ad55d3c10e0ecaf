#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::Result;
use crate::tasks::{sequential, TrialOutcome, Variant, NO, YES};

/// One sequential trial of a batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialReport {
    pub words: Vec<String>,
    pub seed: u64,
    /// YES when every word is known, NO otherwise.
    pub expected: String,
    pub outcome: TrialOutcome,
}

impl TrialReport {
    pub fn correct(&self) -> bool {
        self.outcome.response.as_deref() == Some(self.expected.as_str())
    }
}

fn expected(cfg: &ModelConfig, words: &[String]) -> String {
    let answer = if words.iter().all(|w| cfg.known_words.contains(w)) {
        YES
    } else {
        NO
    };
    answer.to_string()
}

fn run_one(cfg: &ModelConfig, words: &[String], seed: u64) -> Result<TrialReport> {
    let cfg = cfg.clone().with_words(words).with_seed(seed);
    let task = sequential(&cfg)?;
    Ok(TrialReport {
        words: words.to_vec(),
        seed,
        expected: expected(&cfg, words),
        outcome: task.run(),
    })
}

/// Every `(words, seed)` pair on its own model instance, in input order.
///
/// With the `parallel` feature the trials run on the rayon pool; results are
/// identical either way.
pub fn run_batch(
    cfg: &ModelConfig,
    words_list: &[Vec<String>],
    seeds: &[u64],
) -> Result<Vec<TrialReport>> {
    let jobs: Vec<(&Vec<String>, u64)> = words_list
        .iter()
        .flat_map(|w| seeds.iter().map(move |&s| (w, s)))
        .collect();

    #[cfg(feature = "parallel")]
    let reports = jobs
        .par_iter()
        .map(|(w, s)| run_one(cfg, w, *s))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let reports = jobs.iter().map(|(w, s)| run_one(cfg, w, *s)).collect();

    reports
}

#[derive(Debug, Clone)]
struct AssayReport {
    seeds: usize,
    scenarios: Vec<(String, String, f32, Option<f32>)>,
    recognition_known: f32,
    recognition_unknown: f32,
    reset_before: f32,
    reset_after: f32,
    threshold_yes: Option<f32>,
    threshold_no: Option<f32>,
}

/// Scenario table plus a recognition / reset / threshold summary.
pub fn run(cfg: &ModelConfig) -> Result<()> {
    let seeds: Vec<u64> = (cfg.seed..cfg.seed + 8).collect();
    let words_list: Vec<Vec<String>> = [["C", "B"], ["H", "B"], ["D", "J"]]
        .iter()
        .map(|ws| ws.iter().map(|w| w.to_string()).collect())
        .collect();

    let reports = run_batch(cfg, &words_list, &seeds)?;
    let mut scenarios = Vec::new();
    for words in &words_list {
        let rows: Vec<&TrialReport> = reports.iter().filter(|r| &r.words == words).collect();
        let correct = rows.iter().filter(|r| r.correct()).count() as f32 / rows.len() as f32;
        let times: Vec<f32> = rows.iter().filter_map(|r| r.outcome.response_time).collect();
        let mean_time = (!times.is_empty()).then(|| times.iter().sum::<f32>() / times.len() as f32);
        scenarios.push((
            words.join(","),
            rows.first().map(|r| r.expected.clone()).unwrap_or_default(),
            correct,
            mean_time,
        ));
    }

    let slow = Variant::Recognition.default_config().with_seed(cfg.seed);
    let recognition_known = Variant::Recognition
        .build(&slow.clone().with_words(&["C"]))?
        .run_for(0.5)
        .final_evidence;
    let recognition_unknown = Variant::Recognition
        .build(&slow.clone().with_words(&["H"]))?
        .run_for(0.5)
        .final_evidence;

    let task = Variant::Resettable.build(&slow.with_words(&["C"]))?;
    let mut sim = task.simulator();
    sim.run(0.6);
    let reset_before = sim.value(task.evidence)[0];
    task.hold_reset(&mut sim, true)?;
    sim.run(0.3);
    let reset_after = sim.value(task.evidence)[0];

    let fast = cfg.clone();
    let threshold_yes = Variant::Threshold
        .build(&fast.clone().with_words(&["C"]))?
        .run_for(1.0)
        .decision()
        .filter(|r| r.symbol == YES)
        .map(|r| r.time);
    let threshold_no = Variant::Threshold
        .build(&fast.with_words(&["H"]))?
        .run_for(1.0)
        .decision()
        .filter(|r| r.symbol == NO)
        .map(|r| r.time);

    print_report(&AssayReport {
        seeds: seeds.len(),
        scenarios,
        recognition_known,
        recognition_unknown,
        reset_before,
        reset_after,
        threshold_yes,
        threshold_no,
    });
    Ok(())
}

fn fmt_time(t: Option<f32>) -> String {
    t.map(|t| format!("{t:.3}s")).unwrap_or_else(|| "-".to_string())
}

fn print_report(r: &AssayReport) {
    println!("seqattn assays");
    println!();
    println!("sequential task ({} seeds)", r.seeds);
    for (words, expected, correct, time) in &r.scenarios {
        println!(
            "  [{words}] expect {expected:<3}  correct {:>5.1}%  mean response {}",
            correct * 100.0,
            fmt_time(*time)
        );
    }
    println!();
    println!("recognition (0.5s)");
    println!("  known word   evidence {:+.3}", r.recognition_known);
    println!("  unknown word evidence {:+.3}", r.recognition_unknown);
    println!("reset");
    println!(
        "  evidence {:+.3} -> {:+.3} after 0.3s of reset",
        r.reset_before, r.reset_after
    );
    println!("threshold");
    println!("  known word   YES at {}", fmt_time(r.threshold_yes));
    println!("  unknown word NO  at {}", fmt_time(r.threshold_no));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_input_order_and_expectations() {
        let cfg = ModelConfig::default().with_duration(0.05);
        let words = vec![
            vec!["C".to_string(), "B".to_string()],
            vec!["D".to_string(), "J".to_string()],
        ];
        let reports = run_batch(&cfg, &words, &[3, 4]).unwrap();
        let order: Vec<(String, u64)> = reports
            .iter()
            .map(|r| (r.words.join(","), r.seed))
            .collect();
        assert_eq!(
            order,
            [
                ("C,B".to_string(), 3u64),
                ("C,B".to_string(), 4),
                ("D,J".to_string(), 3),
                ("D,J".to_string(), 4)
            ]
        );
        assert_eq!(reports[0].expected, YES);
        assert_eq!(reports[2].expected, NO);
    }

    #[test]
    fn batch_results_match_single_runs() {
        let cfg = ModelConfig::default().with_duration(0.2);
        let words = vec![vec!["H".to_string(), "B".to_string()]];
        let reports = run_batch(&cfg, &words, &[5]).unwrap();
        let single = sequential(&cfg.clone().with_words(&["H", "B"]).with_seed(5))
            .unwrap()
            .run();
        assert_eq!(reports[0].outcome, single);
    }
}
