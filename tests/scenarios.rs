//! End-to-end runs of the four tasks.

use seqattn::config::ModelConfig;
use seqattn::tasks::{self, Variant, NO, WAIT, YES};

fn sequential(words: [&str; 2], seed: u64) -> tasks::TrialOutcome {
    let cfg = ModelConfig::default().with_words(&words).with_seed(seed);
    tasks::sequential(&cfg).unwrap().run()
}

#[test]
fn two_known_words_answer_yes() {
    for seed in 1..=5 {
        let out = sequential(["C", "B"], seed);
        assert_eq!(out.response.as_deref(), Some(YES), "seed {seed}: {out:?}");
        assert!(out.reached_second_word);
        let t = out.response_time.unwrap();
        assert!(t > 0.3 && t < 2.0, "seed {seed}: {t}");
    }
}

#[test]
fn unknown_first_word_answers_no_without_moving_on() {
    for seed in 1..=5 {
        let out = sequential(["H", "B"], seed);
        assert_eq!(out.response.as_deref(), Some(NO), "seed {seed}: {out:?}");
        assert!(!out.reached_second_word, "seed {seed}");
        assert!(!out.responses.iter().any(|r| r.symbol == YES));
    }
}

#[test]
fn unknown_second_word_answers_no_after_moving_on() {
    for seed in 1..=5 {
        let out = sequential(["D", "J"], seed);
        assert_eq!(out.response.as_deref(), Some(NO), "seed {seed}: {out:?}");
        assert!(out.reached_second_word, "seed {seed}");
        assert!(!out.responses.iter().any(|r| r.symbol == YES));
    }
}

#[test]
fn no_answer_before_enough_evidence() {
    let cfg = ModelConfig::default().with_words(&["C", "B"]);
    let task = tasks::sequential(&cfg).unwrap();
    let out = task.run_for(0.2);
    assert_eq!(out.response, None);
    assert!(out.responses.is_empty());
}

#[test]
fn fresh_runs_are_identical() {
    let cfg = ModelConfig::default().with_words(&["D", "J"]).with_seed(9);
    let task = tasks::sequential(&cfg).unwrap();
    assert_eq!(task.run(), task.run());

    let rebuilt = tasks::sequential(&cfg).unwrap();
    assert_eq!(task.run_for(0.5), rebuilt.run_for(0.5));
}

#[test]
fn simulator_reset_replays_the_same_trial() {
    let task = tasks::sequential(&ModelConfig::default()).unwrap();
    let mut sim = task.simulator();
    sim.run(0.7);
    let first: Vec<f32> = task
        .motor
        .map(|m| sim.value(m).to_vec())
        .unwrap_or_default();
    sim.reset();
    sim.run(0.7);
    let second: Vec<f32> = task
        .motor
        .map(|m| sim.value(m).to_vec())
        .unwrap_or_default();
    assert_eq!(first, second);
}

#[test]
fn threshold_task_waits_then_decides() {
    let cfg = Variant::Threshold.default_config().with_words(&["E"]);
    let out = tasks::threshold(&cfg).unwrap().run_for(1.0);
    assert_eq!(out.responses[0].symbol, WAIT);
    assert_eq!(out.decision().map(|r| r.symbol.as_str()), Some(YES));
    // the decision resets the accumulator, so it never saturates
    assert!(out.peak_evidence < 1.0);

    let cfg = Variant::Threshold.default_config().with_words(&["K"]);
    let out = tasks::threshold(&cfg).unwrap().run_for(1.0);
    assert_eq!(out.decision().map(|r| r.symbol.as_str()), Some(NO));
    assert!(out.min_evidence > -1.0);
}

#[test]
fn recognition_without_reset_saturates() {
    let cfg = Variant::Recognition.default_config().with_words(&["A"]);
    let out = tasks::recognition(&cfg).unwrap().run_for(1.5);
    assert_eq!(out.final_evidence, 1.0);

    let cfg = Variant::Recognition.default_config().with_words(&["Z"]);
    let out = tasks::recognition(&cfg).unwrap().run_for(1.5);
    assert_eq!(out.final_evidence, -1.0);
}

#[test]
fn reset_brings_evidence_near_zero_from_either_side() {
    for word in ["B", "X"] {
        let cfg = Variant::Resettable.default_config().with_words(&[word]);
        let task = tasks::resettable(&cfg).unwrap();
        let mut sim = task.simulator();
        sim.run(1.5);
        assert!(sim.value(task.evidence)[0].abs() > 0.9, "{word}");
        task.hold_reset(&mut sim, true).unwrap();
        // one synaptic time constant
        sim.run(0.1);
        assert!(sim.value(task.evidence)[0].abs() < 0.05, "{word}");
        sim.run(0.2);
        assert!(sim.value(task.evidence)[0].abs() < 0.05, "{word}");
    }
}

#[test]
fn high_reset_gain_still_settles_near_zero() {
    for gain in [100.0, 300.0, 1000.0] {
        let cfg = Variant::Resettable
            .default_config()
            .with_words(&["B"])
            .with_reset_gain(gain);
        assert!(cfg.validate().is_ok());
        let task = tasks::resettable(&cfg).unwrap();
        let mut sim = task.simulator();
        sim.run(1.5);
        task.hold_reset(&mut sim, true).unwrap();
        sim.run(0.1);
        for _ in 0..200 {
            sim.step();
            let e = sim.value(task.evidence)[0];
            assert!((0.0..0.05).contains(&e), "gain {gain}: {e}");
        }
    }
}

#[test]
fn softmax_selection_with_steep_beta_still_solves_the_task() {
    use seqattn::action::Selection;
    let cfg = ModelConfig::default().with_selection(Selection::Softmax {
        beta: 200.0,
        floor: 0.05,
    });
    let out = tasks::sequential(&cfg.clone().with_words(&["C", "B"])).unwrap().run();
    assert_eq!(out.response.as_deref(), Some(YES), "{out:?}");
    let out = tasks::sequential(&cfg.with_words(&["H", "B"])).unwrap().run();
    assert_eq!(out.response.as_deref(), Some(NO), "{out:?}");
}

#[test]
fn no_stimulus_drifts_down() {
    let cfg = Variant::Recognition.default_config().with_words(&["C"]);
    let task = tasks::recognition(&cfg).unwrap();
    let mut sim = task.simulator();
    task.present(&mut sim, None).unwrap();
    let mut prev = 0.0;
    for _ in 0..300 {
        sim.step();
        let e = sim.value(task.evidence)[0];
        assert!(e <= prev);
        prev = e;
    }
    assert!(prev < -0.25);
}
