use seqattn::assays;
use seqattn::config::ModelConfig;
use seqattn::error::Result;
use seqattn::observer::SimAdapter;
use seqattn::tasks::{ResponseRecorder, Task, Variant};

fn main() {
    tracing_subscriber::fmt::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = match take_config(&mut args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let cmd = args.first().map(String::as_str).unwrap_or("sequence");
    let rest = args.get(1..).unwrap_or(&[]);
    let result = match cmd {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "recognize" => single(Variant::Recognition, config, rest),
        "reset" => reset_demo(config, rest),
        "threshold" => single(Variant::Threshold, config, rest),
        "sequence" => sequence(config, rest),
        "assays" => assays::run(&config.unwrap_or_default()),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Strip `--config FILE` from the arguments and load it.
fn take_config(args: &mut Vec<String>) -> Result<Option<ModelConfig>> {
    let Some(i) = args.iter().position(|a| a == "--config") else {
        return Ok(None);
    };
    if i + 1 >= args.len() {
        eprintln!("--config needs a file");
        print_help();
        std::process::exit(2);
    }
    let path = args.remove(i + 1);
    args.remove(i);
    ModelConfig::from_json_file(&path).map(Some)
}

fn single(variant: Variant, config: Option<ModelConfig>, rest: &[String]) -> Result<()> {
    let mut cfg = config.unwrap_or_else(|| variant.default_config());
    if let Some(word) = rest.first() {
        cfg = cfg.with_words(&[word]);
    }
    let task = variant.build(&cfg)?;
    run_printing(&task, cfg.duration, |_, _| Ok(()))
}

fn reset_demo(config: Option<ModelConfig>, rest: &[String]) -> Result<()> {
    let variant = Variant::Resettable;
    let mut cfg = config.unwrap_or_else(|| variant.default_config());
    if let Some(word) = rest.first() {
        cfg = cfg.with_words(&[word]);
    }
    let task = variant.build(&cfg)?;
    // reset pulse from 0.6 s to 0.9 s
    let on = (0.6 / cfg.dt).round() as u64;
    let off = (0.9 / cfg.dt).round() as u64;
    run_printing(&task, cfg.duration, |task, sim| {
        if sim.steps() == on {
            task.hold_reset(sim, true)?;
        } else if sim.steps() == off {
            task.hold_reset(sim, false)?;
        }
        Ok(())
    })
}

fn sequence(config: Option<ModelConfig>, rest: &[String]) -> Result<()> {
    let mut cfg = config.unwrap_or_default();
    if rest.len() >= 2 {
        cfg = cfg.with_words(&rest[..2]);
    }
    let task = Variant::Sequential.build(&cfg)?;
    run_printing(&task, cfg.duration, |_, _| Ok(()))
}

/// Step the task, printing a snapshot every 50 ms of simulated time.
fn run_printing<F>(task: &Task, seconds: f32, mut before_step: F) -> Result<()>
where
    F: FnMut(&Task, &mut seqattn::simulator::Simulator<'_>) -> Result<()>,
{
    let dt = task.model.dt();
    let every = ((0.05 / dt).round() as u64).max(1);
    let steps = (seconds / dt).round() as u64;

    let mut sim = task.simulator();
    let mut recorder = ResponseRecorder::new(task);
    for _ in 0..steps {
        before_step(task, &mut sim)?;
        sim.step();
        recorder.observe(&sim);
        if sim.steps() % every == 0 {
            println!("{}", SimAdapter::new(&sim).snapshot().summary());
        }
    }

    let out = recorder.finish(&sim);
    println!();
    println!("task:           {}", task.variant.name());
    println!("final evidence: {:+.3}", out.final_evidence);
    for r in &out.responses {
        println!("response:       {} at {:.3}s", r.symbol, r.time);
    }
    match (&out.response, out.response_time) {
        (Some(r), Some(t)) => println!("settled on:     {r} (since {t:.3}s)"),
        _ => println!("settled on:     -"),
    }
    Ok(())
}

fn print_help() {
    println!("seqattn (word recognition by evidence accumulation)");
    println!("usage:");
    println!("  cargo run -- [--config FILE] sequence [WORD1 WORD2]");
    println!("  cargo run -- [--config FILE] recognize [WORD]");
    println!("  cargo run -- [--config FILE] reset [WORD]");
    println!("  cargo run -- [--config FILE] threshold [WORD]");
    println!("  cargo run -- [--config FILE] assays");
    println!("  cargo run -- --help");
}
