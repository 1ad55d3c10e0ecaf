#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/pointer.rs"]
pub mod pointer;

#[path = "core/vocab.rs"]
pub mod vocab;

#[path = "core/memory.rs"]
pub mod memory;

#[path = "core/dynamics.rs"]
pub mod dynamics;

#[path = "core/action.rs"]
pub mod action;

#[path = "core/environment.rs"]
pub mod environment;

#[path = "core/model.rs"]
pub mod model;

#[path = "core/simulator.rs"]
pub mod simulator;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/tasks.rs"]
pub mod tasks;

#[path = "experiments/assays.rs"]
pub mod assays;

pub mod observer;

pub mod prelude {
    pub use crate::action::{Selection, SignalSource, Utility};
    pub use crate::config::ModelConfig;
    pub use crate::error::{Error, Result};
    pub use crate::model::{Model, ModelBuilder, NodeId, Schedule};
    pub use crate::observer::{SimAdapter, SimSnapshot};
    pub use crate::pointer::SemanticPointer;
    pub use crate::simulator::Simulator;
    pub use crate::tasks::{Task, TrialOutcome, Variant};
    pub use crate::vocab::Vocabulary;
}
