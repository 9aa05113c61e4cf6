//! # bilm-train — The Training Engine
//!
//! Training loop, optimiser, and scheduling for the bidirectional language
//! model:
//!
//! * **[`TrainSession`]** — owns the device replicas, optimiser, and LR
//!   schedule. One call to [`TrainSession::run`] trains for the configured
//!   epochs with truncated BPTT, validation, checkpointing, and plateau
//!   decay.
//! * **[`PlateauScheduler`]** — multiplicative decay after a run of epochs
//!   without validation improvement.
//! * **[`ReplicaSet`]** — one model copy per device, batch sharding, and
//!   gradient merging onto the primary.

pub mod parallel;
pub mod scheduler;
pub mod trainer;

pub use parallel::{parse_devices, Replica, ReplicaSet};
pub use scheduler::{EpochOutcome, PlateauScheduler};
pub use trainer::{perplexity, OptimizerKind, TrainSession, TrainerConfig};
