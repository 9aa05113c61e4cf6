//! # bilm-common — Shared Primitives
//!
//! Types and utilities shared across every crate in the workspace:
//!
//! * **[`BiLmConfig`]** / **[`RnnMode`]** — model hyper-parameters (serialised as JSON).
//! * **[`Corpus`]** / **[`BatchedCorpus`]** — corpus loading & truncated-BPTT batching.
//! * **[`Vocab`]** — token ↔ id bijection with reserved `<unk>`/`<eos>`.

pub mod config;
pub mod data;
pub mod vocab;

pub use config::{BiLmConfig, RnnMode};
pub use data::{BatchedCorpus, Corpus};
pub use vocab::{Vocab, EOS_TOKEN, UNK_TOKEN};
