//! # bilm-core — The Model Engine
//!
//! Every compute primitive needed to build and run the bidirectional
//! recurrent language model lives in this crate:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cell`] | `ElmanCell`, `LstmCell`, `GruCell`, `LstmpCell`, `RnnCell` |
//! | [`stack`] | `CellStack`: one direction's layers with residuals and dropout |
//! | [`encoder`] | `BiLmEncoder`: independent forward and backward unrolls |
//! | [`model`] | `BiLm`: embedding, encoder, and (optionally tied) decoder |
//!
//! ## Design principles
//!
//! 1. **Pure Rust hot path.** Everything goes through `candle-core`/`candle-nn`.
//!    Compiles to CPU, CUDA, and Metal.
//! 2. **Explicit state.** Recurrent state is a value the caller owns, detaches,
//!    and carries between chunks; nothing is hidden in the model.
//! 3. **Deterministic in eval mode.** With `train = false` the same inputs and
//!    states always produce the same outputs.

pub mod cell;
pub mod encoder;
pub mod model;
pub mod stack;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use cell::{ElmanActivation, ElmanCell, GruCell, LstmCell, LstmpCell, RecState, RnnCell};
pub use encoder::{BiLmEncoder, EncoderInput, EncoderOutputs, EncoderStates};
pub use model::{BiLm, LmInput, LmOutput};
pub use stack::CellStack;
