//! Bidirectional encoder: two independent [`CellStack`]s unrolled over the
//! same sequence, one left-to-right and one right-to-left.
//!
//! The directions never exchange state or outputs; their only coupling is
//! that both read embedded input of the same shape. Per direction, layer 0
//! never carries a residual connection and the top layer never carries
//! dropout, so the raw top-layer sequence is available to the model head.

use candle_core::{IndexOp, Result, Tensor};
use candle_nn::VarBuilder;

use bilm_common::BiLmConfig;

use crate::cell::RecState;
use crate::stack::CellStack;

/// Embedded input streams, shaped `(seq, batch, embed)`.
///
/// `Single` feeds the same stream to both directions (character-level
/// reconstruction); `Paired` gives each direction its own stream (word-level
/// next-token prediction, where the backward stream is the shifted target).
pub enum EncoderInput {
    Single(Tensor),
    Paired { forward: Tensor, backward: Tensor },
}

/// Per-direction, per-layer recurrent state.
pub struct EncoderStates {
    pub forward: Vec<RecState>,
    pub backward: Vec<RecState>,
}

impl EncoderStates {
    /// Detach every state from the autograd graph, for truncated BPTT.
    pub fn detach(&self) -> Self {
        Self {
            forward: self.forward.iter().map(RecState::detach).collect(),
            backward: self.backward.iter().map(RecState::detach).collect(),
        }
    }
}

/// Per-direction, per-layer output sequences, each `(seq, batch, size)`.
pub struct EncoderOutputs {
    pub forward: Vec<Tensor>,
    pub backward: Vec<Tensor>,
}

pub struct BiLmEncoder {
    forward: CellStack,
    backward: CellStack,
}

impl BiLmEncoder {
    pub fn new(config: &BiLmConfig, in_size: usize, vb: VarBuilder) -> Result<Self> {
        let mut dropout = vec![config.dropout; config.num_layers];
        if let Some(last) = dropout.last_mut() {
            *last = 0.0;
        }
        let mut residual = vec![config.skip_connection; config.num_layers];
        if let Some(first) = residual.first_mut() {
            *first = false;
        }
        Ok(Self {
            forward: CellStack::new(config, in_size, &dropout, &residual, vb.pp("forward"))?,
            backward: CellStack::new(config, in_size, &dropout, &residual, vb.pp("backward"))?,
        })
    }

    pub fn output_size(&self) -> usize {
        self.forward.output_size()
    }

    pub fn begin_state(&self, batch_size: usize) -> Result<EncoderStates> {
        Ok(EncoderStates {
            forward: self.forward.begin_state(batch_size)?,
            backward: self.backward.begin_state(batch_size)?,
        })
    }

    /// Unroll both directions over the full sequence. `states` is advanced in
    /// place and can be carried into the next chunk (detach it first).
    pub fn forward(
        &self,
        inputs: &EncoderInput,
        states: &mut EncoderStates,
        train: bool,
    ) -> Result<EncoderOutputs> {
        let (fwd_stream, bwd_stream) = match inputs {
            EncoderInput::Single(stream) => (stream, stream),
            EncoderInput::Paired { forward, backward } => {
                if forward.dims() != backward.dims() {
                    candle_core::bail!(
                        "paired encoder streams disagree on shape: {:?} vs {:?}",
                        forward.dims(),
                        backward.dims()
                    );
                }
                (forward, backward)
            }
        };
        let seq_len = fwd_stream.dim(0)?;
        let num_layers = self.forward.num_layers();

        let mut fwd_steps: Vec<Vec<Tensor>> = vec![Vec::with_capacity(seq_len); num_layers];
        for t in 0..seq_len {
            let outputs = self
                .forward
                .step_all(&fwd_stream.i(t)?, &mut states.forward, train)?;
            for (layer, output) in outputs.into_iter().enumerate() {
                fwd_steps[layer].push(output);
            }
        }

        // The backward direction walks the same stream right to left; its
        // step outputs are collected in visit order and flipped back so that
        // index t always refers to input position t.
        let mut bwd_steps: Vec<Vec<Tensor>> = vec![Vec::with_capacity(seq_len); num_layers];
        for t in (0..seq_len).rev() {
            let outputs = self
                .backward
                .step_all(&bwd_stream.i(t)?, &mut states.backward, train)?;
            for (layer, output) in outputs.into_iter().enumerate() {
                bwd_steps[layer].push(output);
            }
        }
        for steps in bwd_steps.iter_mut() {
            steps.reverse();
        }

        Ok(EncoderOutputs {
            forward: stack_steps(fwd_steps)?,
            backward: stack_steps(bwd_steps)?,
        })
    }
}

fn stack_steps(per_layer: Vec<Vec<Tensor>>) -> Result<Vec<Tensor>> {
    per_layer
        .into_iter()
        .map(|steps| Tensor::stack(&steps, 0))
        .collect()
}
