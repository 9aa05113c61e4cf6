//! A single-direction stack of recurrent cells with optional residual
//! connections and inter-layer dropout.
//!
//! Mirrors the classic stacked-RNN construction: each cell may be followed by
//! dropout (a fresh mask every step), and a residual layer adds the layer's
//! own input back onto its output. Whether the last layer keeps its dropout
//! is the caller's choice, made by passing a zero rate.

use candle_core::{Result, Tensor};
use candle_nn::{Dropout, VarBuilder};

use bilm_common::BiLmConfig;

use crate::cell::{RecState, RnnCell};

struct Layer {
    cell: RnnCell,
    residual: bool,
    dropout: Option<Dropout>,
}

/// Cells for one direction, applied in sequence at every time step.
pub struct CellStack {
    layers: Vec<Layer>,
    output_size: usize,
}

impl CellStack {
    /// Build `num_layers` cells. `dropout[i]` is the rate applied after layer
    /// `i`'s cell and `residual[i]` toggles that layer's skip connection; both
    /// slices must have one entry per layer.
    pub fn new(
        config: &BiLmConfig,
        in_size: usize,
        dropout: &[f32],
        residual: &[bool],
        vb: VarBuilder,
    ) -> Result<Self> {
        if dropout.len() != config.num_layers || residual.len() != config.num_layers {
            candle_core::bail!(
                "expected {} per-layer dropout and residual entries, got {} and {}",
                config.num_layers,
                dropout.len(),
                residual.len()
            );
        }
        let mut layers = Vec::new();
        let mut size = in_size;
        for layer in 0..config.num_layers {
            let cell = RnnCell::new(config, size, vb.pp(layer))?;
            size = cell.output_size();
            layers.push(Layer {
                cell,
                residual: residual[layer],
                dropout: (dropout[layer] != 0.0).then(|| Dropout::new(dropout[layer])),
            });
        }
        Ok(Self {
            layers,
            output_size: size,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// One zero state per layer.
    pub fn begin_state(&self, batch_size: usize) -> Result<Vec<RecState>> {
        self.layers
            .iter()
            .map(|layer| layer.cell.zero_state(batch_size))
            .collect()
    }

    /// Advance all layers one time step and return every layer's output,
    /// dropout included, so the feed seen by layer `i + 1` is exactly
    /// `outputs[i]`. `states` is updated in place.
    pub fn step_all(
        &self,
        input: &Tensor,
        states: &mut [RecState],
        train: bool,
    ) -> Result<Vec<Tensor>> {
        let mut outputs = Vec::with_capacity(self.layers.len());
        let mut x = input.clone();
        for (layer, state) in self.layers.iter().zip(states.iter_mut()) {
            let (mut out, next) = layer.cell.step(&x, state)?;
            if layer.residual {
                out = out.add(&x)?;
            }
            if let Some(dropout) = &layer.dropout {
                out = dropout.forward(&out, train)?;
            }
            *state = next;
            outputs.push(out.clone());
            x = out;
        }
        Ok(outputs)
    }

    /// Advance one time step and return only the top layer's output.
    pub fn step(&self, input: &Tensor, states: &mut [RecState], train: bool) -> Result<Tensor> {
        let mut outputs = self.step_all(input, states, train)?;
        match outputs.pop() {
            Some(out) => Ok(out),
            None => candle_core::bail!("cell stack has no layers"),
        }
    }
}
