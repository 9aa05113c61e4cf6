//! The bidirectional language model: shared embedding, a [`BiLmEncoder`],
//! and a decoder head projecting each direction's top layer onto the
//! vocabulary.
//!
//! Weight tying: with `tie_weights` the decoder shares the embedding matrix
//! and only a fresh output bias is stored. Both the embedded inputs and the
//! top-layer outputs pass through dropout; the pre- and post-dropout
//! top-layer activations are both surfaced so the trainer can regularise
//! them.

use candle_core::{Result, Tensor};
use candle_nn::init::Init;
use candle_nn::{Dropout, Embedding, Linear, Module, VarBuilder};

use bilm_common::BiLmConfig;

use crate::encoder::{BiLmEncoder, EncoderInput, EncoderStates};

// ── Inputs and outputs ──────────────────────────────────────────────────────

/// Token-id streams, shaped `(seq, batch)` with `u32` ids.
pub enum LmInput {
    /// One stream consumed by both directions.
    Single(Tensor),
    /// Independent streams; `backward` is usually the one-step-shifted
    /// continuation of `forward`.
    Paired { forward: Tensor, backward: Tensor },
}

/// Everything the model produces for one chunk.
pub struct LmOutput {
    /// `(seq, batch, vocab)` scores, per direction.
    pub forward_logits: Tensor,
    pub backward_logits: Tensor,
    /// Top encoder layer before dropout, per direction.
    pub raw_forward: Tensor,
    pub raw_backward: Tensor,
    /// Top encoder layer after dropout; this is what the decoder saw.
    pub dropped_forward: Tensor,
    pub dropped_backward: Tensor,
}

// ── BiLm ────────────────────────────────────────────────────────────────────

enum Decoder {
    Tied { bias: Tensor },
    Dense(Linear),
}

pub struct BiLm {
    embedding: Embedding,
    dropout: Dropout,
    encoder: BiLmEncoder,
    decoder: Decoder,
    config: BiLmConfig,
}

impl BiLm {
    pub fn new(config: &BiLmConfig, vb: VarBuilder) -> Result<Self> {
        let embed_weight = vb.pp("embedding").get_with_hints(
            (config.vocab_size, config.embed_size),
            "weight",
            Init::Uniform { lo: -0.1, up: 0.1 },
        )?;
        let embedding = Embedding::new(embed_weight, config.embed_size);

        let encoder = BiLmEncoder::new(config, config.embed_size, vb.pp("encoder"))?;
        let out_size = encoder.output_size();

        let decoder = if config.tie_weights {
            if config.embed_size != out_size {
                candle_core::bail!(
                    "tied embedding and decoder need matching sizes, got embedding {} and encoder output {}",
                    config.embed_size,
                    out_size
                );
            }
            let bias =
                vb.pp("decoder")
                    .get_with_hints(config.vocab_size, "bias", Init::Const(0.))?;
            Decoder::Tied { bias }
        } else {
            let bound = (6.0 / (out_size + config.vocab_size) as f64).sqrt();
            let weight = vb.pp("decoder").get_with_hints(
                (config.vocab_size, out_size),
                "weight",
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                },
            )?;
            let bias =
                vb.pp("decoder")
                    .get_with_hints(config.vocab_size, "bias", Init::Const(0.))?;
            Decoder::Dense(Linear::new(weight, Some(bias)))
        };

        Ok(Self {
            embedding,
            dropout: Dropout::new(config.dropout),
            encoder,
            decoder,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &BiLmConfig {
        &self.config
    }

    pub fn begin_state(&self, batch_size: usize) -> Result<EncoderStates> {
        self.encoder.begin_state(batch_size)
    }

    fn embed(&self, ids: &Tensor, train: bool) -> Result<Tensor> {
        self.dropout.forward(&self.embedding.forward(ids)?, train)
    }

    fn decode(&self, hidden: &Tensor) -> Result<Tensor> {
        match &self.decoder {
            Decoder::Tied { bias } => {
                // Weight-tied projection: logits = h @ embedding^T + bias.
                let (seq, batch, size) = hidden.dims3()?;
                hidden
                    .reshape((seq * batch, size))?
                    .matmul(&self.embedding.embeddings().t()?)?
                    .broadcast_add(bias)?
                    .reshape((seq, batch, self.config.vocab_size))
            }
            Decoder::Dense(linear) => linear.forward(hidden),
        }
    }

    /// Run one chunk. `states` is advanced in place; detach it between
    /// chunks to truncate backpropagation.
    pub fn forward(
        &self,
        inputs: &LmInput,
        states: &mut EncoderStates,
        train: bool,
    ) -> Result<LmOutput> {
        let embedded = match inputs {
            LmInput::Single(ids) => EncoderInput::Single(self.embed(ids, train)?),
            LmInput::Paired { forward, backward } => EncoderInput::Paired {
                forward: self.embed(forward, train)?,
                backward: self.embed(backward, train)?,
            },
        };
        let encoded = self.encoder.forward(&embedded, states, train)?;

        let raw_forward = match encoded.forward.last() {
            Some(out) => out.clone(),
            None => candle_core::bail!("encoder emitted no layers"),
        };
        let raw_backward = match encoded.backward.last() {
            Some(out) => out.clone(),
            None => candle_core::bail!("encoder emitted no layers"),
        };
        let dropped_forward = self.dropout.forward(&raw_forward, train)?;
        let dropped_backward = self.dropout.forward(&raw_backward, train)?;

        Ok(LmOutput {
            forward_logits: self.decode(&dropped_forward)?,
            backward_logits: self.decode(&dropped_backward)?,
            raw_forward,
            raw_backward,
            dropped_forward,
            dropped_backward,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
