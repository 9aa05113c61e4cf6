//! Model configuration for the bidirectional language model.
//!
//! Serialised as JSON and written beside every checkpoint. Every field has a
//! sensible default so a minimal `{}` JSON will produce a working (if large)
//! model.

use serde::{Deserialize, Serialize};

// ── Cell family ─────────────────────────────────────────────────────────────

/// Recurrent cell family selected by `--model`.
///
/// `Lstmp` is the projected LSTM with optional cell/projection clipping; the
/// other modes use the standard unmodified gate equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RnnMode {
    RnnTanh,
    RnnRelu,
    Lstm,
    Gru,
    Lstmp,
}

impl RnnMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rnn_tanh" => Some(Self::RnnTanh),
            "rnn_relu" => Some(Self::RnnRelu),
            "lstm" => Some(Self::Lstm),
            "gru" => Some(Self::Gru),
            "lstmp" => Some(Self::Lstmp),
            _ => None,
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────────────

/// Hyper-parameters of the bidirectional language model.
///
/// Stored alongside weights for reproducible reload. Backwards-compatible:
/// missing fields fall back to their `#[serde(default)]` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiLmConfig {
    // ── Core dimensions ─────────────────────────────────────────────────────
    /// Recurrent cell family.
    #[serde(default = "default_mode")]
    pub mode: RnnMode,
    /// Vocabulary size (must match the vocabulary built from the corpus).
    #[serde(default = "default_vocab_size")]
    pub vocab_size: usize,
    /// Dimension of embedding vectors.
    #[serde(default = "default_embed_size")]
    pub embed_size: usize,
    /// Number of hidden units per recurrent cell.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Number of stacked layers per direction.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,

    // ── Regularisation / wiring ─────────────────────────────────────────────
    /// Dropout on the embedded input, between layers, and on the encoder
    /// output (0 = no dropout).
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    /// Tie the decoder weight to the embedding matrix. Requires
    /// `embed_size == hidden_size`.
    #[serde(default)]
    pub tie_weights: bool,
    /// Residual connections between stacked layers (never on the first layer).
    #[serde(default)]
    pub skip_connection: bool,
    /// Feed one shared input stream to both directions instead of the
    /// (input, shifted-target) pair.
    #[serde(default)]
    pub char_embedding: bool,

    // ── Projected LSTM (`lstmp` only) ───────────────────────────────────────
    /// Size of the recurrent projection. Required for `lstmp`.
    #[serde(default)]
    pub projection_size: Option<usize>,
    /// Symmetric clamp bound on the cell memory (None = no clipping).
    #[serde(default)]
    pub cell_clip: Option<f64>,
    /// Symmetric clamp bound on the projected output (None = no clipping).
    #[serde(default)]
    pub projection_clip: Option<f64>,
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_mode() -> RnnMode {
    RnnMode::Lstm
}
fn default_vocab_size() -> usize {
    33278 // WikiText-2
}
fn default_embed_size() -> usize {
    400
}
fn default_hidden_size() -> usize {
    1150
}
fn default_num_layers() -> usize {
    3
}
fn default_dropout() -> f32 {
    0.4
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for BiLmConfig {
    fn default() -> Self {
        Self {
            mode: RnnMode::Lstm,
            vocab_size: 33278,
            embed_size: 400,
            hidden_size: 1150,
            num_layers: 3,
            dropout: 0.4,
            tie_weights: false,
            skip_connection: false,
            char_embedding: false,
            projection_size: None,
            cell_clip: None,
            projection_clip: None,
        }
    }
}

impl BiLmConfig {
    /// Feature size each direction emits per step: the projection size for
    /// `lstmp`, the hidden size otherwise.
    pub fn output_size(&self) -> usize {
        match self.mode {
            RnnMode::Lstmp => self.projection_size.unwrap_or(self.hidden_size),
            _ => self.hidden_size,
        }
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_json_round_trip() {
        let config = BiLmConfig {
            mode: RnnMode::Lstmp,
            projection_size: Some(256),
            cell_clip: Some(3.0),
            projection_clip: Some(3.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let loaded: BiLmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.mode, RnnMode::Lstmp);
        assert_eq!(loaded.vocab_size, config.vocab_size);
        assert_eq!(loaded.embed_size, 400);
        assert_eq!(loaded.hidden_size, 1150);
        assert_eq!(loaded.projection_size, Some(256));
        assert_eq!(loaded.cell_clip, Some(3.0));
        assert!(!loaded.tie_weights);
    }

    #[test]
    fn mode_serialises_snake_case() {
        let json = serde_json::to_string(&RnnMode::RnnTanh).unwrap();
        assert_eq!(json, "\"rnn_tanh\"");
        let back: RnnMode = serde_json::from_str("\"lstmp\"").unwrap();
        assert_eq!(back, RnnMode::Lstmp);
    }

    #[test]
    fn mode_from_str() {
        assert_eq!(RnnMode::from_str("gru"), Some(RnnMode::Gru));
        assert_eq!(RnnMode::from_str("rnn_relu"), Some(RnnMode::RnnRelu));
        assert_eq!(RnnMode::from_str("transformer"), None);
    }

    #[test]
    fn backward_compat_missing_fields() {
        // A minimal JSON: every missing field takes its default.
        let loaded: BiLmConfig = serde_json::from_str("{\"vocab_size\": 1000}").unwrap();
        assert_eq!(loaded.vocab_size, 1000);
        assert_eq!(loaded.mode, RnnMode::Lstm);
        assert_eq!(loaded.num_layers, 3);
        assert_eq!(loaded.projection_size, None);
        assert!(!loaded.char_embedding);
    }

    #[test]
    fn output_size_follows_projection() {
        let mut config = BiLmConfig {
            hidden_size: 1150,
            ..Default::default()
        };
        assert_eq!(config.output_size(), 1150);

        config.mode = RnnMode::Lstmp;
        config.projection_size = Some(256);
        assert_eq!(config.output_size(), 256);
    }
}
