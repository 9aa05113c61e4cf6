//! Corpus loading and batching for truncated-BPTT language modelling.
//!
//! A corpus is three whitespace-tokenised text files (train/valid/test);
//! every line is closed with `<eos>`. The id stream of a split is batchified
//! column-contiguously into a `(steps, batch_size)` matrix, then sliced into
//! `(seq_len, batch_size)` chunks whose target chunk is shifted one step
//! ahead.
//!
//! * **[`Corpus`]** — the three token streams.
//! * **[`BatchedCorpus`]** — one batchified split; call [`BatchedCorpus::batch`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Result, Tensor};

use crate::vocab::EOS_TOKEN;

// ── Corpus ──────────────────────────────────────────────────────────────────

/// Token streams for the three corpus splits.
pub struct Corpus {
    pub train: Vec<String>,
    pub valid: Vec<String>,
    pub test: Vec<String>,
}

impl Corpus {
    /// Load `wiki.train.tokens`, `wiki.valid.tokens` and `wiki.test.tokens`
    /// from `dir`.
    pub fn load(dir: &Path) -> AnyhowResult<Self> {
        Ok(Self {
            train: read_tokens(&dir.join("wiki.train.tokens"))?,
            valid: read_tokens(&dir.join("wiki.valid.tokens"))?,
            test: read_tokens(&dir.join("wiki.test.tokens"))?,
        })
    }
}

/// Read one split: whitespace tokens per line, each line closed with `<eos>`.
/// Empty lines still contribute their `<eos>`.
fn read_tokens(path: &Path) -> AnyhowResult<Vec<String>> {
    let file = File::open(path).with_context(|| format!("open corpus file {}", path.display()))?;
    let mut tokens = Vec::new();
    for line in BufReader::new(file).lines() {
        split_line_into(&line?, &mut tokens);
    }
    Ok(tokens)
}

fn split_line_into(line: &str, out: &mut Vec<String>) {
    out.extend(line.split_whitespace().map(str::to_string));
    out.push(EOS_TOKEN.to_string());
}

// ── BatchedCorpus ───────────────────────────────────────────────────────────

/// A split batchified into a column-contiguous `(steps, batch_size)` matrix.
///
/// Column `b` holds a contiguous slice of the original id stream, so row `t`
/// carries `batch_size` independent stream positions at the same time step.
/// Trailing ids that do not fill a full row are dropped.
pub struct BatchedCorpus {
    /// Row-major `(steps, batch_size)`.
    ids: Vec<u32>,
    steps: usize,
    batch_size: usize,
}

impl BatchedCorpus {
    pub fn new(ids: &[u32], batch_size: usize) -> Self {
        let steps = if batch_size == 0 {
            0
        } else {
            ids.len() / batch_size
        };
        let mut rows = vec![0u32; steps * batch_size];
        for b in 0..batch_size {
            for t in 0..steps {
                rows[t * batch_size + b] = ids[b * steps + t];
            }
        }
        Self {
            ids: rows,
            steps,
            batch_size,
        }
    }

    /// Number of time-step rows.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Chunk starts for one evaluation sweep: `0, seq_len, 2·seq_len, …`
    /// while a non-empty chunk remains.
    pub fn chunk_starts(&self, seq_len: usize) -> impl Iterator<Item = usize> {
        (0..self.steps.saturating_sub(1)).step_by(seq_len.max(1))
    }

    /// The `(data, target)` chunk at row `start`: rows `start..start+n` and
    /// rows `start+1..start+1+n` as `(n, batch_size)` u32 tensors, where `n`
    /// is `seq_len` shortened at the end of the split (the target needs one
    /// extra row).
    pub fn batch(&self, start: usize, seq_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
        let n = seq_len.min(self.steps.saturating_sub(start + 1));
        let data = self.rows(start, n);
        let target = self.rows(start + 1, n);
        let data = Tensor::from_vec(data.to_vec(), (n, self.batch_size), device)?;
        let target = Tensor::from_vec(target.to_vec(), (n, self.batch_size), device)?;
        Ok((data, target))
    }

    fn rows(&self, start: usize, n: usize) -> &[u32] {
        &self.ids[start * self.batch_size..(start + n) * self.batch_size]
    }

    /// Keep only the first `steps` rows (used by `--test-mode`).
    pub fn truncate(&mut self, steps: usize) {
        if steps < self.steps {
            self.ids.truncate(steps * self.batch_size);
            self.steps = steps;
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
