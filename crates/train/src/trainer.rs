//! Trainer: encapsulates the full bidirectional training loop.
//!
//! Decouples the compute graph (two-direction forward + regularised loss)
//! from the optimisation step (single backward, gradient merging across
//! replicas, global-norm clipping, SGD/Adam update, plateau LR schedule).

use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{backprop::GradStore, Device, Tensor, Var};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, SGD};

use bilm_common::{BatchedCorpus, BiLmConfig};
use bilm_core::{EncoderStates, LmInput};

use crate::parallel::ReplicaSet;
use crate::scheduler::{EpochOutcome, PlateauScheduler};

// ── Config ──────────────────────────────────────────────────────────────────

/// Optimiser family selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl OptimizerKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sgd" => Some(Self::Sgd),
            "adam" => Some(Self::Adam),
            _ => None,
        }
    }
}

/// All training hyper-parameters (CLI-level knobs).
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub optimizer: OptimizerKind,
    pub lr: f64,
    pub weight_decay: f64,
    pub grad_clip: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub bptt: usize,
    pub alpha: f64,
    pub beta: f64,
    pub weight_dropout: f64,
    pub log_interval: usize,
    pub lr_update_interval: usize,
    pub lr_update_factor: f64,
    pub save: PathBuf,
}

// ── Optimiser ───────────────────────────────────────────────────────────────

/// SGD or AdamW over the primary replica's parameters. SGD carries no decay
/// of its own; the session folds L2 decay into the clipped gradients.
enum LmOptimizer {
    Sgd(SGD),
    Adam(AdamW),
}

impl LmOptimizer {
    fn new(
        kind: OptimizerKind,
        vars: Vec<Var>,
        lr: f64,
        weight_decay: f64,
    ) -> candle_core::Result<Self> {
        match kind {
            OptimizerKind::Sgd => Ok(Self::Sgd(SGD::new(vars, lr)?)),
            OptimizerKind::Adam => Ok(Self::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr,
                    beta1: 0.0,
                    beta2: 0.999,
                    eps: 1e-9,
                    weight_decay,
                },
            )?)),
        }
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        match self {
            Self::Sgd(sgd) => sgd.step(grads),
            Self::Adam(adam) => adam.step(grads),
        }
    }

    fn learning_rate(&self) -> f64 {
        match self {
            Self::Sgd(sgd) => sgd.learning_rate(),
            Self::Adam(adam) => adam.learning_rate(),
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Self::Sgd(sgd) => sgd.set_learning_rate(lr),
            Self::Adam(adam) => adam.set_learning_rate(lr),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

/// The training engine. Owns the replicas, optimiser, and the LR schedule.
pub struct TrainSession {
    replicas: ReplicaSet,
    vars: Vec<Var>,
    optimizer: LmOptimizer,
    scheduler: PlateauScheduler,
    pub config: TrainerConfig,
    model_config: BiLmConfig,
}

impl TrainSession {
    /// Construct a new session. Builds one model replica per device and
    /// validates the configuration before any computation starts.
    pub fn new(
        model_config: BiLmConfig,
        config: TrainerConfig,
        devices: &[Device],
    ) -> anyhow::Result<Self> {
        if devices.is_empty() {
            anyhow::bail!("at least one device is required");
        }
        if config.batch_size % devices.len() != 0 {
            anyhow::bail!(
                "batch size {} does not divide evenly across {} devices",
                config.batch_size,
                devices.len()
            );
        }
        if config.alpha != 0.0 && config.weight_dropout == 0.0 {
            anyhow::bail!("activation regularization (alpha > 0) requires weight dropout");
        }

        let replicas = ReplicaSet::new(&model_config, devices)?;
        let vars = replicas.primary().varmap.all_vars();
        let parameters: usize = vars.iter().map(|v| v.elem_count()).sum();
        tracing::info!(
            parameters,
            devices = devices.len(),
            mode = ?model_config.mode,
            "built model replicas"
        );

        let optimizer = LmOptimizer::new(
            config.optimizer,
            vars.clone(),
            config.lr,
            config.weight_decay,
        )?;
        let scheduler =
            PlateauScheduler::new(config.lr, config.lr_update_factor, config.lr_update_interval);

        Ok(Self {
            replicas,
            vars,
            optimizer,
            scheduler,
            config,
            model_config,
        })
    }

    fn inputs_for(&self, data: &Tensor, target: &Tensor) -> LmInput {
        if self.model_config.char_embedding {
            LmInput::Single(data.clone())
        } else {
            LmInput::Paired {
                forward: data.clone(),
                backward: target.clone(),
            }
        }
    }

    /// One epoch of truncated BPTT over the batched training split.
    fn train_epoch(&mut self, corpus: &BatchedCorpus, epoch: usize) -> anyhow::Result<()> {
        let steps = corpus.steps();
        let total_batches = steps / self.config.bptt;
        let shard_batch = self.config.batch_size / self.replicas.len();
        let mut hiddens: Vec<EncoderStates> = self
            .replicas
            .iter()
            .map(|replica| replica.model.begin_state(shard_batch))
            .collect::<candle_core::Result<_>>()?;

        let epoch_start = Instant::now();
        let mut window_start = Instant::now();
        let mut total_loss = 0.0f64;
        let mut batch_i = 0usize;
        let mut i = 0usize;
        while i + 2 < steps {
            let seq_len = self.config.bptt.min(steps - 1 - i);
            let (data, target) = corpus.batch(i, seq_len, &Device::Cpu)?;
            self.replicas.synchronize()?;
            let data_shards = self.replicas.shard(&data)?;
            let target_shards = self.replicas.shard(&target)?;

            // Per-replica forwards feed one summed loss on the primary
            // device; a single backward then reaches every replica's graph.
            let mut step_loss: Option<Tensor> = None;
            let mut batch_loss = 0.0f64;
            for (index, replica) in self.replicas.iter().enumerate() {
                hiddens[index] = hiddens[index].detach();
                let inputs = self.inputs_for(&data_shards[index], &target_shards[index]);
                let output = replica.model.forward(&inputs, &mut hiddens[index], true)?;
                let forward_loss = criterion(
                    &output.forward_logits,
                    &target_shards[index],
                    &output.dropped_forward,
                    &output.raw_forward,
                    self.config.alpha,
                    self.config.beta,
                )?;
                let backward_loss = criterion(
                    &output.backward_logits,
                    &data_shards[index],
                    &output.dropped_backward,
                    &output.raw_backward,
                    self.config.alpha,
                    self.config.beta,
                )?;
                let combined = (forward_loss + backward_loss)?;
                batch_loss += combined.to_scalar::<f32>()? as f64;
                let on_primary = combined.to_device(&self.replicas.primary().device)?;
                step_loss = Some(match step_loss {
                    Some(loss) => (loss + on_primary)?,
                    None => on_primary,
                });
            }
            let step_loss = match step_loss {
                Some(loss) => loss,
                None => anyhow::bail!("no replicas produced a loss"),
            };

            let grads = step_loss.backward()?;
            let mut merged = self.replicas.merge_grads(grads)?;
            if self.config.grad_clip > 0.0 {
                clip_grad_norm(&mut merged, &self.vars, self.config.grad_clip)?;
            }
            if self.config.optimizer == OptimizerKind::Sgd && self.config.weight_decay > 0.0 {
                apply_weight_decay(&mut merged, &self.vars, self.config.weight_decay)?;
            }
            self.optimizer.step(&merged)?;

            total_loss += batch_loss / 2.0;
            if self.config.log_interval > 0
                && batch_i % self.config.log_interval == 0
                && batch_i > 0
            {
                let cur_loss = total_loss / self.config.log_interval as f64;
                let samples = (self.config.batch_size * self.config.log_interval) as f64;
                println!(
                    "[Epoch {} Batch {}/{}] loss {:.2}, ppl {:.2}, throughput {:.2} samples/s, lr {:.2}",
                    epoch,
                    batch_i,
                    total_batches,
                    cur_loss,
                    perplexity(cur_loss),
                    samples / window_start.elapsed().as_secs_f64(),
                    self.optimizer.learning_rate()
                );
                total_loss = 0.0;
                window_start = Instant::now();
            }
            i += seq_len;
            batch_i += 1;
        }

        println!(
            "[Epoch {}] throughput {:.2} samples/s",
            epoch,
            (self.config.batch_size * steps) as f64 / epoch_start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Average per-token cross-entropy over a batched split, both directions
    /// counted, on the primary replica with dropout disabled.
    pub fn evaluate(&self, corpus: &BatchedCorpus) -> anyhow::Result<f64> {
        let primary = self.replicas.primary();
        let batch_size = corpus.batch_size();
        let mut states = primary.model.begin_state(batch_size)?;
        let mut total = 0.0f64;
        let mut tokens = 0usize;
        for start in corpus.chunk_starts(self.config.bptt) {
            let (data, target) = corpus.batch(start, self.config.bptt, &primary.device)?;
            states = states.detach();
            let inputs = self.inputs_for(&data, &target);
            let output = primary.model.forward(&inputs, &mut states, false)?;
            let (seq_len, batch) = data.dims2()?;
            let forward_loss = cross_entropy_mean(&output.forward_logits, &target)?;
            let backward_loss = cross_entropy_mean(&output.backward_logits, &data)?;
            let summed = (forward_loss.to_scalar::<f32>()? as f64
                + backward_loss.to_scalar::<f32>()? as f64)
                * (seq_len * batch) as f64;
            total += summed;
            tokens += 2 * seq_len * batch;
        }
        if tokens == 0 {
            return Ok(f64::INFINITY);
        }
        Ok(total / tokens as f64)
    }

    /// Train for the configured number of epochs, validating after each one.
    /// Improved validation loss checkpoints the parameters and reports test
    /// loss; a plateau decays the learning rate.
    pub fn run(
        &mut self,
        train: &BatchedCorpus,
        valid: &BatchedCorpus,
        test: &BatchedCorpus,
    ) -> anyhow::Result<()> {
        let train_start = Instant::now();
        for epoch in 0..self.config.epochs {
            let epoch_start = Instant::now();
            self.train_epoch(train, epoch)?;
            let val_loss = self.evaluate(valid)?;
            println!(
                "[Epoch {}] time cost {:.2}s, valid loss {:.2}, valid ppl {:.2}",
                epoch,
                epoch_start.elapsed().as_secs_f64(),
                val_loss,
                perplexity(val_loss)
            );
            match self.scheduler.observe(val_loss) {
                EpochOutcome::Improved => {
                    let test_loss = self.evaluate(test)?;
                    self.save_checkpoint()?;
                    println!(
                        "test loss {:.2}, test ppl {:.2}",
                        test_loss,
                        perplexity(test_loss)
                    );
                }
                EpochOutcome::Decayed(lr) => {
                    self.optimizer.set_learning_rate(lr);
                    println!("Learning rate after interval update {:.6}", lr);
                }
                EpochOutcome::NoChange => {}
            }
        }
        println!(
            "Total training throughput {:.2} samples/s",
            (self.config.batch_size * train.steps() * self.config.epochs) as f64
                / train_start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Persist the primary parameters plus the model config beside them.
    pub fn save_checkpoint(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.config.save.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.replicas.save(&self.config.save)?;
        self.model_config
            .save(&self.config.save.with_extension("json"))?;
        Ok(())
    }

    /// Load parameters into every replica.
    pub fn load_checkpoint(&mut self, path: &Path) -> anyhow::Result<()> {
        self.replicas.load(path)?;
        Ok(())
    }
}

// ── Loss ────────────────────────────────────────────────────────────────────

/// Mean per-token cross-entropy of `(seq, batch, vocab)` logits against
/// `(seq, batch)` targets.
fn cross_entropy_mean(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let (seq_len, batch, vocab) = logits.dims3()?;
    let logits = logits.reshape((seq_len * batch, vocab))?;
    let targets = targets.reshape(seq_len * batch)?;
    loss::cross_entropy(&logits, &targets)
}

/// Cross-entropy plus the optional activation regularisers: `alpha` scales
/// the L2 of the dropped top-layer activations, `beta` the L2 of consecutive
/// raw-activation differences.
fn criterion(
    logits: &Tensor,
    targets: &Tensor,
    dropped: &Tensor,
    raw: &Tensor,
    alpha: f64,
    beta: f64,
) -> candle_core::Result<Tensor> {
    let mut total = cross_entropy_mean(logits, targets)?;
    if alpha != 0.0 {
        let ar = dropped.sqr()?.mean_all()?.affine(alpha, 0.0)?;
        total = (total + ar)?;
    }
    if beta != 0.0 {
        let seq_len = raw.dim(0)?;
        if seq_len > 1 {
            let diff = (raw.narrow(0, 1, seq_len - 1)? - raw.narrow(0, 0, seq_len - 1)?)?;
            let tar = diff.sqr()?.mean_all()?.affine(beta, 0.0)?;
            total = (total + tar)?;
        }
    }
    Ok(total)
}

/// Perplexity of an average loss, overflow mapped to `+∞`.
pub fn perplexity(avg_loss: f64) -> f64 {
    let ppl = avg_loss.exp();
    if ppl.is_finite() {
        ppl
    } else {
        f64::INFINITY
    }
}

// ── Gradient utilities ──────────────────────────────────────────────────────

/// Clip gradients so their global L2 norm ≤ `max_norm`.
fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> candle_core::Result<()> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            total += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = total.sqrt().max(1e-12);
    let scale = if norm > max_norm {
        max_norm / norm
    } else {
        1.0
    };
    for var in vars {
        if let Some(g) = grads.remove(var.as_tensor()) {
            let clipped = g.affine(scale, 0.0)?;
            grads.insert(var.as_tensor(), clipped);
        }
    }
    Ok(())
}

/// L2 weight decay folded into the gradients: `g += wd · θ`.
fn apply_weight_decay(
    grads: &mut GradStore,
    vars: &[Var],
    weight_decay: f64,
) -> candle_core::Result<()> {
    for var in vars {
        if let Some(g) = grads.remove(var.as_tensor()) {
            let decayed = (g + var.as_tensor().affine(weight_decay, 0.0)?)?;
            grads.insert(var.as_tensor(), decayed);
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────
