//! CLI for training the bidirectional RNN language model on WikiText-2.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use bilm_common::{BatchedCorpus, BiLmConfig, Corpus, RnnMode, Vocab};
use bilm_train::{parse_devices, perplexity, OptimizerKind, TrainSession, TrainerConfig};

#[derive(Parser, Debug)]
#[command(name = "bilm-train", about = "Train a bidirectional RNN language model")]
struct Args {
    /// Recurrent cell family.
    #[arg(long, default_value = "lstm", value_parser = ["rnn_tanh", "rnn_relu", "lstm", "gru", "lstmp"])]
    model: String,
    /// Size of word embeddings.
    #[arg(long, default_value = "400")]
    emsize: usize,
    /// Number of hidden units per layer.
    #[arg(long, default_value = "1150")]
    nhid: usize,
    /// Number of layers per direction.
    #[arg(long, default_value = "3")]
    nlayers: usize,
    /// Projection size of the lstmp cell.
    #[arg(long)]
    projsize: Option<usize>,
    /// Clip the lstmp cell state to [-cellclip, cellclip].
    #[arg(long)]
    cellclip: Option<f64>,
    /// Clip the lstmp projection to [-projclip, projclip].
    #[arg(long)]
    projclip: Option<f64>,
    /// Initial learning rate.
    #[arg(long, default_value = "30.0")]
    lr: f64,
    /// Gradient clipping by global norm.
    #[arg(long, default_value = "0.25")]
    clip: f64,
    /// Upper epoch limit.
    #[arg(long, default_value = "180")]
    epochs: usize,
    /// Total batch size across all devices.
    #[arg(long, default_value = "80")]
    batch_size: usize,
    /// Sequence length per truncated-BPTT chunk.
    #[arg(long, default_value = "70")]
    bptt: usize,
    /// Dropout applied between layers and around the encoder.
    #[arg(long, default_value = "0.4")]
    dropout: f32,
    /// Weight dropout on the h2h matrices (0 disables alpha regularization).
    #[arg(long, default_value = "0.5")]
    weight_dropout: f64,
    /// Tie the word embedding and softmax weights.
    #[arg(long)]
    tied: bool,
    /// Add skip connections (cell input added to cell output).
    #[arg(long)]
    skip_connection: bool,
    /// Feed one stream to both directions instead of a shifted pair.
    #[arg(long)]
    char_embedding: bool,
    #[arg(long, default_value = "sgd", value_parser = ["sgd", "adam"])]
    optimizer: String,
    /// Weight decay applied to all weights.
    #[arg(long, default_value = "1.2e-6")]
    wd: f64,
    /// L2 regularization on dropped RNN activations (0 = disabled).
    #[arg(long, default_value = "0.0")]
    alpha: f64,
    /// Slowness regularization on RNN activations (0 = disabled).
    #[arg(long, default_value = "0.0")]
    beta: f64,
    /// Stale epochs before the learning rate decays.
    #[arg(long, default_value = "30")]
    lr_update_interval: usize,
    #[arg(long, default_value = "0.1")]
    lr_update_factor: f64,
    /// Report interval in batches.
    #[arg(long, default_value = "200")]
    log_interval: usize,
    /// Path for the best-model checkpoint.
    #[arg(long, default_value = "model.safetensors")]
    save: PathBuf,
    /// Load the checkpoint at --save before doing anything else.
    #[arg(long)]
    load: bool,
    /// Only evaluate the saved model.
    #[arg(long)]
    eval_only: bool,
    /// Comma-separated GPU ordinals, e.g. 0 or 0,2,5; empty means CPU.
    #[arg(long, default_value = "")]
    gpus: String,
    /// Run through the script with a shrunk model and few examples.
    #[arg(long)]
    test_mode: bool,
    /// Directory holding wiki.{train,valid,test}.tokens.
    #[arg(long, default_value = "data/wikitext-2")]
    data_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = Args::parse();
    if args.test_mode {
        args.emsize = 200;
        args.nhid = 200;
        args.nlayers = 1;
        args.epochs = 3;
    }

    let devices = parse_devices(&args.gpus)?;

    let corpus = Corpus::load(&args.data_dir)?;
    let vocab = Vocab::build(&corpus.train);
    tracing::info!(
        vocab = vocab.len(),
        train_tokens = corpus.train.len(),
        valid_tokens = corpus.valid.len(),
        test_tokens = corpus.test.len(),
        "loaded corpus"
    );

    let mut train_data = BatchedCorpus::new(&vocab.to_ids(&corpus.train), args.batch_size);
    let mut val_data = BatchedCorpus::new(&vocab.to_ids(&corpus.valid), args.batch_size);
    let mut test_data = BatchedCorpus::new(&vocab.to_ids(&corpus.test), args.batch_size);
    if args.test_mode {
        train_data.truncate(100);
        val_data.truncate(100);
        test_data.truncate(100);
    }

    let mode = match RnnMode::from_str(&args.model) {
        Some(mode) => mode,
        None => anyhow::bail!("unknown model {:?}", args.model),
    };
    let optimizer = match OptimizerKind::from_str(&args.optimizer) {
        Some(kind) => kind,
        None => anyhow::bail!("unknown optimizer {:?}", args.optimizer),
    };

    let model_config = BiLmConfig {
        mode,
        vocab_size: vocab.len(),
        embed_size: args.emsize,
        hidden_size: args.nhid,
        num_layers: args.nlayers,
        dropout: args.dropout,
        tie_weights: args.tied,
        skip_connection: args.skip_connection,
        char_embedding: args.char_embedding,
        projection_size: args.projsize,
        cell_clip: args.cellclip,
        projection_clip: args.projclip,
    };
    let trainer_config = TrainerConfig {
        optimizer,
        lr: args.lr,
        weight_decay: args.wd,
        grad_clip: args.clip,
        epochs: args.epochs,
        batch_size: args.batch_size,
        bptt: args.bptt,
        alpha: args.alpha,
        beta: args.beta,
        weight_dropout: args.weight_dropout,
        log_interval: args.log_interval,
        lr_update_interval: args.lr_update_interval,
        lr_update_factor: args.lr_update_factor,
        save: args.save.clone(),
    };
    tracing::info!(?model_config, devices = devices.len(), "resolved configuration");

    let mut session = TrainSession::new(model_config, trainer_config, &devices)?;

    let pipeline_start = Instant::now();
    if args.load {
        session.load_checkpoint(&args.save)?;
    }
    if !args.eval_only {
        session.run(&train_data, &val_data, &test_data)?;
    }
    session.load_checkpoint(&args.save)?;

    let final_val = session.evaluate(&val_data)?;
    let final_test = session.evaluate(&test_data)?;
    println!(
        "Best validation loss {:.2}, val ppl {:.2}",
        final_val,
        perplexity(final_val)
    );
    println!(
        "Best test loss {:.2}, test ppl {:.2}",
        final_test,
        perplexity(final_test)
    );
    println!("Total time cost {:.2}s", pipeline_start.elapsed().as_secs_f64());
    Ok(())
}
