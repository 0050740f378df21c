use crate::lentil_common::*;
use crate::lentil_input::*;

use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use candle_seq::candle_data_loader::InMemoryBitext;
use candle_seq::candle_data_loader::SeqDataLoader;
use candle_seq::candle_encoder_latent::AmortizationMode;
use candle_seq::candle_inference::TrainConfig;
use candle_seq::candle_joint_trainer::JointTrainer;
use candle_seq::candle_joint_vae::{JointVae, JointVaeConfig};
use candle_seq::candle_seq_lm::SourceModel;
use candle_seq::candle_summary::LogSummarySink;

use clap::Args;
use std::io::Write;

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        long,
        short = 's',
        required = true,
        help = "Source-side bitext file",
        long_help = "Pre-tokenized source corpus, one sentence per line,\n\
		     token ids separated by whitespace (ids 0,1,2 are reserved).\n\
		     Either gzipped or not."
    )]
    src: Box<str>,

    #[arg(
        long,
        short = 't',
        required = true,
        help = "Target-side bitext file",
        long_help = "Pre-tokenized target corpus, aligned line by line\n\
		     with the source corpus."
    )]
    tgt: Box<str>,

    #[arg(
        long,
        help = "Monolingual source file (sampled)",
        long_help = "Source side of the monolingual corpus, sampled by an\n\
		     external source-inference model. Must be given together\n\
		     with --mono-tgt."
    )]
    mono_src: Option<Box<str>>,

    #[arg(
        long,
        help = "Monolingual target file (observed)",
        long_help = "Observed target side of the monolingual corpus.\n\
		     Must be given together with --mono-src."
    )]
    mono_tgt: Option<Box<str>>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results:\n\
		     - {out}.safetensors (model weights)\n\
		     - {out}.config.json (model configuration)\n"
    )]
    out: Box<str>,

    #[arg(
        long,
        default_value_t = 32,
        help = "Latent dimension",
        long_help = "Dimensionality of the sentence-level latent variable z."
    )]
    z_dim: usize,

    #[arg(
        long,
        value_enum,
        default_value = "full",
        help = "Amortization of the z inference networks",
        long_help = "full: one inference network, conditioned on the source,\n\
		     serves every batch type.\n\
		     less: separate bilingual (source+target) and monolingual\n\
		     (source only) inference networks, selected per batch."
    )]
    z_inference_amortization: AmortizationMode,

    #[arg(
        long,
        value_enum,
        default_value = "categorical",
        help = "Source observation model",
        long_help = "categorical: the language model emits logits over the\n\
		     source vocabulary.\n\
		     continuous: the language model emits per-position Gaussian\n\
		     parameters over embedding space."
    )]
    source_model: SourceModel,

    #[arg(
        long,
        default_value_t = 256,
        help = "Embedding dimension",
        long_help = "Dimension of the source and target token embeddings."
    )]
    embed_dim: usize,

    #[arg(
        long,
        default_value_t = 256,
        help = "Recurrent hidden width",
        long_help = "Number of hidden units of every recurrent cell."
    )]
    num_units: usize,

    #[arg(
        long,
        default_value_t = 2,
        help = "Encoder depth",
        long_help = "Total encoder depth; bidirectional encoders use half of\n\
		     it per direction, so this must be at least 2."
    )]
    num_layers: usize,

    #[arg(
        long,
        help = "Source vocabulary size",
        long_help = "If not given, the smallest size covering every token id\n\
		     seen in the data is used."
    )]
    src_vocab: Option<usize>,

    #[arg(
        long,
        help = "Target vocabulary size",
        long_help = "If not given, the smallest size covering every token id\n\
		     seen in the data is used."
    )]
    tgt_vocab: Option<usize>,

    #[arg(
        long,
        default_value_t = 50,
        help = "Maximum decode length",
        long_help = "Upper bound on the number of greedy decoding steps at\n\
		     generation time."
    )]
    max_decode_len: usize,

    #[arg(
        long,
        short = 'i',
        default_value_t = DEFAULT_EPOCHS,
        help = "Number of training epochs"
    )]
    epochs: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_MINIBATCH,
        help = "Minibatch size",
        long_help = "Number of sentence pairs per training minibatch."
    )]
    minibatch_size: usize,

    #[arg(
        long,
        default_value_t = 1e-3,
        help = "Learning rate",
        long_help = "Learning rate for the AdamW updates."
    )]
    learning_rate: f32,

    #[arg(
        long,
        value_enum,
        default_value = "cpu",
        help = "Candle device",
        long_help = "Candle device to use for computation.\n\
		     Options: cpu, cuda, metal."
    )]
    device: ComputeDevice,

    #[arg(
        long,
        default_value_t = 0,
        help = "A device number for cuda or metal"
    )]
    device_no: usize,

    #[arg(
        long,
        short,
        help = "Verbosity",
        long_help = "Enable verbose output.\n\
		     Prints per-step training summaries through the logger."
    )]
    verbose: bool,
}

pub fn train_joint_model(args: &TrainArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let device = select_device(&args.device, args.device_no)?;

    // 1. Read the corpora
    let src = read_token_ids(&args.src)?;
    let tgt = read_token_ids(&args.tgt)?;
    info!("read {} bilingual sentence pairs", src.len());

    let mut bitext = InMemoryBitext::new(src, Some(tgt), false)?;

    let mut mono = match (&args.mono_src, &args.mono_tgt) {
        (Some(mono_src), Some(mono_tgt)) => {
            let msrc = read_token_ids(mono_src)?;
            let mtgt = read_token_ids(mono_tgt)?;
            info!("read {} monolingual sentences", msrc.len());
            Some(InMemoryBitext::new(msrc, Some(mtgt), true)?)
        }
        (None, None) => None,
        _ => anyhow::bail!("--mono-src and --mono-tgt must be given together"),
    };

    // 2. Resolve the vocabulary sizes
    let seen = bitext
        .max_token_id()
        .max(mono.as_ref().map(|m| m.max_token_id()).unwrap_or(0)) as usize
        + 1;
    let src_vocab = args.src_vocab.unwrap_or(seen);
    let tgt_vocab = args.tgt_vocab.unwrap_or(seen);
    if src_vocab < seen || tgt_vocab < seen {
        anyhow::bail!(
            "vocabulary size {} is too small for the largest token id seen ({})",
            src_vocab.min(tgt_vocab),
            seen - 1
        );
    }

    // 3. Build the model on an explicit parameter store
    let config = JointVaeConfig {
        src_vocab,
        tgt_vocab,
        embed_dim: args.embed_dim,
        num_units: args.num_units,
        num_layers: args.num_layers,
        z_dim: args.z_dim,
        amortization: args.z_inference_amortization,
        source_model: args.source_model,
        max_decode_len: args.max_decode_len,
    };

    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = JointVae::new(config.clone(), vs)?;

    // 4. Train
    let train_config = TrainConfig {
        learning_rate: args.learning_rate,
        batch_size: args.minibatch_size,
        num_epochs: args.epochs,
        device: device.clone(),
        verbose: args.verbose,
        show_progress: true,
    };

    let mut trainer = JointTrainer::new(&model, &varmap);
    let mut sink = LogSummarySink;
    let elbo_trace = trainer.train(
        &mut bitext,
        mono.as_mut().map(|m| m as &mut dyn SeqDataLoader),
        &mut sink,
        &train_config,
    )?;

    if let Some(last) = elbo_trace.last() {
        info!("final epoch ELBO: {}", last);
    }

    // 5. Persist weights and configuration
    varmap.save(format!("{}.safetensors", args.out))?;

    let mut buf = open_buf_writer(&format!("{}.config.json", args.out))?;
    writeln!(buf, "{}", serde_json::to_string_pretty(&config)?)?;
    buf.flush()?;

    Ok(())
}
