use crate::lentil_common::*;
use crate::lentil_input::*;

use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use candle_seq::candle_data_loader::{SeqBatch, EOS_ID};
use candle_seq::candle_joint_vae::{JointVae, JointVaeConfig};
use candle_seq::candle_model_traits::{JointModelT, RunMode};

use clap::Args;
use std::io::Read;

#[derive(Args, Debug)]
pub struct TranslateArgs {
    #[arg(
        long,
        short,
        required = true,
        help = "Model header",
        long_help = "Header of a trained model, expecting\n\
		     - {model}.safetensors (weights)\n\
		     - {model}.config.json (configuration)"
    )]
    model: Box<str>,

    #[arg(
        required = true,
        help = "Input file",
        long_help = "Pre-tokenized source corpus to translate, one sentence\n\
		     per line. Either gzipped or not."
    )]
    input: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output file",
        long_help = "Where to write the translations, one sentence of token\n\
		     ids per line. Either gzipped or not."
    )]
    out: Box<str>,

    #[arg(
        long,
        default_value_t = DEFAULT_MINIBATCH,
        help = "Minibatch size",
        long_help = "Number of sentences decoded per batch."
    )]
    minibatch_size: usize,

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

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn translate_corpus(args: &TranslateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let device = select_device(&args.device, args.device_no)?;

    // 1. Rebuild the model from its persisted configuration
    let mut config_json = String::new();
    open_buf_reader(&format!("{}.config.json", args.model))?.read_to_string(&mut config_json)?;
    let config: JointVaeConfig = serde_json::from_str(&config_json)?;

    let mut varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = JointVae::new(config, vs)?;
    varmap.load(format!("{}.safetensors", args.model))?;

    // 2. Greedy decoding, deterministic: the latent variable is the
    // posterior mean at generation time
    let src = read_token_ids(&args.input)?;
    info!("translating {} sentences", src.len());

    let mut translations: Vec<Vec<u32>> = Vec::with_capacity(src.len());
    for chunk in src.chunks(args.minibatch_size.max(1)) {
        let batch = SeqBatch::from_pairs(chunk, None, false, &device)?;
        let graph = model.build_graph(&batch, RunMode::Infer)?;

        for row in graph.sampled_ids.to_vec2::<u32>()? {
            let cut = row.iter().position(|&id| id == EOS_ID).unwrap_or(row.len());
            translations.push(row[..cut].to_vec());
        }
    }

    write_token_ids(&translations, &args.out)?;
    Ok(())
}
