mod fit_joint;
mod lentil_common;
mod lentil_input;
mod translate;

use fit_joint::*;
use lentil_common::*;
use translate::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Latent-variable Estimation for Neural Translation with Infused Language models\n\
		  Joint translation/language modelling with a shared sentence-level\n\
		  latent variable, trained on bilingual and monolingual corpora.\n\
		  Corpora are pre-tokenized integer-id files, plain or gzipped."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Train the joint model",
        long_about = "Train the joint generative model in three stages:\n\
		      (1) Read bilingual (and optionally monolingual) corpora\n\
		      (2) Fit the variational and generative networks via SGD\n\
		      (3) Save the weights and the model configuration.\n"
    )]
    Train(TrainArgs),

    #[command(
        about = "Translate a corpus with a trained model",
        long_about = "Greedy decoding with the latent variable fixed to the\n\
		      posterior mean (no sampling noise at generation time).\n"
    )]
    Translate(TranslateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Train(args) => {
            train_joint_model(args)?;
        }
        Commands::Translate(args) => {
            translate_corpus(args)?;
        }
    }

    info!("Done");
    Ok(())
}
