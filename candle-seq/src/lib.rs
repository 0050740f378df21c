pub mod candle_aux_layers;
pub mod candle_data_loader;
pub mod candle_distribution;
pub mod candle_embedding;
pub mod candle_encoder_latent;
pub mod candle_inference;
pub mod candle_joint_trainer;
pub mod candle_joint_vae;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_seq_decoder;
pub mod candle_seq_encoder;
pub mod candle_seq_lm;
pub mod candle_summary;

pub use candle_core;
pub use candle_nn;
