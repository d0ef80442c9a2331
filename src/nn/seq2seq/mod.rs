/*
 * @Description  : 编码器-解码器（seq2seq）结构
 */

mod decoder;
mod encoder;
mod encoder_decoder;

pub use decoder::{CarryState, Decoder, DecoderKind, DecoderState, RecurrentState};
pub use encoder::{
    Encoder, EncoderKind, EncoderOutput, EncoderState, LastTimeStep, PassThroughStates,
    TrailingOutputs,
};
pub use encoder_decoder::{DecodePolicy, DecodeTrace, EncoderDecoder, FixedSteps};
