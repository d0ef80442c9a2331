/*
 * @Author       : 老董
 * @Date         : 2024-01-31 20:23:53
 * @Description  : 负责神经网络（neural network）Block 树的构建：形状推断、参数物化与序列化
 */

mod block;
mod descriptor;
pub mod layer;
mod parameter;
pub mod seq2seq;
mod shape;
mod store;

pub use block::{
    Block, BlockList, BlockListMut, ForwardParams, InitState, count_parameters,
    initialize_direct_parameters, load_from_bytes, named_parameters, save_to_bytes,
};
pub use descriptor::{BlockDescriptor, ParameterDescriptor};
pub use layer::{Activation, ActivationFn, Linear, LinearConfig, SequentialBlock};
pub use parameter::{Init, ParamShape, Parameter, ParameterId};
pub use seq2seq::{
    CarryState, DecodePolicy, DecodeTrace, Decoder, DecoderKind, Encoder, EncoderDecoder,
    EncoderKind, EncoderOutput, FixedSteps, LastTimeStep, PassThroughStates, RecurrentState,
    TrailingOutputs,
};
pub use shape::{Dim, DynamicShape, Shape};
pub use store::ParameterStore;

#[cfg(test)]
mod tests;
