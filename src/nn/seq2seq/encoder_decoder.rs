/*
 * @Description  : EncoderDecoder：持有一个 Encoder 与一个 Decoder，负责二者之间的状态交接
 *
 * 一次调用分三个阶段：
 * 1. 编码：Encoder 前向得到编码器输出
 * 2. 提取：Encoder::get_states 得到初始状态
 * 3. 解码循环：每步 Decoder::step(输入, 状态) -> (输出, 新状态)，何时停止由 DecodePolicy 决定
 * 1、2 阶段失败时不会进入解码循环；第 k 步失败以 DecodeStep{step: k} 报告，不重试。
 */

use tracing::{debug, trace};

use super::decoder::Decoder;
use super::encoder::Encoder;
use crate::errors::BlockError;
use crate::nn::block::{BlockList, BlockListMut, ForwardParams};
use crate::nn::shape::Shape;
use crate::nn::{Block, ParameterStore};
use crate::tensor::{DataType, Device, NdList, Tensor};

/// 解码循环的终止策略，由驱动方提供
pub trait DecodePolicy {
    /// 最多执行的步数；None 表示只由 `next_input` 决定何时停止
    fn max_steps(&self) -> Option<usize> {
        None
    }

    /// 根据第`step`步的输出给出下一步的输入；返回 None 结束解码
    fn next_input(&mut self, step: usize, output: &[Tensor]) -> Option<NdList>;
}

/// 固定步数，每步的输出作为下一步的输入（自回归）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSteps {
    steps: usize,
}

impl FixedSteps {
    pub fn new(steps: usize) -> Self {
        Self { steps }
    }
}

impl DecodePolicy for FixedSteps {
    fn max_steps(&self) -> Option<usize> {
        Some(self.steps)
    }

    fn next_input(&mut self, _step: usize, output: &[Tensor]) -> Option<NdList> {
        Some(output.to_vec())
    }
}

/// 一次完整编码-解码的记录
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeTrace {
    /// 编码后提取出的初始状态
    pub initial_state: NdList,
    /// 每一步的输出
    pub outputs: Vec<NdList>,
    /// 传入每一步的状态，`states[0]`即初始状态
    pub states: Vec<NdList>,
    /// 最后一步返回的状态
    pub final_state: NdList,
}

impl DecodeTrace {
    pub fn steps(&self) -> usize {
        self.outputs.len()
    }
}

pub struct EncoderDecoder {
    encoder: Encoder,
    decoder: Decoder,
    encoder_inputs: usize,
}

impl EncoderDecoder {
    pub const ENCODER_NAME: &'static str = "Encoder";
    pub const DECODER_NAME: &'static str = "Decoder";

    /// 编码器接受1个输入
    pub fn new(encoder: Encoder, decoder: Decoder) -> Self {
        Self::with_encoder_inputs(encoder, decoder, 1)
    }

    /// 作为 Block 使用时，输入列表的前`encoder_inputs`个属于编码器，其余属于解码器
    pub fn with_encoder_inputs(encoder: Encoder, decoder: Decoder, encoder_inputs: usize) -> Self {
        Self {
            encoder,
            decoder,
            encoder_inputs,
        }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// 编码并提取初始状态
    pub fn encode_states(
        &self,
        store: &ParameterStore,
        source: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<NdList, BlockError> {
        let encoded = self
            .encoder
            .encode(store, source, training, params)
            .map_err(|e| e.at(Self::ENCODER_NAME))?;
        self.encoder
            .get_states(&encoded)
            .map_err(|e| e.at(Self::ENCODER_NAME))
    }

    /// 完整的编码-解码：编码`source`，从`first_input`开始按`policy`循环解码
    pub fn decode(
        &self,
        store: &ParameterStore,
        source: &[Tensor],
        first_input: &[Tensor],
        policy: &mut dyn DecodePolicy,
        training: bool,
        params: &ForwardParams,
    ) -> Result<DecodeTrace, BlockError> {
        let initial_state = self.encode_states(store, source, training, params)?;
        debug!(states = initial_state.len(), "编码完成，开始解码");

        let mut state = initial_state.clone();
        let mut input = first_input.to_vec();
        let mut outputs = Vec::new();
        let mut states = Vec::new();
        let mut step = 0;
        loop {
            if policy.max_steps().is_some_and(|max| step >= max) {
                break;
            }
            let (output, next_state) = self
                .decoder
                .step(store, &input, &state, training, params)
                .map_err(|e| BlockError::DecodeStep {
                    step,
                    source: Box::new(e),
                })?;
            trace!(step, outputs = output.len(), "解码一步");
            states.push(std::mem::replace(&mut state, next_state));
            let next_input = policy.next_input(step, &output);
            outputs.push(output);
            step += 1;
            match next_input {
                Some(next) => input = next,
                None => break,
            }
        }

        Ok(DecodeTrace {
            initial_state,
            outputs,
            states,
            final_state: state,
        })
    }

    fn split_inputs<'a, T>(&self, inputs: &'a [T]) -> Result<(&'a [T], &'a [T]), BlockError> {
        if inputs.len() <= self.encoder_inputs {
            return Err(BlockError::ShapeMismatch {
                expected: vec![self.encoder_inputs + 1],
                got: vec![inputs.len()],
                message: format!(
                    "EncoderDecoder的输入须为{}个编码器输入加至少1个解码器输入",
                    self.encoder_inputs
                ),
            });
        }
        Ok(inputs.split_at(self.encoder_inputs))
    }
}

impl Block for EncoderDecoder {
    fn kind(&self) -> &'static str {
        "EncoderDecoder"
    }

    /// 编码后执行一步解码，返回该步输出
    fn forward(
        &self,
        store: &ParameterStore,
        inputs: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<NdList, BlockError> {
        let (source, target) = self.split_inputs(inputs)?;
        let state = self.encode_states(store, source, training, params)?;
        let (output, _) = self
            .decoder
            .step(store, target, &state, training, params)
            .map_err(|e| e.at(Self::DECODER_NAME))?;
        Ok(output)
    }

    fn initialize(
        &mut self,
        device: Device,
        data_type: DataType,
        input_shapes: &[Shape],
    ) -> Result<Vec<Shape>, BlockError> {
        let (source, target) = self.split_inputs(input_shapes)?;
        let encoded = self
            .encoder
            .initialize(device, data_type, source)
            .map_err(|e| e.at(Self::ENCODER_NAME))?;
        let state_shapes = self
            .encoder
            .state_shapes(&encoded)
            .map_err(|e| e.at(Self::ENCODER_NAME))?;
        let (outputs, _) = self
            .decoder
            .initialize_with_state(device, data_type, target, &state_shapes)
            .map_err(|e| e.at(Self::DECODER_NAME))?;
        Ok(outputs)
    }

    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        let (source, target) = self.split_inputs(input_shapes)?;
        let encoded = self
            .encoder
            .output_shapes(source)
            .map_err(|e| e.at(Self::ENCODER_NAME))?;
        let state_shapes = self
            .encoder
            .state_shapes(&encoded)
            .map_err(|e| e.at(Self::ENCODER_NAME))?;
        let (outputs, _) = self
            .decoder
            .step_shapes(target, &state_shapes)
            .map_err(|e| e.at(Self::DECODER_NAME))?;
        Ok(outputs)
    }

    fn is_initialized(&self) -> bool {
        self.encoder.is_initialized() && self.decoder.is_initialized()
    }

    fn children(&self) -> BlockList<'_> {
        vec![
            (Self::ENCODER_NAME.to_string(), &self.encoder as &dyn Block),
            (Self::DECODER_NAME.to_string(), &self.decoder as &dyn Block),
        ]
    }

    fn children_mut(&mut self) -> BlockListMut<'_> {
        vec![
            (Self::ENCODER_NAME.to_string(), &mut self.encoder as &mut dyn Block),
            (Self::DECODER_NAME.to_string(), &mut self.decoder as &mut dyn Block),
        ]
    }

    fn parameter_shape(&self, name: &str, _input_shapes: &[Shape]) -> Result<Shape, BlockError> {
        Err(BlockError::InvalidParameter(format!(
            "EncoderDecoder没有直接参数（请求的参数为`{name}`）"
        )))
    }
}
