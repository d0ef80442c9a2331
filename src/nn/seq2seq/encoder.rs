/*
 * @Description  : Encoder：编码器-解码器结构中的编码器
 *
 * Encoder 只包装一个内部 Block，所有框架操作都原样委托给它；唯一不委托的是
 * `get_states`：从编码器的前向输出中提取供解码器使用的状态，具体方式由
 * 构造时选定的 `EncoderKind` 决定。
 */

use enum_dispatch::enum_dispatch;
use std::io::{Read, Write};

use crate::errors::BlockError;
use crate::nn::block::{BlockList, BlockListMut, ForwardParams};
use crate::nn::shape::Shape;
use crate::nn::{Block, ParameterStore};
use crate::tensor::{DataType, Device, NdList, Tensor};

/// 编码器状态的提取方式
#[enum_dispatch]
pub trait EncoderState {
    /// 在初始化内部 Block 之前校验（或拒绝）输入形状
    fn before_initialize(&self, _input_shapes: &[Shape]) -> Result<(), BlockError> {
        Ok(())
    }

    /// 从编码器输出提取状态；只读，不做额外计算
    fn get_states(&self, encoder_output: &[Tensor]) -> Result<NdList, BlockError>;

    /// `get_states` 对应的形状函数
    fn state_shapes(&self, output_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError>;
}

#[enum_dispatch(EncoderState)]
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderKind {
    PassThroughStates,
    LastTimeStep,
    TrailingOutputs,
}

/// 状态即完整的编码器输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassThroughStates;

impl EncoderState for PassThroughStates {
    fn get_states(&self, encoder_output: &[Tensor]) -> Result<NdList, BlockError> {
        Ok(encoder_output.to_vec())
    }

    fn state_shapes(&self, output_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        Ok(output_shapes.to_vec())
    }
}

/// 序列编码器：输出`[batch, time, hidden]`，状态取最后一个时间步`[batch, hidden]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastTimeStep;

impl LastTimeStep {
    const MIN_RANK: usize = 3;

    fn check_rank(shape: Option<&Shape>, what: &str) -> Result<(), BlockError> {
        match shape {
            Some(shape) if shape.len() >= Self::MIN_RANK && shape[1] > 0 => Ok(()),
            other => Err(BlockError::ShapeMismatch {
                expected: vec![0; Self::MIN_RANK],
                got: other.cloned().unwrap_or_default(),
                message: format!(
                    "{what}须至少为{}阶的[batch, time, ...]且time>0",
                    Self::MIN_RANK
                ),
            }),
        }
    }
}

impl EncoderState for LastTimeStep {
    fn before_initialize(&self, input_shapes: &[Shape]) -> Result<(), BlockError> {
        Self::check_rank(input_shapes.first(), "序列编码器的输入")
    }

    fn get_states(&self, encoder_output: &[Tensor]) -> Result<NdList, BlockError> {
        let output = encoder_output.first();
        Self::check_rank(output.map(|t| t.shape().to_vec()).as_ref(), "序列编码器的输出")?;
        let output = &encoder_output[0];
        let last = output.shape()[1] - 1;
        Ok(vec![output.select(1, last)?])
    }

    fn state_shapes(&self, output_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        Self::check_rank(output_shapes.first(), "序列编码器的输出")?;
        let mut shape = output_shapes[0].clone();
        shape.remove(1);
        Ok(vec![shape])
    }
}

/// 循环编码器：输出列表末尾的`n`个张量即状态（如 LSTM 最终的 hidden 与 cell）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingOutputs(pub usize);

impl TrailingOutputs {
    fn check_len(&self, len: usize) -> Result<(), BlockError> {
        if len < self.0 {
            return Err(BlockError::ShapeMismatch {
                expected: vec![self.0],
                got: vec![len],
                message: "编码器输出的张量个数少于状态个数".to_string(),
            });
        }
        Ok(())
    }
}

impl EncoderState for TrailingOutputs {
    fn get_states(&self, encoder_output: &[Tensor]) -> Result<NdList, BlockError> {
        self.check_len(encoder_output.len())?;
        Ok(encoder_output[encoder_output.len() - self.0..].to_vec())
    }

    fn state_shapes(&self, output_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        self.check_len(output_shapes.len())?;
        Ok(output_shapes[output_shapes.len() - self.0..].to_vec())
    }
}

/// 编码器的前向输出
///
/// 只能由 [`Encoder::encode`] 产生，因此 [`Encoder::get_states`] 总是作用在一次真实的前向输出上。
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOutput(NdList);

impl EncoderOutput {
    pub fn as_slice(&self) -> &[Tensor] {
        &self.0
    }

    pub fn into_inner(self) -> NdList {
        self.0
    }
}

pub struct Encoder {
    block: Box<dyn Block>,
    kind: EncoderKind,
}

impl Encoder {
    /// 内部 Block 在子 Block 列表中的固定名称
    pub const BLOCK_NAME: &'static str = "Block";

    pub fn new(block: impl Block + 'static, kind: impl Into<EncoderKind>) -> Self {
        Self::from_boxed(Box::new(block), kind)
    }

    pub fn from_boxed(block: Box<dyn Block>, kind: impl Into<EncoderKind>) -> Self {
        Self {
            block,
            kind: kind.into(),
        }
    }

    pub fn state_kind(&self) -> &EncoderKind {
        &self.kind
    }

    pub fn block(&self) -> &dyn Block {
        self.block.as_ref()
    }

    /// 执行编码器前向计算
    pub fn encode(
        &self,
        store: &ParameterStore,
        inputs: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<EncoderOutput, BlockError> {
        self.forward(store, inputs, training, params)
            .map(EncoderOutput)
    }

    /// 从本编码器的前向输出中提取解码器状态
    pub fn get_states(&self, encoder_output: &EncoderOutput) -> Result<NdList, BlockError> {
        self.kind.get_states(&encoder_output.0)
    }

    /// 给定编码器输出形状，求状态形状
    pub fn state_shapes(&self, output_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        self.kind.state_shapes(output_shapes)
    }
}

impl Block for Encoder {
    fn kind(&self) -> &'static str {
        "Encoder"
    }

    fn forward(
        &self,
        store: &ParameterStore,
        inputs: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<NdList, BlockError> {
        self.block.forward(store, inputs, training, params)
    }

    fn initialize(
        &mut self,
        device: Device,
        data_type: DataType,
        input_shapes: &[Shape],
    ) -> Result<Vec<Shape>, BlockError> {
        self.kind.before_initialize(input_shapes)?;
        self.block.initialize(device, data_type, input_shapes)
    }

    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        self.block.output_shapes(input_shapes)
    }

    fn is_initialized(&self) -> bool {
        self.block.is_initialized()
    }

    fn children(&self) -> BlockList<'_> {
        vec![(Self::BLOCK_NAME.to_string(), self.block.as_ref())]
    }

    fn children_mut(&mut self) -> BlockListMut<'_> {
        let block: &mut dyn Block = self.block.as_mut();
        vec![(Self::BLOCK_NAME.to_string(), block)]
    }

    fn parameter_shape(&self, name: &str, _input_shapes: &[Shape]) -> Result<Shape, BlockError> {
        Err(BlockError::InvalidParameter(format!(
            "Encoder没有参数（请求的参数为`{name}`）"
        )))
    }

    fn save_parameters(&self, writer: &mut dyn Write) -> Result<(), BlockError> {
        self.block
            .save_parameters(writer)
            .map_err(|e| e.at(Self::BLOCK_NAME))
    }

    fn load_parameters(&mut self, device: Device, reader: &mut dyn Read) -> Result<(), BlockError> {
        self.block
            .load_parameters(device, reader)
            .map_err(|e| e.at(Self::BLOCK_NAME))
    }
}
