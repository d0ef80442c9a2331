/*
 * @Description  : Decoder：编码器-解码器结构中的解码器
 *
 * 与 Encoder 一样只包装一个内部 Block 并委托全部框架操作；额外提供 `step`：
 * 接收本步输入与当前状态，返回本步输出与更新后的状态，供迭代/自回归解码反复调用。
 * 输入与状态如何拼给内部 Block、输出如何拆回，由构造时选定的 `DecoderKind` 决定。
 */

use enum_dispatch::enum_dispatch;
use std::io::{Read, Write};

use crate::errors::BlockError;
use crate::nn::block::{BlockList, BlockListMut, ForwardParams};
use crate::nn::shape::Shape;
use crate::nn::{Block, ParameterStore};
use crate::tensor::{DataType, Device, NdList, Tensor, shapes_of};

/// 解码器状态的线程方式
#[enum_dispatch]
pub trait DecoderState {
    /// 由本步输入与当前状态拼出内部 Block 的输入
    fn block_inputs(&self, input: &[Tensor], state: &[Tensor]) -> NdList;

    fn block_input_shapes(&self, input_shapes: &[Shape], state_shapes: &[Shape]) -> Vec<Shape>;

    /// 把内部 Block 的输出拆成 (本步输出, 新状态)
    fn split_outputs(&self, outputs: NdList, state: &[Tensor]) -> Result<(NdList, NdList), BlockError>;

    fn split_output_shapes(
        &self,
        output_shapes: &[Shape],
        state_shapes: &[Shape],
    ) -> Result<(Vec<Shape>, Vec<Shape>), BlockError>;
}

#[enum_dispatch(DecoderState)]
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderKind {
    CarryState,
    RecurrentState,
}

/// 内部 Block 只看到本步输入，状态原样传给下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CarryState;

impl DecoderState for CarryState {
    fn block_inputs(&self, input: &[Tensor], _state: &[Tensor]) -> NdList {
        input.to_vec()
    }

    fn block_input_shapes(&self, input_shapes: &[Shape], _state_shapes: &[Shape]) -> Vec<Shape> {
        input_shapes.to_vec()
    }

    fn split_outputs(&self, outputs: NdList, state: &[Tensor]) -> Result<(NdList, NdList), BlockError> {
        Ok((outputs, state.to_vec()))
    }

    fn split_output_shapes(
        &self,
        output_shapes: &[Shape],
        state_shapes: &[Shape],
    ) -> Result<(Vec<Shape>, Vec<Shape>), BlockError> {
        Ok((output_shapes.to_vec(), state_shapes.to_vec()))
    }
}

/// 内部 Block 的输入为`本步输入 ++ 状态`；其输出的前`outputs`个为本步输出，其余为新状态
///
/// 新状态的个数与每个张量的形状都必须与旧状态一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrentState {
    pub outputs: usize,
}

impl RecurrentState {
    pub fn new(outputs: usize) -> Self {
        Self { outputs }
    }

    fn split_at<T>(&self, mut items: Vec<T>, state_len: usize) -> Result<(Vec<T>, Vec<T>), BlockError> {
        if items.len() != self.outputs + state_len {
            return Err(BlockError::ShapeMismatch {
                expected: vec![self.outputs + state_len],
                got: vec![items.len()],
                message: format!(
                    "解码器内部Block应输出{}个本步输出加{state_len}个状态",
                    self.outputs
                ),
            });
        }
        let state = items.split_off(self.outputs);
        Ok((items, state))
    }

    fn check_state(previous: &[Shape], next: &[Shape]) -> Result<(), BlockError> {
        match previous.iter().zip(next).find(|(a, b)| a != b) {
            Some((expected, got)) => Err(BlockError::ShapeMismatch {
                expected: expected.clone(),
                got: got.clone(),
                message: "解码器返回的新状态与旧状态形状不一致".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl DecoderState for RecurrentState {
    fn block_inputs(&self, input: &[Tensor], state: &[Tensor]) -> NdList {
        input.iter().chain(state).cloned().collect()
    }

    fn block_input_shapes(&self, input_shapes: &[Shape], state_shapes: &[Shape]) -> Vec<Shape> {
        input_shapes.iter().chain(state_shapes).cloned().collect()
    }

    fn split_outputs(&self, outputs: NdList, state: &[Tensor]) -> Result<(NdList, NdList), BlockError> {
        let (output, next_state) = self.split_at(outputs, state.len())?;
        Self::check_state(&shapes_of(state), &shapes_of(&next_state))?;
        Ok((output, next_state))
    }

    fn split_output_shapes(
        &self,
        output_shapes: &[Shape],
        state_shapes: &[Shape],
    ) -> Result<(Vec<Shape>, Vec<Shape>), BlockError> {
        let (output, next_state) = self.split_at(output_shapes.to_vec(), state_shapes.len())?;
        Self::check_state(state_shapes, &next_state)?;
        Ok((output, next_state))
    }
}

pub struct Decoder {
    block: Box<dyn Block>,
    kind: DecoderKind,
}

impl Decoder {
    /// 内部 Block 在子 Block 列表中的固定名称
    pub const BLOCK_NAME: &'static str = "Block";

    pub fn new(block: impl Block + 'static, kind: impl Into<DecoderKind>) -> Self {
        Self::from_boxed(Box::new(block), kind)
    }

    pub fn from_boxed(block: Box<dyn Block>, kind: impl Into<DecoderKind>) -> Self {
        Self {
            block,
            kind: kind.into(),
        }
    }

    pub fn state_kind(&self) -> &DecoderKind {
        &self.kind
    }

    pub fn block(&self) -> &dyn Block {
        self.block.as_ref()
    }

    /// 解码一步，返回 (本步输出, 新状态)
    pub fn step(
        &self,
        store: &ParameterStore,
        input: &[Tensor],
        state: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<(NdList, NdList), BlockError> {
        let inputs = self.kind.block_inputs(input, state);
        let outputs = self.block.forward(store, &inputs, training, params)?;
        self.kind.split_outputs(outputs, state)
    }

    /// 按本步输入形状与状态形状初始化，返回 (本步输出形状, 新状态形状)
    pub fn initialize_with_state(
        &mut self,
        device: Device,
        data_type: DataType,
        input_shapes: &[Shape],
        state_shapes: &[Shape],
    ) -> Result<(Vec<Shape>, Vec<Shape>), BlockError> {
        let block_inputs = self.kind.block_input_shapes(input_shapes, state_shapes);
        let outputs = self.initialize(device, data_type, &block_inputs)?;
        self.kind.split_output_shapes(&outputs, state_shapes)
    }

    /// [`Decoder::initialize_with_state`] 对应的纯形状函数
    pub fn step_shapes(
        &self,
        input_shapes: &[Shape],
        state_shapes: &[Shape],
    ) -> Result<(Vec<Shape>, Vec<Shape>), BlockError> {
        let block_inputs = self.kind.block_input_shapes(input_shapes, state_shapes);
        let outputs = self.output_shapes(&block_inputs)?;
        self.kind.split_output_shapes(&outputs, state_shapes)
    }
}

impl Block for Decoder {
    fn kind(&self) -> &'static str {
        "Decoder"
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
            "Decoder没有参数（请求的参数为`{name}`）"
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
