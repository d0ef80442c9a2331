/*
 * @Description  : 激活函数层（无参数的叶子 Block），对每个输入逐元素计算
 */

use serde::{Deserialize, Serialize};

use crate::errors::BlockError;
use crate::nn::block::{ForwardParams, InitState};
use crate::nn::shape::Shape;
use crate::nn::{Block, ParameterStore};
use crate::tensor::{DataType, Device, NdList, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFn {
    /// 原样输出
    Identity,
    Relu,
    Tanh,
    Sigmoid,
}

impl ActivationFn {
    fn apply(&self, x: &Tensor) -> Tensor {
        match self {
            Self::Identity => x.clone(),
            Self::Relu => x.relu(),
            Self::Tanh => x.tanh(),
            Self::Sigmoid => x.sigmoid(),
        }
    }
}

pub struct Activation {
    function: ActivationFn,
    state: InitState,
}

impl Activation {
    pub fn new(function: ActivationFn) -> Self {
        Self {
            function,
            state: InitState::default(),
        }
    }

    pub fn identity() -> Self {
        Self::new(ActivationFn::Identity)
    }

    pub fn relu() -> Self {
        Self::new(ActivationFn::Relu)
    }

    pub fn tanh() -> Self {
        Self::new(ActivationFn::Tanh)
    }

    pub fn function(&self) -> ActivationFn {
        self.function
    }
}

impl Block for Activation {
    fn kind(&self) -> &'static str {
        match self.function {
            ActivationFn::Identity => "Identity",
            ActivationFn::Relu => "Relu",
            ActivationFn::Tanh => "Tanh",
            ActivationFn::Sigmoid => "Sigmoid",
        }
    }

    fn forward(
        &self,
        _store: &ParameterStore,
        inputs: &[Tensor],
        _training: bool,
        _params: &ForwardParams,
    ) -> Result<NdList, BlockError> {
        self.state.ensure(self.kind())?;
        Ok(inputs.iter().map(|x| self.function.apply(x)).collect())
    }

    fn initialize(
        &mut self,
        _device: Device,
        _data_type: DataType,
        input_shapes: &[Shape],
    ) -> Result<Vec<Shape>, BlockError> {
        if let Some(outputs) = self.state.check(input_shapes, self.kind())? {
            return Ok(outputs);
        }
        let outputs = self.output_shapes(input_shapes)?;
        self.state.mark(input_shapes, &outputs);
        Ok(outputs)
    }

    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        Ok(input_shapes.to_vec())
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }
}
