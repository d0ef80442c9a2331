/*
 * @Description  : Linear (全连接) 层
 *
 * 输入维度不在构造时给出，而是在 initialize 时由输入形状推断，
 * 因此权重声明为模板 `[?, units]`。
 */

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::BlockError;
use crate::nn::block::{ForwardParams, InitState, initialize_direct_parameters};
use crate::nn::shape::{DynamicShape, Shape, expect_arity};
use crate::nn::{Block, Init, Parameter, ParameterStore};
use crate::tensor::{DataType, Device, NdList, Tensor};

/// Linear 层配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    /// 输出特征维度
    pub units: usize,
    /// 是否使用偏置
    #[serde(default = "default_bias")]
    pub bias: bool,
    /// 权重初始化的随机种子（确保可重复性）
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_bias() -> bool {
    true
}

impl LinearConfig {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            bias: true,
            seed: None,
        }
    }
}

/// Linear (全连接) 层：`output = x @ W + b`
///
/// # 输入/输出形状
/// - 输入：[batch_size, in_features]
/// - 输出：[batch_size, units]
///
/// # 参数
/// - `weight`：[in_features, units]
/// - `bias`：[units]（可选）
pub struct Linear {
    units: usize,
    parameters: Vec<Parameter>,
    state: InitState,
}

impl Linear {
    pub const WEIGHT: &'static str = "weight";
    pub const BIAS: &'static str = "bias";

    /// 创建带偏置的 Linear 层
    pub fn new(units: usize) -> Self {
        Self::from_config(&LinearConfig::new(units))
    }

    pub fn from_config(config: &LinearConfig) -> Self {
        let mut weight = Parameter::new(Self::WEIGHT, DynamicShape::new(&[None, Some(config.units)]))
            .with_init(Init::Kaiming);
        if let Some(seed) = config.seed {
            weight = weight.with_seed(seed);
        }
        let mut parameters = vec![weight];
        if config.bias {
            parameters.push(
                Parameter::new(Self::BIAS, DynamicShape::fixed(&[config.units])).with_init(Init::Zeros),
            );
        }
        Self {
            units: config.units,
            parameters,
            state: InitState::default(),
        }
    }

    /// 不带偏置的 Linear 层
    pub fn without_bias(units: usize) -> Self {
        Self::from_config(&LinearConfig {
            units,
            bias: false,
            seed: None,
        })
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn weight(&self) -> &Parameter {
        &self.parameters[0]
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.parameters.get(1)
    }

    /// 校验输入形状并返回输入特征维度
    fn in_features(input_shapes: &[Shape]) -> Result<usize, BlockError> {
        expect_arity(input_shapes, 1, "Linear")?;
        match input_shapes[0].as_slice() {
            [_, in_features] => Ok(*in_features),
            other => Err(BlockError::ShapeMismatch {
                expected: vec![0, 0],
                got: other.to_vec(),
                message: "Linear的输入须为[batch_size, in_features]".to_string(),
            }),
        }
    }
}

impl Block for Linear {
    fn kind(&self) -> &'static str {
        "Linear"
    }

    fn forward(
        &self,
        store: &ParameterStore,
        inputs: &[Tensor],
        _training: bool,
        _params: &ForwardParams,
    ) -> Result<NdList, BlockError> {
        self.state.ensure(self.kind())?;
        let [x] = inputs else {
            return Err(BlockError::ShapeMismatch {
                expected: vec![1],
                got: vec![inputs.len()],
                message: "Linear只接受1个输入".to_string(),
            });
        };

        // x @ W: [batch, in] @ [in, units] = [batch, units]
        let weight = store.resolve(self.weight(), x.device())?;
        let mut output = x.mat_mul(&weight)?;
        if let Some(bias) = self.bias() {
            let bias = store.resolve(bias, x.device())?;
            output = output.add_bias(&bias)?;
        }
        Ok(vec![output])
    }

    fn initialize(
        &mut self,
        device: Device,
        data_type: DataType,
        input_shapes: &[Shape],
    ) -> Result<Vec<Shape>, BlockError> {
        if let Some(outputs) = self.state.check(input_shapes, self.kind())? {
            return Ok(outputs);
        }
        let outputs = self.output_shapes(input_shapes)?;
        initialize_direct_parameters(self, device, data_type, input_shapes)?;
        debug!(units = self.units, ?input_shapes, "Linear已初始化");
        self.state.mark(input_shapes, &outputs);
        Ok(outputs)
    }

    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        Self::in_features(input_shapes)?;
        Ok(vec![vec![input_shapes[0][0], self.units]])
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    fn direct_parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn direct_parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.parameters
    }

    fn parameter_shape(&self, name: &str, input_shapes: &[Shape]) -> Result<Shape, BlockError> {
        let in_features = Self::in_features(input_shapes)?;
        match name {
            Self::WEIGHT => Ok(vec![in_features, self.units]),
            Self::BIAS if self.bias().is_some() => Ok(vec![self.units]),
            _ => Err(BlockError::InvalidParameter(format!("Linear没有名为`{name}`的参数"))),
        }
    }
}
