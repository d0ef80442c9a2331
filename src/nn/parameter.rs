/*
 * @Description  : Parameter：由唯一一个 Block 持有的具名、带形状、惰性初始化的张量
 *
 * 形状分两阶段：构造时只声明模板（可含未知维度），由所属 Block 的 initialize
 * 一次性解析为确定形状；之后形状不再改变。
 */

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use super::shape::{DynamicShape, Shape};
use crate::errors::BlockError;
use crate::tensor::{DataType, Device, Tensor, read_array, read_bytes};

/// 参数的进程内唯一标识，作为 ParameterStore 的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterId(pub u64);

impl ParameterId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// 参数初始化策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Init {
    /// 常数初始化
    Constant(f32),
    /// 全零
    Zeros,
    /// 全一
    Ones,
    /// 正态分布
    Normal { mean: f32, std: f32 },
    /// 均匀分布`[-scale, scale]`
    Uniform(f32),
    /// Kaiming/He 初始化（适用于 `ReLU`）
    Kaiming,
    /// Xavier/Glorot 初始化（适用于 Sigmoid/Tanh）
    Xavier,
}

impl Init {
    /// 生成初始化后的 Tensor（使用指定的 RNG）
    pub fn generate_with_rng(&self, shape: &[usize], rng: &mut StdRng) -> Tensor {
        match self {
            Self::Constant(v) => Tensor::full(*v, shape),
            Self::Zeros => Tensor::zeros(shape),
            Self::Ones => Tensor::ones(shape),
            Self::Normal { mean, std } => Tensor::normal_with_rng(*mean, *std, shape, rng),
            Self::Uniform(scale) => Tensor::uniform_with_rng(-scale, *scale, shape, rng),
            Self::Kaiming => {
                let fan_in = shape.first().copied().unwrap_or(1).max(1);
                let std = (2.0 / fan_in as f32).sqrt();
                Tensor::normal_with_rng(0.0, std, shape, rng)
            }
            Self::Xavier => {
                let (fan_in, fan_out) = (
                    shape.first().copied().unwrap_or(1),
                    shape.get(1).copied().unwrap_or(1),
                );
                let std = (2.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                Tensor::normal_with_rng(0.0, std, shape, rng)
            }
        }
    }
}

/// 参数形状的两个阶段
#[derive(Debug, Clone, PartialEq)]
pub enum ParamShape {
    /// 构造时声明的模板
    Declared(DynamicShape),
    /// 初始化后确定的形状
    Resolved(Shape),
}

/// 参数值每次被整体替换（`set_array`、`load`）都会换用新的 id，
/// 因此 ParameterStore 中按旧 id 缓存的副本不会再被取到。
#[derive(Debug)]
pub struct Parameter {
    id: ParameterId,
    name: String,
    shape: ParamShape,
    data_type: DataType,
    requires_grad: bool,
    init: Init,
    seed: Option<u64>,
    value: Option<Tensor>,
}

// 克隆出的是另一个独立的参数，不能与原参数共用 ParameterStore 中的缓存
impl Clone for Parameter {
    fn clone(&self) -> Self {
        Self {
            id: ParameterId::next(),
            name: self.name.clone(),
            shape: self.shape.clone(),
            data_type: self.data_type,
            requires_grad: self.requires_grad,
            init: self.init.clone(),
            seed: self.seed,
            value: self.value.clone(),
        }
    }
}

impl Parameter {
    /// 参数流中每条记录的起始标记
    const RECORD_MARKER: u8 = b'P';
    /// 参数记录格式版本
    const RECORD_VERSION: u8 = 1;

    pub fn new(name: &str, template: DynamicShape) -> Self {
        Self {
            id: ParameterId::next(),
            name: name.to_string(),
            shape: ParamShape::Declared(template),
            data_type: DataType::Float32,
            requires_grad: true,
            init: Init::Xavier,
            seed: None,
            value: None,
        }
    }

    pub fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    /// 固定随机种子，保证初始化可重复
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 标记为不可训练（如固定的嵌入表）
    pub fn frozen(mut self) -> Self {
        self.requires_grad = false;
        self
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn init(&self) -> &Init {
        &self.init
    }

    pub fn shape_state(&self) -> &ParamShape {
        &self.shape
    }

    /// 已解析的确定形状；仍处于声明阶段时为 None
    pub fn shape(&self) -> Option<&[usize]> {
        match &self.shape {
            ParamShape::Resolved(shape) => Some(shape),
            ParamShape::Declared(_) => None,
        }
    }

    /// 形状已解析且已有值
    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn array(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    /// 获取参数值；未初始化时报错
    pub fn try_array(&self) -> Result<&Tensor, BlockError> {
        self.value
            .as_ref()
            .ok_or_else(|| BlockError::UninitializedUse(format!("参数`{}`尚未初始化", self.name)))
    }

    /// 解析形状并按初始化策略生成参数值
    ///
    /// 同一形状重复调用不会重新生成参数值；与已解析形状不一致时报`ShapeMismatch`。
    pub fn initialize(
        &mut self,
        device: Device,
        data_type: DataType,
        shape: &[usize],
    ) -> Result<(), BlockError> {
        self.resolve_shape(shape)?;
        self.data_type = data_type;
        if self.value.is_none() {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let value = self.init.generate_with_rng(shape, &mut rng).to_device(device);
            trace!(name = %self.name, ?shape, %device, "参数已初始化");
            self.value = Some(value);
        }
        Ok(())
    }

    /// 直接设置参数值，形状须与已解析（或声明的）形状一致
    pub fn set_array(&mut self, value: Tensor) -> Result<(), BlockError> {
        self.resolve_shape(value.shape())?;
        self.replace_value(value);
        Ok(())
    }

    fn replace_value(&mut self, value: Tensor) {
        self.data_type = value.data_type();
        self.value = Some(value);
        self.id = ParameterId::next();
        trace!(name = %self.name, id = self.id.0, "参数值已替换");
    }

    fn resolve_shape(&mut self, shape: &[usize]) -> Result<(), BlockError> {
        match &self.shape {
            ParamShape::Resolved(resolved) if resolved.as_slice() == shape => Ok(()),
            ParamShape::Resolved(resolved) => Err(BlockError::ShapeMismatch {
                expected: resolved.clone(),
                got: shape.to_vec(),
                message: format!("参数`{}`的形状已确定，不能再改变", self.name),
            }),
            ParamShape::Declared(template) => match template.concretize(shape) {
                Some(resolved) => {
                    self.shape = ParamShape::Resolved(resolved);
                    Ok(())
                }
                None => Err(BlockError::ShapeMismatch {
                    expected: template.to_vec_fixed().unwrap_or_default(),
                    got: shape.to_vec(),
                    message: format!("参数`{}`的形状与声明的模板{template}不兼容", self.name),
                }),
            },
        }
    }

    /// 写出一条参数记录：标记 + 版本 + 名称 + 张量原始编码
    pub fn save(&self, writer: &mut dyn Write) -> Result<(), BlockError> {
        let value = self.try_array()?;
        writer.write_all(&[Self::RECORD_MARKER, Self::RECORD_VERSION])?;
        let name_bytes = self.name.as_bytes();
        writer.write_all(&(name_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(name_bytes)?;
        value.encode(writer)
    }

    /// 读取一条参数记录并覆盖当前值
    ///
    /// 记录必须与本参数同名同形；流中的位置即参数的身份，名称只用于校验顺序。
    pub fn load(&mut self, device: Device, reader: &mut dyn Read) -> Result<(), BlockError> {
        let expected_shape = match &self.shape {
            ParamShape::Resolved(shape) => shape.clone(),
            ParamShape::Declared(_) => {
                return Err(BlockError::UninitializedUse(format!(
                    "参数`{}`的形状尚未解析，无法加载",
                    self.name
                )));
            }
        };

        let [marker, version] = read_array::<2>(reader, "记录头")?;
        if marker != Self::RECORD_MARKER {
            return Err(BlockError::Serialization(format!(
                "无效的参数记录标记: {marker:#04x}"
            )));
        }
        if version != Self::RECORD_VERSION {
            return Err(BlockError::Serialization(format!(
                "不支持的参数记录版本: {version}"
            )));
        }

        let name_len = u32::from_le_bytes(read_array(reader, "名称长度")?) as usize;
        let name_bytes = read_bytes(reader, name_len, "名称")?;
        let name = String::from_utf8(name_bytes)
            .map_err(|e| BlockError::Serialization(format!("名称编码无效: {e}")))?;
        if name != self.name {
            return Err(BlockError::Serialization(format!(
                "参数顺序不匹配：此位置应为`{}`，流中为`{name}`",
                self.name
            )));
        }

        let value = Tensor::decode_expecting(reader, device, &expected_shape)?;
        self.replace_value(value);
        Ok(())
    }
}
