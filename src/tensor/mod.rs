/*
 * @Description  : 张量（Block 体系所消费的 N 维数组）
 *
 * Block 层只关心张量的形状、数据类型与所在设备，从不检查数值本身；
 * 数值运算只提供参考层（Linear、Activation 等）所需的最小集合。
 */

use approx::AbsDiffEq;
use ndarray::{Array, ArrayD, IxDyn};
use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::errors::BlockError;

mod ops;
mod save_load;

pub(crate) use save_load::{read_array, read_bytes};

#[cfg(test)]
mod tests;

/// 计算设备（张量所在位置）。本库的数据始终在主存中，`Gpu`只作为放置标签参与参数解析的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Gpu(u32),
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu(i) => write!(f, "gpu({i})"),
        }
    }
}

/// 张量元素的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Float32,
}

impl DataType {
    /// 写入参数流时使用的类型码
    pub const fn code(&self) -> u8 {
        match self {
            Self::Float32 => 0,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Float32),
            _ => None,
        }
    }

    /// 单个元素的字节数
    pub const fn byte_size(&self) -> usize {
        match self {
            Self::Float32 => 4,
        }
    }
}

/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：相等比较（`==`）按形状与逐元素的比特位进行，不比较所在设备。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor {
    data: ArrayD<f32>,
    device: Device,
}

impl Tensor {
    /// 创建一个位于`Cpu`上的张量，`data`的长度必须和`shape`中所有元素的乘积相等。
    ///
    /// # Panics
    /// 长度与形状不符时panic，需要可恢复的错误请用[`Tensor::try_new`]。
    pub fn new(data: &[f32], shape: &[usize]) -> Tensor {
        Self::try_new(data, shape).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(data: &[f32], shape: &[usize]) -> Result<Tensor, BlockError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(BlockError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
                message: format!("数据长度{}与形状{:?}的元素个数{}不符", data.len(), shape, expected),
            });
        }
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).map_err(|e| {
            BlockError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![expected],
                message: e.to_string(),
            }
        })?;
        Ok(Self::from_array(data))
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        Self::from_array(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Tensor {
        Self::from_array(ArrayD::ones(IxDyn(shape)))
    }

    pub fn full(value: f32, shape: &[usize]) -> Tensor {
        Self::from_array(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// 用给定随机数生成器创建`[min, max]`闭区间上均匀分布的张量
    pub fn uniform_with_rng(min: f32, max: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let dist = Uniform::from(min..=max);
        let len = shape.iter().product::<usize>();
        let data = (0..len).map(|_| dist.sample(rng)).collect::<Vec<_>>();
        Self::from_array(Array::from_shape_vec(IxDyn(shape), data).unwrap_or_else(|_| {
            ArrayD::zeros(IxDyn(shape))
        }))
    }

    /// 用给定随机数生成器创建服从正态分布的张量（Box-Muller）
    pub fn normal_with_rng(mean: f32, std_dev: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let data_len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(data_len);

        while data.len() < data_len {
            let u1: f32 = rng.sample(rand::distributions::Standard);
            let u2: f32 = rng.sample(rand::distributions::Standard);
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            let z0 = mean + std_dev * r * theta.cos();
            let z1 = mean + std_dev * r * theta.sin();

            if z0.is_finite() {
                data.push(z0);
            }
            if data.len() < data_len && z1.is_finite() {
                data.push(z1);
            }
        }

        let data = ArrayD::from_shape_vec(IxDyn(shape), data)
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(shape)));
        Self::from_array(data)
    }

    pub(crate) fn from_array(data: ArrayD<f32>) -> Tensor {
        // 统一为标准（行优先、连续）布局，便于按切片读写原始字节
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Tensor {
            data,
            device: Device::Cpu,
        }
    }
}

// 属性
impl Tensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 张量的阶数，如形状为`[]`的标量阶数为0，矩阵阶数为2
    pub fn dimension(&self) -> usize {
        self.data.ndim()
    }

    /// 元素个数
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn data_type(&self) -> DataType {
        DataType::Float32
    }

    /// 复制到指定设备
    pub fn to_device(&self, device: Device) -> Tensor {
        Tensor {
            data: self.data.clone(),
            device,
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub(crate) fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// 同设备下以新数据构造张量
    pub(crate) fn with_data(&self, data: ArrayD<f32>) -> Tensor {
        let mut t = Self::from_array(data);
        t.device = self.device;
        t
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl AbsDiffEq for Tensor {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        f32::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

/// 张量的有序列表：Block 的输入、输出以及编码器状态均以此表示
pub type NdList = Vec<Tensor>;

/// 取一组张量的形状
pub fn shapes_of(list: &[Tensor]) -> Vec<Vec<usize>> {
    list.iter().map(|t| t.shape().to_vec()).collect()
}
