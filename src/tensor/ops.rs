use ndarray::{Axis, Ix2};

use super::Tensor;
use crate::errors::BlockError;

impl Tensor {
    /// 矩阵乘法：`[n, k] @ [k, m] = [n, m]`
    pub fn mat_mul(&self, other: &Tensor) -> Result<Tensor, BlockError> {
        if self.dimension() != 2 || other.dimension() != 2 || self.shape()[1] != other.shape()[0] {
            return Err(BlockError::ShapeMismatch {
                expected: vec![self.shape().last().copied().unwrap_or(0), 0],
                got: other.shape().to_vec(),
                message: format!(
                    "矩阵乘法需要两个2阶张量且前者列数等于后者行数，左侧形状为{:?}",
                    self.shape()
                ),
            });
        }
        let a = self.data().view().into_dimensionality::<Ix2>().map_err(shape_err)?;
        let b = other.data().view().into_dimensionality::<Ix2>().map_err(shape_err)?;
        Ok(self.with_data(a.dot(&b).into_dyn()))
    }

    /// 沿最后一维广播加上一个1阶张量（偏置）
    pub fn add_bias(&self, bias: &Tensor) -> Result<Tensor, BlockError> {
        let last = self.shape().last().copied();
        if bias.dimension() != 1 || last != Some(bias.size()) {
            return Err(BlockError::ShapeMismatch {
                expected: vec![last.unwrap_or(0)],
                got: bias.shape().to_vec(),
                message: "偏置须为长度等于输入最后一维的1阶张量".to_string(),
            });
        }
        Ok(self.with_data(self.data() + bias.data()))
    }

    /// 逐元素映射
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        self.with_data(self.data().mapv(f))
    }

    pub fn relu(&self) -> Tensor {
        self.map(|x| x.max(0.0))
    }

    pub fn tanh(&self) -> Tensor {
        self.map(f32::tanh)
    }

    pub fn sigmoid(&self) -> Tensor {
        self.map(|x| 1.0 / (1.0 + (-x).exp()))
    }

    /// 取第`axis`维上下标为`index`的切片，结果比原张量少一阶
    pub fn select(&self, axis: usize, index: usize) -> Result<Tensor, BlockError> {
        if axis >= self.dimension() || index >= self.shape()[axis] {
            return Err(BlockError::ShapeMismatch {
                expected: vec![axis, index],
                got: self.shape().to_vec(),
                message: format!("无法在第{axis}维选取下标{index}"),
            });
        }
        Ok(self.with_data(self.data().index_axis(Axis(axis), index).to_owned()))
    }
}

fn shape_err(e: ndarray::ShapeError) -> BlockError {
    BlockError::ShapeMismatch {
        expected: vec![],
        got: vec![],
        message: e.to_string(),
    }
}
