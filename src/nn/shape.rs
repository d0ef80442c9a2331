/*
 * 形状：确定形状 `Shape` 与参数声明时使用的形状模板 `DynamicShape`
 *
 * 参数在 Block 构造时只知道部分维度（如 Linear 的输入维度要等看到输入形状才能确定），
 * 未知维度记为 None，初始化时再由形状推断补全。
 *
 * # 示例
 * ```
 * use only_block::nn::DynamicShape;
 *
 * let template = DynamicShape::new(&[None, Some(5)]);
 * assert_eq!(template.to_string(), "[?, 5]");
 * assert_eq!(template.concretize(&[10, 5]), Some(vec![10, 5]));
 * assert_eq!(template.concretize(&[10, 6]), None);
 * ```
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::BlockError;

/// 确定的（所有维度已知的）形状
pub type Shape = Vec<usize>;

/// 维度值：Some(n) 表示固定值 n，None 表示尚未确定
pub type Dim = Option<usize>;

/// 形状模板：支持未知维度的形状表示
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicShape {
    dims: Vec<Dim>,
}

impl DynamicShape {
    pub fn new(dims: &[Dim]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }

    /// 从固定形状创建（所有维度都是确定的）
    pub fn fixed(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Some(d)).collect(),
        }
    }

    /// 获取维度数量
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// 获取指定维度的值，未知或越界时为 None
    pub fn dim(&self, index: usize) -> Dim {
        self.dims.get(index).copied().flatten()
    }

    /// 检查是否有任何未知维度
    pub fn has_dynamic_dims(&self) -> bool {
        self.dims.iter().any(|d| d.is_none())
    }

    /// 检查此模板是否与确定形状兼容（阶数相同，已知维度相等）
    pub fn is_compatible_with(&self, shape: &[usize]) -> bool {
        self.dims.len() == shape.len()
            && self
                .dims
                .iter()
                .zip(shape.iter())
                .all(|(expected, &actual)| match expected {
                    None => true,
                    Some(n) => *n == actual,
                })
    }

    /// 用确定形状具体化模板；不兼容时返回 None
    pub fn concretize(&self, shape: &[usize]) -> Option<Shape> {
        self.is_compatible_with(shape).then(|| shape.to_vec())
    }

    /// 转换为固定形状向量（如果所有维度都是固定的）
    pub fn to_vec_fixed(&self) -> Option<Shape> {
        self.dims.iter().copied().collect()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }
}

impl fmt::Display for DynamicShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .dims
            .iter()
            .map(|d| match d {
                Some(n) => n.to_string(),
                None => "?".to_string(),
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl From<&[usize]> for DynamicShape {
    fn from(shape: &[usize]) -> Self {
        Self::fixed(shape)
    }
}

/// 校验输入形状个数
pub(crate) fn expect_arity(input_shapes: &[Shape], arity: usize, who: &str) -> Result<(), BlockError> {
    if input_shapes.len() != arity {
        return Err(BlockError::ShapeMismatch {
            expected: vec![arity],
            got: vec![input_shapes.len()],
            message: format!("{who}需要{arity}个输入，实际收到{}个", input_shapes.len()),
        });
    }
    Ok(())
}
