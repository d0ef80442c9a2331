/*
 * @Description  : Block 树描述符
 *                 可序列化的结构摘要，用于调试输出与确认两棵树结构一致（如加载参数前）
 */

use serde::{Deserialize, Serialize};

use super::Block;
use super::parameter::{Init, ParamShape};
use crate::errors::BlockError;

/// Block 树的可序列化描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// 在父 Block 中的名称
    pub name: String,
    /// Block 类型名
    pub kind: String,
    pub initialized: bool,
    /// 直接参数描述，顺序即序列化顺序
    pub parameters: Vec<ParameterDescriptor>,
    pub children: Vec<BlockDescriptor>,
}

/// 参数描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    /// 已解析的形状
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    /// 声明时的形状模板，未知维度显示为`?`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub requires_grad: bool,
    pub init: Init,
}

impl BlockDescriptor {
    pub fn of(name: &str, block: &dyn Block) -> Self {
        let parameters = block
            .direct_parameters()
            .iter()
            .map(|p| {
                let (shape, template) = match p.shape_state() {
                    ParamShape::Resolved(shape) => (Some(shape.clone()), None),
                    ParamShape::Declared(template) => (None, Some(template.to_string())),
                };
                ParameterDescriptor {
                    name: p.name().to_string(),
                    shape,
                    template,
                    requires_grad: p.requires_grad(),
                    init: p.init().clone(),
                }
            })
            .collect();
        let children = block
            .children()
            .into_iter()
            .map(|(child_name, child)| Self::of(&child_name, child))
            .collect();
        Self {
            name: name.to_string(),
            kind: block.kind().to_string(),
            initialized: block.is_initialized(),
            parameters,
            children,
        }
    }

    /// 整棵树的参数个数（张量个数，而非标量个数）
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
            + self
                .children
                .iter()
                .map(BlockDescriptor::parameter_count)
                .sum::<usize>()
    }

    pub fn to_json(&self) -> Result<String, BlockError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BlockError::Serialization(format!("描述符序列化失败: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, BlockError> {
        serde_json::from_str(json)
            .map_err(|e| BlockError::Serialization(format!("描述符解析失败: {e}")))
    }
}
