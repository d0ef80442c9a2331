/*
 * @Description  : Block 体系统一的错误类型
 *
 * 分类：
 * - ShapeMismatch：形状推断/前向计算中形状不一致
 * - InvalidParameter：对没有直接参数的 Block 请求参数形状等（调用方的编程错误）
 * - Serialization：参数流损坏、提前结束或顺序/数量不匹配
 * - UninitializedUse：在未初始化的 Block 树上执行 forward/save/load
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("形状不匹配（{message}）：预期{expected:?}，实际为{got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },
    #[error("无效的参数请求：{0}")]
    InvalidParameter(String),
    #[error("参数流序列化错误：{0}")]
    Serialization(String),
    #[error("Block未初始化：{0}")]
    UninitializedUse(String),
    #[error("展开后的参数名重复：{0}")]
    DuplicateName(String),
    #[error("解码第{step}步失败：{source}")]
    DecodeStep {
        step: usize,
        #[source]
        source: Box<BlockError>,
    },
    #[error("位于`{path}`：{source}")]
    At {
        path: String,
        #[source]
        source: Box<BlockError>,
    },
    #[error("IO错误：{0}")]
    Io(#[from] std::io::Error),
}

impl BlockError {
    /// 给错误附加所在 Block/参数 的路径，嵌套调用时路径由外向内拼接
    pub fn at(self, name: &str) -> Self {
        match self {
            Self::At { path, source } => Self::At {
                path: format!("{name}.{path}"),
                source,
            },
            other => Self::At {
                path: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// 去掉路径包装，得到最初触发的错误
    pub fn root(&self) -> &BlockError {
        match self {
            Self::At { source, .. } => source.root(),
            other => other,
        }
    }

    /// 错误所在路径（若有）
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::At { path, .. } => Some(path),
            _ => None,
        }
    }
}
