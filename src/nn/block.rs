/*
 * @Description  : Block trait：可组合的计算单元
 *
 * 一个 Block 拥有若干直接参数与若干子 Block，构成一棵所有权树（子 Block 由父 Block
 * 独占持有，不保存指回父节点的引用）。形状推断、参数枚举、参数序列化都按
 * `children()` 给出的声明顺序深度优先遍历这棵树。
 */

use std::collections::HashSet;
use std::io::{Read, Write};
use tracing::debug;

use super::parameter::Parameter;
use super::shape::Shape;
use super::store::ParameterStore;
use crate::errors::BlockError;
use crate::tensor::{DataType, Device, NdList, Tensor};

/// forward 的附加具名参数
pub type ForwardParams = serde_json::Map<String, serde_json::Value>;

/// 有序的 (名称, 子Block) 列表
pub type BlockList<'a> = Vec<(String, &'a dyn Block)>;
pub type BlockListMut<'a> = Vec<(String, &'a mut dyn Block)>;

/// 模块 trait
///
/// # 设计原则
/// - 形状推断（`initialize`/`output_shapes`）与前向计算分离，整棵树可以先用一个示例输入
///   校验形状，再物化任何参数
/// - forward 通过显式传入的 [`ParameterStore`] 解析参数，Block 本身不持有跨调用的可变状态，
///   已初始化的树可被多个调用方并发 forward
/// - `initialize`/`load_parameters` 需要 `&mut self`，初始化期间只能有一个写者
pub trait Block: Send + Sync {
    /// 类型名，用于描述与错误定位
    fn kind(&self) -> &'static str;

    fn forward(
        &self,
        store: &ParameterStore,
        inputs: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<NdList, BlockError>;

    /// 形状推断并物化参数，返回输出形状
    ///
    /// 以相同输入形状重复调用是幂等的；成功后再以不同输入形状调用报`ShapeMismatch`。
    fn initialize(
        &mut self,
        device: Device,
        data_type: DataType,
        input_shapes: &[Shape],
    ) -> Result<Vec<Shape>, BlockError>;

    /// 纯形状函数，初始化前后均可调用
    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError>;

    fn is_initialized(&self) -> bool;

    fn children(&self) -> BlockList<'_> {
        Vec::new()
    }

    fn children_mut(&mut self) -> BlockListMut<'_> {
        Vec::new()
    }

    /// 本 Block 自身的参数（不含子 Block 的）
    fn direct_parameters(&self) -> &[Parameter] {
        &[]
    }

    fn direct_parameters_mut(&mut self) -> &mut [Parameter] {
        &mut []
    }

    /// 指定直接参数在给定输入形状下的形状
    fn parameter_shape(&self, name: &str, _input_shapes: &[Shape]) -> Result<Shape, BlockError> {
        Err(BlockError::InvalidParameter(format!(
            "{}没有直接参数，无法求参数`{name}`的形状",
            self.kind()
        )))
    }

    /// 先序写出：直接参数，然后按声明顺序递归每个子 Block
    fn save_parameters(&self, writer: &mut dyn Write) -> Result<(), BlockError> {
        ensure_initialized(self)?;
        for param in self.direct_parameters() {
            param.save(writer).map_err(|e| e.at(param.name()))?;
        }
        for (name, child) in self.children() {
            child.save_parameters(writer).map_err(|e| e.at(&name))?;
        }
        Ok(())
    }

    /// [`Block::save_parameters`] 的逆操作。失败后树处于部分加载状态，需整体重新加载
    fn load_parameters(&mut self, device: Device, reader: &mut dyn Read) -> Result<(), BlockError> {
        ensure_initialized(self)?;
        for param in self.direct_parameters_mut() {
            param.load(device, reader).map_err(|e| e.at(param.name()))?;
        }
        for (name, child) in self.children_mut() {
            child.load_parameters(device, reader).map_err(|e| e.at(&name))?;
        }
        Ok(())
    }
}

fn ensure_initialized<B: Block + ?Sized>(block: &B) -> Result<(), BlockError> {
    if block.is_initialized() {
        Ok(())
    } else {
        Err(BlockError::UninitializedUse(format!(
            "{}尚未成功初始化",
            block.kind()
        )))
    }
}

/// Block 的初始化状态：记录首次成功初始化时的输入与输出形状
#[derive(Debug, Clone, Default)]
pub struct InitState {
    resolved: Option<(Vec<Shape>, Vec<Shape>)>,
}

impl InitState {
    /// 已用相同输入形状初始化时返回当时的输出形状；形状不一致时报错；尚未初始化返回 None
    pub fn check(&self, input_shapes: &[Shape], who: &str) -> Result<Option<Vec<Shape>>, BlockError> {
        let Some((inputs, outputs)) = &self.resolved else {
            return Ok(None);
        };
        if inputs.as_slice() == input_shapes {
            return Ok(Some(outputs.clone()));
        }
        let (expected, got) = inputs
            .iter()
            .zip(input_shapes.iter())
            .find(|(a, b)| a != b)
            .map(|(a, b)| (a.clone(), b.clone()))
            .unwrap_or_else(|| (vec![inputs.len()], vec![input_shapes.len()]));
        Err(BlockError::ShapeMismatch {
            expected,
            got,
            message: format!("{who}已按其他输入形状初始化"),
        })
    }

    pub fn mark(&mut self, input_shapes: &[Shape], output_shapes: &[Shape]) {
        self.resolved = Some((input_shapes.to_vec(), output_shapes.to_vec()));
    }

    pub fn is_initialized(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn input_shapes(&self) -> Option<&[Shape]> {
        self.resolved.as_ref().map(|(inputs, _)| inputs.as_slice())
    }

    /// forward 前调用
    pub fn ensure(&self, who: &str) -> Result<(), BlockError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BlockError::UninitializedUse(format!("{who}尚未初始化，不能执行forward")))
        }
    }
}

/// 按 `parameter_shape` 解析并物化块的全部直接参数
pub fn initialize_direct_parameters<B: Block + ?Sized>(
    block: &mut B,
    device: Device,
    data_type: DataType,
    input_shapes: &[Shape],
) -> Result<(), BlockError> {
    let shapes = block
        .direct_parameters()
        .iter()
        .map(|p| block.parameter_shape(p.name(), input_shapes))
        .collect::<Result<Vec<_>, _>>()?;
    for (param, shape) in block.direct_parameters_mut().iter_mut().zip(shapes) {
        param
            .initialize(device, data_type, &shape)
            .map_err(|e| e.at(param.name()))?;
    }
    Ok(())
}

/// 展开整棵树的参数，名称沿路径以`.`连接，如`Encoder.Block.01Linear.weight`
///
/// 展开后名称重复时报`DuplicateName`。
pub fn named_parameters(block: &dyn Block) -> Result<Vec<(String, &Parameter)>, BlockError> {
    let mut out = Vec::new();
    collect_parameters(block, "", &mut out);
    {
        let mut seen = HashSet::new();
        if let Some((name, _)) = out.iter().find(|(name, _)| !seen.insert(name.as_str())) {
            return Err(BlockError::DuplicateName(name.clone()));
        }
    }
    Ok(out)
}

fn collect_parameters<'a>(block: &'a dyn Block, prefix: &str, out: &mut Vec<(String, &'a Parameter)>) {
    for param in block.direct_parameters() {
        out.push((join(prefix, param.name()), param));
    }
    for (name, child) in block.children() {
        collect_parameters(child, &join(prefix, &name), out);
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// 整棵树已物化参数的标量元素总数
pub fn count_parameters(block: &dyn Block) -> usize {
    let own: usize = block
        .direct_parameters()
        .iter()
        .filter_map(|p| p.array())
        .map(Tensor::size)
        .sum();
    own + block
        .children()
        .into_iter()
        .map(|(_, child)| count_parameters(child))
        .sum::<usize>()
}

/// 把整棵树的参数写入一个字节数组；展开后参数名重复时报`DuplicateName`
pub fn save_to_bytes(block: &dyn Block) -> Result<Vec<u8>, BlockError> {
    named_parameters(block)?;
    let mut bytes = Vec::new();
    block.save_parameters(&mut bytes)?;
    debug!(kind = block.kind(), bytes = bytes.len(), "参数已写出");
    Ok(bytes)
}

/// 从字节数组加载整棵树的参数，要求恰好读完全部字节
pub fn load_from_bytes(block: &mut dyn Block, device: Device, bytes: &[u8]) -> Result<(), BlockError> {
    named_parameters(&*block)?;
    let mut reader = bytes;
    block.load_parameters(device, &mut reader)?;
    if !reader.is_empty() {
        return Err(BlockError::Serialization(format!(
            "参数流中剩余{}字节未被读取，参数数量与结构不匹配",
            reader.len()
        )));
    }
    debug!(kind = block.kind(), bytes = bytes.len(), "参数已加载");
    Ok(())
}
