/*
 * @Description  : SequentialBlock：按声明顺序串联子 Block，前一个的输出即后一个的输入
 */

use tracing::debug;

use crate::errors::BlockError;
use crate::nn::block::{BlockList, BlockListMut, ForwardParams, InitState};
use crate::nn::shape::Shape;
use crate::nn::{Block, ParameterStore};
use crate::tensor::{DataType, Device, NdList, Tensor};

/// 顺序容器
///
/// # 使用示例
/// ```
/// use only_block::nn::{Activation, Block, Linear, SequentialBlock};
/// use only_block::tensor::{DataType, Device};
///
/// let mut net = SequentialBlock::new()
///     .add(Linear::new(16))
///     .add(Activation::relu())
///     .add(Linear::new(3));
/// let outputs = net.initialize(Device::Cpu, DataType::Float32, &[vec![8, 4]]).unwrap();
/// assert_eq!(outputs, vec![vec![8, 3]]);
/// ```
#[derive(Default)]
pub struct SequentialBlock {
    blocks: Vec<(String, Box<dyn Block>)>,
    state: InitState,
}

impl SequentialBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加子 Block，名称自动生成为“两位序号+类型名”，如`01Linear`
    pub fn add(self, block: impl Block + 'static) -> Self {
        self.add_boxed(Box::new(block))
    }

    pub fn add_boxed(mut self, block: Box<dyn Block>) -> Self {
        let name = format!("{:02}{}", self.blocks.len() + 1, block.kind());
        self.blocks.push((name, block));
        self
    }

    /// 以指定名称追加子 Block
    pub fn add_named(mut self, name: &str, block: impl Block + 'static) -> Self {
        self.blocks.push((name.to_string(), Box::new(block)));
        self
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Block for SequentialBlock {
    fn kind(&self) -> &'static str {
        "Sequential"
    }

    fn forward(
        &self,
        store: &ParameterStore,
        inputs: &[Tensor],
        training: bool,
        params: &ForwardParams,
    ) -> Result<NdList, BlockError> {
        self.state.ensure(self.kind())?;
        let mut current = inputs.to_vec();
        for (name, block) in &self.blocks {
            current = block
                .forward(store, &current, training, params)
                .map_err(|e| e.at(name))?;
        }
        Ok(current)
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
        let mut shapes = input_shapes.to_vec();
        for (name, block) in &mut self.blocks {
            shapes = block
                .initialize(device, data_type, &shapes)
                .map_err(|e| e.at(name))?;
            debug!(block = %name, ?shapes, "子Block已初始化");
        }
        self.state.mark(input_shapes, &shapes);
        Ok(shapes)
    }

    fn output_shapes(&self, input_shapes: &[Shape]) -> Result<Vec<Shape>, BlockError> {
        let mut shapes = input_shapes.to_vec();
        for (name, block) in &self.blocks {
            shapes = block.output_shapes(&shapes).map_err(|e| e.at(name))?;
        }
        Ok(shapes)
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    fn children(&self) -> BlockList<'_> {
        self.blocks
            .iter()
            .map(|(name, block)| (name.clone(), block.as_ref()))
            .collect()
    }

    fn children_mut(&mut self) -> BlockListMut<'_> {
        let mut list = Vec::with_capacity(self.blocks.len());
        for (name, block) in &mut self.blocks {
            let block: &mut dyn Block = block.as_mut();
            list.push((name.clone(), block));
        }
        list
    }
}
