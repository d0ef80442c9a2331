use std::io::{Read, Write};

use super::{DataType, Device, Tensor};
use crate::errors::BlockError;

/// 参数流中张量的最大阶数
const MAX_RANK: usize = 32;

// 张量在参数流中的原始编码：类型码(u8) + 阶数(u32) + 各维(u32) + 小端f32数据
impl Tensor {
    /// 以原始字节写出张量（不含任何名称信息）
    pub fn encode(&self, writer: &mut dyn Write) -> Result<(), BlockError> {
        writer.write_all(&[self.data_type().code()])?;
        writer.write_all(&(self.dimension() as u32).to_le_bytes())?;
        for &dim in self.shape() {
            writer.write_all(&(dim as u32).to_le_bytes())?;
        }
        for &val in self.data().iter() {
            writer.write_all(&val.to_le_bytes())?;
        }
        Ok(())
    }

    /// 读取[`Tensor::encode`]写出的张量，并放到指定设备上
    pub fn decode(reader: &mut dyn Read, device: Device) -> Result<Tensor, BlockError> {
        Self::decode_with(reader, device, None)
    }

    /// 同[`Tensor::decode`]，但流中的形状必须等于`expected`，否则在读取数据前报错
    pub fn decode_expecting(
        reader: &mut dyn Read,
        device: Device,
        expected: &[usize],
    ) -> Result<Tensor, BlockError> {
        Self::decode_with(reader, device, Some(expected))
    }

    fn decode_with(
        reader: &mut dyn Read,
        device: Device,
        expected: Option<&[usize]>,
    ) -> Result<Tensor, BlockError> {
        let code = read_array::<1>(reader, "数据类型")?[0];
        let data_type = DataType::from_code(code)
            .ok_or_else(|| BlockError::Serialization(format!("未知的数据类型码: {code}")))?;

        let rank = u32::from_le_bytes(read_array(reader, "阶数")?) as usize;
        if rank > MAX_RANK {
            return Err(BlockError::Serialization(format!(
                "张量阶数{rank}超过上限{MAX_RANK}"
            )));
        }
        if let Some(expected) = expected.filter(|e| e.len() != rank) {
            return Err(BlockError::Serialization(format!(
                "张量阶数不匹配：应为{}，流中为{rank}",
                expected.len()
            )));
        }

        let mut shape = Vec::with_capacity(rank);
        for axis in 0..rank {
            let dim = u32::from_le_bytes(read_array(reader, "形状")?) as usize;
            if let Some(expected) = expected.filter(|e| e[axis] != dim) {
                return Err(BlockError::Serialization(format!(
                    "张量形状不匹配：应为{expected:?}，流中第{axis}维为{dim}"
                )));
            }
            shape.push(dim);
        }

        let byte_len = shape
            .iter()
            .try_fold(data_type.byte_size(), |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                BlockError::Serialization(format!("张量形状{shape:?}的字节数溢出"))
            })?;
        let bytes = read_bytes(reader, byte_len, "张量数据")?;
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect::<Vec<_>>();

        Ok(Tensor::try_new(&data, &shape)?.to_device(device))
    }

    /// 将单个Tensor整体（含设备标签）写入`writer`
    pub fn save(&self, writer: &mut impl Write) -> Result<(), BlockError> {
        bincode::serialize_into(writer, self)
            .map_err(|e| BlockError::Serialization(format!("张量保存失败: {e}")))
    }

    /// 读取[`Tensor::save`]写出的张量
    pub fn load(reader: &mut impl Read) -> Result<Self, BlockError> {
        let tensor: Tensor = bincode::deserialize_from(reader)
            .map_err(|e| BlockError::Serialization(format!("张量加载失败: {e}")))?;
        Ok(Tensor::from_array(tensor.data().clone()).to_device(tensor.device()))
    }
}

pub(crate) fn read_array<const N: usize>(
    reader: &mut dyn Read,
    what: &str,
) -> Result<[u8; N], BlockError> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|e| BlockError::Serialization(format!("读取{what}失败: {e}")))?;
    Ok(buf)
}

/// 读取恰好`len`个字节；缓冲区随实际读到的数据增长，不按`len`预先分配
pub(crate) fn read_bytes(
    reader: &mut dyn Read,
    len: usize,
    what: &str,
) -> Result<Vec<u8>, BlockError> {
    let mut buf = Vec::new();
    (&mut *reader)
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| BlockError::Serialization(format!("读取{what}失败: {e}")))?;
    if buf.len() != len {
        return Err(BlockError::Serialization(format!(
            "读取{what}失败: 应有{len}字节，流中只有{}字节",
            buf.len()
        )));
    }
    Ok(buf)
}
