/*
 * @Description  : Tensor 单元测试
 */

use approx::assert_abs_diff_eq;

use crate::{assert_err, assert_panic};
use crate::errors::BlockError;
use crate::tensor::{DataType, Device, Tensor, shapes_of};

#[test]
fn test_new_and_properties() {
    let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
    assert_eq!(t.shape(), &[2, 3]);
    assert_eq!(t.dimension(), 2);
    assert_eq!(t.size(), 6);
    assert_eq!(t.device(), Device::Cpu);
    assert_eq!(t.data_type(), DataType::Float32);
    assert_eq!(t.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_try_new_rejects_wrong_length() {
    assert_err!(
        Tensor::try_new(&[1.0, 2.0, 3.0], &[2, 2]),
        BlockError::ShapeMismatch { expected, got, .. } if expected == &[2, 2] && got == &[3]
    );
}

#[test]
fn test_new_panics_on_wrong_length() {
    assert_panic!(
        Tensor::new(&[1.0], &[2, 2]),
        "形状不匹配（数据长度1与形状[2, 2]的元素个数4不符）：预期[2, 2]，实际为[1]"
    );
}

#[test]
fn test_to_device_keeps_values() {
    let t = Tensor::ones(&[2, 2]);
    let g = t.to_device(Device::Gpu(1));
    assert_eq!(g.device(), Device::Gpu(1));
    // 相等比较不看设备
    assert_eq!(g, t);
    assert_eq!(Device::Gpu(1).to_string(), "gpu(1)");
}

#[test]
fn test_mat_mul() -> Result<(), BlockError> {
    let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
    let b = Tensor::new(&[5.0, 6.0, 7.0, 8.0], &[2, 2]);
    let c = a.mat_mul(&b)?;
    assert_eq!(c, Tensor::new(&[19.0, 22.0, 43.0, 50.0], &[2, 2]));

    assert_err!(a.mat_mul(&Tensor::ones(&[3, 2])), BlockError::ShapeMismatch { .. });
    Ok(())
}

#[test]
fn test_add_bias_broadcasts_over_last_dim() -> Result<(), BlockError> {
    let x = Tensor::zeros(&[2, 3]);
    let bias = Tensor::new(&[1.0, 2.0, 3.0], &[3]);
    let y = x.add_bias(&bias)?;
    assert_eq!(y.to_vec(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

    assert_err!(x.add_bias(&Tensor::ones(&[2])), BlockError::ShapeMismatch { .. });
    Ok(())
}

#[test]
fn test_activations() {
    let x = Tensor::new(&[-1.0, 0.0, 2.0], &[3]);
    assert_eq!(x.relu().to_vec(), vec![0.0, 0.0, 2.0]);
    assert_abs_diff_eq!(x.sigmoid(), Tensor::new(&[0.268_941_42, 0.5, 0.880_797_1], &[3]), epsilon = 1e-6);
    assert_abs_diff_eq!(x.tanh(), Tensor::new(&[-0.761_594_2, 0.0, 0.964_027_6], &[3]), epsilon = 1e-6);
}

#[test]
fn test_select_removes_axis() -> Result<(), BlockError> {
    // [batch=2, time=3, hidden=2]
    let data: Vec<f32> = (0..12).map(|i| i as f32).collect();
    let t = Tensor::new(&data, &[2, 3, 2]);
    let last = t.select(1, 2)?;
    assert_eq!(last.shape(), &[2, 2]);
    assert_eq!(last.to_vec(), vec![4.0, 5.0, 10.0, 11.0]);

    assert_err!(t.select(1, 3), BlockError::ShapeMismatch { .. });
    assert_err!(t.select(3, 0), BlockError::ShapeMismatch { .. });
    Ok(())
}

#[test]
fn test_encode_decode_is_bit_exact() -> Result<(), BlockError> {
    let t = Tensor::new(&[0.1, -0.0, f32::MIN_POSITIVE, 1e30, 3.5, -7.25], &[3, 2]);
    let mut bytes = Vec::new();
    t.encode(&mut bytes)?;
    // 类型码 + 阶数 + 2个维度 + 6个元素
    assert_eq!(bytes.len(), 1 + 4 + 2 * 4 + 6 * 4);

    let decoded = Tensor::decode(&mut bytes.as_slice(), Device::Gpu(0))?;
    assert_eq!(decoded, t);
    assert_eq!(decoded.device(), Device::Gpu(0));
    Ok(())
}

#[test]
fn test_decode_truncated_stream() -> Result<(), BlockError> {
    let mut bytes = Vec::new();
    Tensor::ones(&[4]).encode(&mut bytes)?;
    bytes.truncate(bytes.len() - 1);
    assert_err!(
        Tensor::decode(&mut bytes.as_slice(), Device::Cpu),
        BlockError::Serialization(msg) if msg.contains("张量数据")
    );

    let bad_code = [9u8, 0, 0, 0, 0];
    assert_err!(
        Tensor::decode(&mut bad_code.as_slice(), Device::Cpu),
        BlockError::Serialization(msg) if msg.contains("数据类型码")
    );
    Ok(())
}

/// 按编码格式拼出只有类型码、阶数和各维的记录头
fn header(rank: u32, dims: &[u32]) -> Vec<u8> {
    let mut bytes = vec![DataType::Float32.code()];
    bytes.extend_from_slice(&rank.to_le_bytes());
    for dim in dims {
        bytes.extend_from_slice(&dim.to_le_bytes());
    }
    bytes
}

#[test]
fn test_decode_rejects_oversized_header() {
    // 元素个数乘以字节数溢出
    let overflow = header(2, &[u32::MAX, u32::MAX]);
    assert_err!(
        Tensor::decode(&mut overflow.as_slice(), Device::Cpu),
        BlockError::Serialization(msg) if msg.contains("溢出")
    );

    // 阶数过大
    let huge_rank = header(u32::MAX, &[]);
    assert_err!(
        Tensor::decode(&mut huge_rank.as_slice(), Device::Cpu),
        BlockError::Serialization(msg) if msg.contains("超过上限")
    );

    // 声称有 4 TiB 数据但流已结束
    let missing_data = header(2, &[1 << 20, 1 << 20]);
    assert_err!(
        Tensor::decode(&mut missing_data.as_slice(), Device::Cpu),
        BlockError::Serialization(msg) if msg.contains("张量数据")
    );
}

#[test]
fn test_decode_expecting_checks_shape_first() -> Result<(), BlockError> {
    let mut bytes = Vec::new();
    Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).encode(&mut bytes)?;
    let t = Tensor::decode_expecting(&mut bytes.as_slice(), Device::Cpu, &[2, 3])?;
    assert_eq!(t.shape(), &[2, 3]);

    assert_err!(
        Tensor::decode_expecting(&mut bytes.as_slice(), Device::Cpu, &[6]),
        BlockError::Serialization(msg) if msg.contains("阶数不匹配")
    );
    assert_err!(
        Tensor::decode_expecting(&mut bytes.as_slice(), Device::Cpu, &[3, 2]),
        BlockError::Serialization(msg) if msg.contains("形状不匹配")
    );

    // 维度不符时在读取数据之前报错，即使声称的数据量极大
    let huge = header(2, &[u32::MAX, u32::MAX]);
    assert_err!(
        Tensor::decode_expecting(&mut huge.as_slice(), Device::Cpu, &[2, 3]),
        BlockError::Serialization(msg) if msg.contains("形状不匹配")
    );
    Ok(())
}

#[test]
fn test_save_load_with_bincode() -> Result<(), BlockError> {
    let t = Tensor::new(&[1.5, 2.5, 3.5], &[3, 1]).to_device(Device::Gpu(2));
    let mut bytes = Vec::new();
    t.save(&mut bytes)?;
    let loaded = Tensor::load(&mut bytes.as_slice())?;
    assert_eq!(loaded, t);
    assert_eq!(loaded.device(), Device::Gpu(2));
    Ok(())
}

#[test]
fn test_shapes_of() {
    let list = vec![Tensor::zeros(&[2, 3]), Tensor::zeros(&[4])];
    assert_eq!(shapes_of(&list), vec![vec![2, 3], vec![4]]);
}
