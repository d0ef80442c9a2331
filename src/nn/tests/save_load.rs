/*
 * @Description  : Block 树参数保存/加载测试
 */

use crate::assert_err;
use crate::errors::BlockError;
use super::no_params;
use crate::nn::{
    Block, Linear, ParameterStore, SequentialBlock, load_from_bytes, named_parameters,
    save_to_bytes,
};
use crate::tensor::{DataType, Device, Tensor};

/// 子 Block 顺序为 [A, B]：A 有2个参数，B 有1个
fn two_children() -> SequentialBlock {
    SequentialBlock::new()
        .add_named("A", Linear::new(3))
        .add_named("B", Linear::without_bias(2))
}

fn initialized(mut net: SequentialBlock) -> Result<SequentialBlock, BlockError> {
    net.initialize(Device::Cpu, DataType::Float32, &[vec![1, 4]])?;
    Ok(net)
}

/// 逐条解析参数流，返回每条记录的名称
fn record_names(mut bytes: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    while !bytes.is_empty() {
        assert_eq!(&bytes[..2], &[b'P', 1]);
        let len = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
        names.push(String::from_utf8(bytes[6..6 + len].to_vec()).unwrap_or_default());
        bytes = &bytes[6 + len..];
        let mut reader = bytes;
        Tensor::decode(&mut reader, Device::Cpu).unwrap_or_else(|e| panic!("{e}"));
        bytes = reader;
    }
    names
}

#[test]
fn test_save_writes_records_in_tree_order() -> Result<(), BlockError> {
    let net = initialized(two_children())?;
    let bytes = save_to_bytes(&net)?;
    assert_eq!(record_names(&bytes), ["weight", "bias", "weight"]);

    let flattened: Vec<String> = named_parameters(&net)?.into_iter().map(|(n, _)| n).collect();
    assert_eq!(flattened, ["A.weight", "A.bias", "B.weight"]);
    Ok(())
}

#[test]
fn test_round_trip_is_bit_identical() -> Result<(), BlockError> {
    let source = initialized(two_children())?;
    let bytes = save_to_bytes(&source)?;

    // 新树的参数值是重新随机生成的
    let mut target = initialized(two_children())?;
    load_from_bytes(&mut target, Device::Cpu, &bytes)?;

    let expected = named_parameters(&source)?;
    let actual = named_parameters(&target)?;
    assert_eq!(expected.len(), actual.len());
    for ((name_a, a), (name_b, b)) in expected.iter().zip(actual.iter()) {
        assert_eq!(name_a, name_b);
        let (a, b) = (a.try_array()?, b.try_array()?);
        let bits = |t: &Tensor| t.to_vec().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(a), bits(b), "参数`{name_a}`未能逐位还原");
    }
    Ok(())
}

#[test]
fn test_load_restores_by_position() -> Result<(), BlockError> {
    let mut source = initialized(two_children())?;
    for (i, (_, child)) in source.children_mut().into_iter().enumerate() {
        for param in child.direct_parameters_mut() {
            let shape = param.shape().map(<[usize]>::to_vec).unwrap_or_default();
            param.set_array(Tensor::full(i as f32 + 1.0, &shape))?;
        }
    }
    let bytes = save_to_bytes(&source)?;

    let mut target = initialized(two_children())?;
    load_from_bytes(&mut target, Device::Gpu(0), &bytes)?;
    let children = target.children();
    let a = children[0].1.direct_parameters();
    let b = children[1].1.direct_parameters();
    assert_eq!(a[0].try_array()?, &Tensor::full(1.0, &[4, 3]));
    assert_eq!(a[1].try_array()?, &Tensor::full(1.0, &[3]));
    assert_eq!(b[0].try_array()?, &Tensor::full(2.0, &[3, 2]));
    assert_eq!(b[0].try_array()?.device(), Device::Gpu(0));
    Ok(())
}

#[test]
fn test_load_detects_order_mismatch() -> Result<(), BlockError> {
    // 结构不同：第二个参数位置上是 weight 而不是 bias
    let source = initialized(
        SequentialBlock::new()
            .add_named("A", Linear::without_bias(3))
            .add_named("B", Linear::without_bias(2)),
    )?;
    let bytes = save_to_bytes(&source)?;

    let mut target = initialized(two_children())?;
    let err = load_from_bytes(&mut target, Device::Cpu, &bytes).expect_err("参数顺序不同，应当失败");
    assert_eq!(err.path(), Some("A.bias"));
    assert!(matches!(
        err.root(),
        BlockError::Serialization(msg) if msg.contains("参数顺序不匹配")
    ));
    Ok(())
}

#[test]
fn test_load_detects_shape_mismatch() -> Result<(), BlockError> {
    let mut source = SequentialBlock::new().add_named("A", Linear::without_bias(3));
    source.initialize(Device::Cpu, DataType::Float32, &[vec![1, 5]])?;
    let bytes = save_to_bytes(&source)?;

    let mut target = SequentialBlock::new().add_named("A", Linear::without_bias(3));
    target.initialize(Device::Cpu, DataType::Float32, &[vec![1, 4]])?;
    let err = load_from_bytes(&mut target, Device::Cpu, &bytes).expect_err("形状不同，应当失败");
    assert!(matches!(err.root(), BlockError::Serialization(msg) if msg.contains("形状不匹配")));
    Ok(())
}

#[test]
fn test_load_rejects_truncated_or_extra_bytes() -> Result<(), BlockError> {
    let source = initialized(two_children())?;
    let bytes = save_to_bytes(&source)?;

    let mut target = initialized(two_children())?;
    let err = load_from_bytes(&mut target, Device::Cpu, &bytes[..bytes.len() - 3])
        .expect_err("参数流提前结束，应当失败");
    assert!(matches!(err.root(), BlockError::Serialization(_)));

    let mut longer = bytes.clone();
    longer.push(0);
    assert_err!(
        load_from_bytes(&mut target, Device::Cpu, &longer),
        BlockError::Serialization(msg) if msg.contains("剩余1字节")
    );

    let mut corrupted = bytes;
    corrupted[0] = b'X';
    let err = load_from_bytes(&mut target, Device::Cpu, &corrupted).expect_err("标记损坏，应当失败");
    assert!(matches!(err.root(), BlockError::Serialization(msg) if msg.contains("标记")));
    Ok(())
}

#[test]
fn test_save_or_load_uninitialized_tree_fails() {
    let net = two_children();
    assert_err!(save_to_bytes(&net), BlockError::UninitializedUse(_));

    let mut net = two_children();
    assert_err!(load_from_bytes(&mut net, Device::Cpu, &[]), BlockError::UninitializedUse(_));
}

#[test]
fn test_forward_after_load_uses_loaded_values() -> Result<(), BlockError> {
    let source = initialized(two_children())?;
    let bytes = save_to_bytes(&source)?;
    let x = vec![Tensor::new(&[0.5, -1.0, 2.0, 0.25], &[1, 4])];

    // 同一个 store 先后服务加载前后的两次前向
    let store = ParameterStore::new();
    let mut target = initialized(two_children())?;
    let before = target.forward(&store, &x, false, &no_params())?;
    load_from_bytes(&mut target, Device::Cpu, &bytes)?;
    let after = target.forward(&store, &x, false, &no_params())?;

    let expected = source.forward(&ParameterStore::new(), &x, false, &no_params())?;
    assert_eq!(after, expected);
    assert_ne!(after, before);
    Ok(())
}

#[test]
fn test_duplicate_child_names_are_rejected() -> Result<(), BlockError> {
    let net = initialized(
        SequentialBlock::new()
            .add_named("fc", Linear::new(3))
            .add_named("fc", Linear::new(3)),
    )?;
    assert_err!(save_to_bytes(&net), BlockError::DuplicateName(name) if name == "fc.weight");

    let mut target = initialized(
        SequentialBlock::new()
            .add_named("fc", Linear::new(3))
            .add_named("fc", Linear::new(3)),
    )?;
    assert_err!(
        load_from_bytes(&mut target, Device::Cpu, &[]),
        BlockError::DuplicateName(_)
    );
    Ok(())
}
