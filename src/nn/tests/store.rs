/*
 * @Description  : ParameterStore 测试
 */

use std::sync::Arc;
use std::thread;

use crate::assert_err;
use crate::errors::BlockError;
use crate::nn::{DynamicShape, Init, Parameter, ParameterStore};
use crate::tensor::{DataType, Device, Tensor};

fn ready_parameter(name: &str) -> Result<Parameter, BlockError> {
    let mut p = Parameter::new(name, DynamicShape::fixed(&[2, 3])).with_init(Init::Ones);
    p.initialize(Device::Cpu, DataType::Float32, &[2, 3])?;
    Ok(p)
}

#[test]
fn test_resolve_returns_same_instance() -> Result<(), BlockError> {
    let store = ParameterStore::new();
    let p = ready_parameter("w")?;
    let first = store.resolve(&p, Device::Cpu)?;
    let second = store.resolve(&p, Device::Cpu)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn test_resolve_per_device() -> Result<(), BlockError> {
    let store = ParameterStore::new();
    let p = ready_parameter("w")?;
    let cpu = store.resolve(&p, Device::Cpu)?;
    let gpu = store.resolve(&p, Device::Gpu(0))?;
    assert!(!Arc::ptr_eq(&cpu, &gpu));
    assert_eq!(gpu.device(), Device::Gpu(0));
    assert_eq!(*cpu, *gpu);
    assert_eq!(store.len(), 2);
    Ok(())
}

#[test]
fn test_resolve_uninitialized_parameter() {
    let store = ParameterStore::new();
    let p = Parameter::new("w", DynamicShape::new(&[None, Some(2)]));
    assert_err!(store.resolve(&p, Device::Cpu), BlockError::UninitializedUse(_));
    assert!(store.is_empty());
}

#[test]
fn test_invalidate_and_clear() -> Result<(), BlockError> {
    let store = ParameterStore::new();
    let a = ready_parameter("a")?;
    let b = ready_parameter("b")?;
    store.resolve(&a, Device::Cpu)?;
    store.resolve(&a, Device::Gpu(1))?;
    store.resolve(&b, Device::Cpu)?;

    store.invalidate(a.id());
    assert_eq!(store.len(), 1);
    store.clear();
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn test_concurrent_resolve_is_idempotent() -> Result<(), BlockError> {
    let store = ParameterStore::new();
    let p = ready_parameter("shared")?;
    let resolved = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| store.resolve(&p, Device::Gpu(0))))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| panic!("解析线程panic")))
            .collect::<Result<Vec<_>, _>>()
    })?;
    assert!(resolved.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn test_replaced_value_is_resolved_again() -> Result<(), BlockError> {
    let store = ParameterStore::new();
    let mut p = ready_parameter("w")?;
    let old_id = p.id();
    assert_eq!(*store.resolve(&p, Device::Cpu)?, Tensor::ones(&[2, 3]));

    p.set_array(Tensor::full(2.0, &[2, 3]))?;
    assert_ne!(p.id(), old_id);
    assert_eq!(*store.resolve(&p, Device::Cpu)?, Tensor::full(2.0, &[2, 3]));
    Ok(())
}

#[test]
fn test_clone_does_not_share_cache() -> Result<(), BlockError> {
    let store = ParameterStore::new();
    let p = ready_parameter("w")?;
    let mut copy = p.clone();
    assert_ne!(copy.id(), p.id());

    store.resolve(&p, Device::Cpu)?;
    copy.set_array(Tensor::zeros(&[2, 3]))?;
    assert_eq!(*store.resolve(&copy, Device::Cpu)?, Tensor::zeros(&[2, 3]));
    assert_eq!(*store.resolve(&p, Device::Cpu)?, Tensor::ones(&[2, 3]));
    Ok(())
}
