/*
 * @Description  : ParameterStore：按 (参数标识, 设备) 解析参数值的登记表
 *
 * Block 在每次 forward 中都通过本表取参数，而不是直接持有设备上的张量：
 * 首次解析时把参数值复制到目标设备并缓存，之后同一键总是返回同一个实例。
 * 整个缓存由一把互斥锁保护，因此多个调用方并发解析同一参数时会被串行化，
 * 结果是幂等的。参数值被替换时参数会换用新的标识，旧条目不会再命中，
 * 只占用内存，可用 invalidate/clear 回收。
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::parameter::{Parameter, ParameterId};
use crate::errors::BlockError;
use crate::tensor::{Device, Tensor};

#[derive(Debug, Default)]
pub struct ParameterStore {
    cache: Mutex<HashMap<(ParameterId, Device), Arc<Tensor>>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析参数在`device`上的值
    pub fn resolve(&self, parameter: &Parameter, device: Device) -> Result<Arc<Tensor>, BlockError> {
        let key = (parameter.id(), device);
        let mut cache = self.lock();
        if let Some(value) = cache.get(&key) {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(parameter.try_array()?.to_device(device));
        debug!(name = parameter.name(), id = parameter.id().0, %device, "参数首次解析到设备");
        cache.insert(key, Arc::clone(&value));
        Ok(value)
    }

    /// 丢弃某个参数标识在所有设备上的缓存
    pub fn invalidate(&self, id: ParameterId) {
        self.lock().retain(|(cached, _), _| *cached != id);
    }

    /// 丢弃全部缓存，如重新加载参数之后回收旧条目
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(ParameterId, Device), Arc<Tensor>>> {
        // 缓存中的值只在插入完成后可见，锁中毒时数据仍然一致
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
