mod save_load;
mod store;

use crate::nn::ForwardParams;

/// 不带附加参数的 forward
pub(super) fn no_params() -> ForwardParams {
    ForwardParams::new()
}
