/*
 * @Description  : 参考层：用于搭建与测试 Block 树的常用叶子与容器
 */

mod activation;
mod linear;
mod sequential;

pub use activation::{Activation, ActivationFn};
pub use linear::{Linear, LinearConfig};
pub use sequential::SequentialBlock;
