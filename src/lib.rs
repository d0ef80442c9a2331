//! # Only Block
//!
//! `only_block`用纯rust实现一套可组合的神经网络模块（Block）抽象：
//! 每个 Block 拥有若干参数与子 Block，先按示例输入形状推断并物化参数，再执行前向计算；
//! 在此之上提供编码器-解码器结构，负责编码器最终状态到解码器的交接。
//!

pub mod errors;
pub mod nn;
pub mod tensor;
pub mod utils;
