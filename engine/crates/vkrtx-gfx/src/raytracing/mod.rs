pub mod acceleration;
pub mod sbt;

/// 向上对齐到 alignment 的整数倍，alignment 为 0 时原样返回
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 { value } else { value.div_ceil(alignment) * alignment }
}
