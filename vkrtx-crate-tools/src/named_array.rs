/// 创建一个带索引的常量表：枚举的每个变体对应表中的一项，变体的序号就是它在表中的下标
///
/// 典型用途是光追管线的 shader stage / shader group，它们在管线中的下标必须和 SBT 中的顺序一致
#[macro_export]
macro_rules! enumed_map {
    ($vis:vis $enum_name:ident<$vtype:ty>: { $($variant:ident: $value:expr),* $(,)? }) => {
        #[repr(usize)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $enum_name {
            $($variant,)*
        }

        impl $enum_name {
            pub const COUNT: usize = $crate::count_indexed_array!($($variant),*);
            pub const ALL: [Self; $crate::count_indexed_array!($($variant),*)] = [$(Self::$variant,)*];

            fn get_array() -> &'static [$vtype; Self::COUNT] {
                // 延迟初始化，value 可以不是 const 表达式
                static ARRAY: std::sync::OnceLock<[$vtype; $crate::count_indexed_array!($($variant),*)]> =
                    std::sync::OnceLock::new();

                ARRAY.get_or_init(|| [
                    $($value,)*
                ])
            }

            #[inline]
            pub fn value(self) -> &'static $vtype {
                &Self::get_array()[self as usize]
            }

            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }

            #[inline]
            pub fn iter() -> impl Iterator<Item = Self> {
                Self::ALL.into_iter()
            }

            #[inline]
            pub fn array() -> &'static [$vtype; Self::COUNT] {
                Self::get_array()
            }
        }
    };
}

/// 辅助宏，计算变体数量
#[macro_export]
macro_rules! count_indexed_array {
    () => (0);
    ($head:tt $(, $tail:tt)*) => (1 + $crate::count_indexed_array!($($tail),*));
}

#[cfg(test)]
mod tests {
    enumed_map!(Stage<&'static str>: {
        RayGen: "main.rgen",
        ClosestHit: "main.rchit",
        Miss: "main.rmiss",
    });

    #[test]
    fn test_index_follows_declaration_order() {
        assert_eq!(Stage::COUNT, 3);
        assert_eq!(Stage::RayGen.index(), 0);
        assert_eq!(Stage::ClosestHit.index(), 1);
        assert_eq!(Stage::Miss.index(), 2);
        assert_eq!(*Stage::Miss.value(), "main.rmiss");
    }

    #[test]
    fn test_iter_matches_array() {
        let names: Vec<_> = Stage::iter().map(|s| *s.value()).collect();
        assert_eq!(names, Stage::array().to_vec());
    }
}
