/// An enum carried in one parameter word.
pub trait WireEnum: Sized + Copy {
    fn from_wire(raw: u32) -> Option<Self>;

    fn to_wire(self) -> u32;
}

/// Implements [`WireEnum`] for a fieldless `#[repr(u32)]`-like enum.
///
/// ```text
/// wire_enum! {
///     pub enum PerformanceMode {
///         Normal = 0,
///         Boost = 1,
///     }
/// }
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $crate::WireEnum for $name {
            fn from_wire(raw: u32) -> ::core::option::Option<Self> {
                match raw {
                    $(x if x == $value => ::core::option::Option::Some(Self::$variant),)+
                    _ => ::core::option::Option::None,
                }
            }

            fn to_wire(self) -> u32 {
                self as u32
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::WireEnum;

    wire_enum! {
        enum Mode {
            Normal = 0,
            Boost = 1,
        }
    }

    #[test]
    fn test_wire_enum_maps_values() {
        assert_eq!(Mode::from_wire(1), Some(Mode::Boost));
        assert_eq!(Mode::from_wire(2), None);
        assert_eq!(Mode::Normal.to_wire(), 0);
    }
}
