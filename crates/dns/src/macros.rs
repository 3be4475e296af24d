/// Declare a `u16`-backed wire enum with an `Unknown(u16)` fallback.
///
/// The string after the enum name is the presentation prefix for unnamed
/// values (`TYPE99`, `CLASS1232` as in RFC 3597).
#[macro_export]
macro_rules! wire_u16_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $unknown_prefix:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )*
            Unknown(u16),
        }

        impl $name {
            pub const fn from_u16(value: u16) -> Self {
                match value {
                    $($value => Self::$variant,)*
                    other => Self::Unknown(other),
                }
            }

            pub const fn to_u16(self) -> u16 {
                match self {
                    $(Self::$variant => $value,)*
                    Self::Unknown(v) => v,
                }
            }

            /// Mnemonic of a named value, `None` for `Unknown`.
            pub const fn mnemonic(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some(stringify!($variant)),)*
                    Self::Unknown(_) => None,
                }
            }
        }

        impl From<u16> for $name {
            fn from(value: u16) -> Self {
                Self::from_u16(value)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> Self {
                value.to_u16()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self.mnemonic() {
                    Some(mnemonic) => f.write_str(mnemonic),
                    None => write!(f, concat!($unknown_prefix, "{}"), self.to_u16()),
                }
            }
        }
    };
}
