/// A typed key naming a physical table.
///
/// Usually implemented by an enum generated with [`tables!`](crate::tables);
/// plain strings implement it too for ad-hoc queries.
pub trait Table {
    fn name(&self) -> &str;
}

impl Table for str {
    fn name(&self) -> &str {
        self
    }
}

impl Table for String {
    fn name(&self) -> &str {
        self
    }
}

impl<T: Table + ?Sized> Table for &T {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Declare an enum of tables backed by their physical names.
///
/// ```
/// rust_sqldb::tables! {
///     pub enum Tables {
///         Users => "users",
///         Orders => "orders",
///     }
/// }
///
/// use rust_sqldb::Table;
/// assert_eq!(Tables::Users.name(), "users");
/// assert_eq!(Tables::ALL.len(), 2);
/// ```
#[macro_export]
macro_rules! tables {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $table:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every table in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl $crate::Table for $name {
            fn name(&self) -> &str {
                match self {
                    $($name::$variant => $table),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::Table::name(self))
            }
        }
    };
}
