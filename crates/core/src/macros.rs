// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.
//!
//! - [`simple_display!`] — `Display` impl mapping enum variants to string literals
//! - [`payload!`] — build an event payload map from `key => value` pairs

/// Generate a `Display` impl that maps enum variants to string literals.
///
/// Unit variants match directly; data-carrying variants use `(..)` to ignore fields.
///
/// ```ignore
/// crate::simple_display! {
///     MyEnum {
///         Foo => "foo",
///         Bar(..) => "bar",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident $(( $($ignore:tt)* ))? => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant $(( $($ignore)* ))? => $str, )+
                })
            }
        }
    };
}

/// Build an event [`Payload`](crate::event::Payload) from `key => value` pairs.
///
/// Values go through `PayloadValue::from`, so strings, integers, floats and
/// bools all work.
///
/// ```ignore
/// let p = hive_core::payload! {
///     "service" => "billing",
///     "restarts" => 3,
///     "forced" => true,
/// };
/// ```
#[macro_export]
macro_rules! payload {
    () => {
        $crate::event::Payload::new()
    };
    ($( $key:expr => $value:expr ),+ $(,)?) => {{
        let mut map = $crate::event::Payload::new();
        $( map.insert($key.to_string(), $crate::event::PayloadValue::from($value)); )+
        map
    }};
}
