//! Macros for reducing boilerplate when defining models
//!
//! [`impl_model!`](crate::impl_model) declares the struct, injects the `id`
//! field and implements [`Model`](crate::core::entity::Model) for it.

/// Declare a model struct with its `Model` implementation
///
/// The struct derives `Debug`, `Clone`, `Default`, serde and `Validate`.
/// Field attributes (`#[validate(...)]`, `#[serde(...)]`) pass through.
///
/// # Example
///
/// ```rust,ignore
/// use voog::prelude::*;
///
/// impl_model!(
///     Widget,
///     "widget",
///     {
///         #[validate(length(min = 1, message = "must not be empty"))]
///         name: String,
///         price: i64,
///     }
/// );
///
/// // With a default scope applied to every query
/// impl_model!(
///     Gizmo,
///     "gizmo",
///     scope: { "archived" => false },
///     {
///         name: String,
///         archived: bool,
///     }
/// );
/// ```
#[macro_export]
macro_rules! impl_model {
    (
        $type:ident,
        $resource:expr,
        {
            $( $(#[$field_meta:meta])* $field:ident : $field_type:ty ),* $(,)?
        }
    ) => {
        $crate::impl_model!($type, $resource, scope: {}, { $( $(#[$field_meta])* $field : $field_type ),* });
    };
    (
        $type:ident,
        $resource:expr,
        scope: { $( $scope_field:expr => $scope_value:expr ),* $(,)? },
        {
            $( $(#[$field_meta:meta])* $field:ident : $field_type:ty ),* $(,)?
        }
    ) => {
        #[derive(
            Debug,
            Clone,
            Default,
            ::serde::Serialize,
            ::serde::Deserialize,
            ::validator::Validate,
        )]
        #[serde(default)]
        pub struct $type {
            /// Identifier assigned by the engine on first add
            pub id: Option<i64>,
            $( $(#[$field_meta])* pub $field : $field_type ),*
        }

        impl $crate::core::entity::Model for $type {
            fn resource_name() -> &'static str {
                $resource
            }

            fn id(&self) -> Option<i64> {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = Some(id);
            }

            fn default_scope() -> $crate::core::entity::Scope {
                #[allow(unused_mut)]
                let mut scope = $crate::core::entity::Scope::new();
                $(
                    scope.insert(
                        ($scope_field).to_string(),
                        $crate::core::field::FieldValue::from($scope_value),
                    );
                )*
                scope
            }
        }
    };
}
