/// Declare a struct of boolean field flags.
///
/// The generated struct serializes to a camelCase object that only contains the
/// selected (`true`) fields, which is the shape the gateway expects.
macro_rules! field_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            $(
                $(#[$field_meta])*
                #[serde(default, skip_serializing_if = "std::ops::Not::not")]
                pub $field: bool,
            )*
        }

        impl $name {
            /// Returns a selection with every field selected.
            pub fn all() -> Self {
                Self {
                    $($field: true,)*
                }
            }

            /// Returns the field-by-field union of the two selections.
            pub fn union(&self, other: &Self) -> Self {
                Self {
                    $($field: self.$field || other.$field,)*
                }
            }

            /// Returns `true` if no field is selected.
            pub fn is_empty(&self) -> bool {
                !($(self.$field)||*)
            }
        }
    };
}
