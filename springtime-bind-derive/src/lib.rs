use crate::field_table::expand_field_table;
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput, Error};

mod attributes;
mod field_table;

/// Generates a `FieldTable` implementation listing all `Reference`, `ReferenceList` and
/// `ActivationSlot` fields of a struct.
///
/// Supported attributes:
///
/// * `#[binding(name = "...")]` on the struct - component type name; defaults to the snake case
///   struct name
/// * `#[binding(name = "...")]` on a field - slot name; defaults to the field name
/// * `#[binding(ignore)]` on a field - excludes the field from the table
#[proc_macro_derive(FieldTable, attributes(binding))]
pub fn generate_field_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_field_table(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
