use crate::attributes::{FieldAttributes, TableAttributes};
use convert_case::{Case, Casing};
use itertools::Itertools;
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DataStruct, DeriveInput, Error, Field, Fields, Result, Type};

const BINDING: &str = "binding";

enum SlotType {
    Reference,
    ReferenceList,
    Activation,
}

fn slot_type(ty: &Type) -> Option<SlotType> {
    let Type::Path(path) = ty else {
        return None;
    };

    match path.path.segments.last()?.ident.to_string().as_str() {
        "Reference" => Some(SlotType::Reference),
        "ReferenceList" => Some(SlotType::ReferenceList),
        "ActivationSlot" => Some(SlotType::Activation),
        _ => None,
    }
}

fn extract_field_attributes(attributes: &[Attribute]) -> Result<Option<FieldAttributes>> {
    attributes
        .iter()
        .filter(|attribute| attribute.path().is_ident(BINDING))
        .map(FieldAttributes::try_from)
        .next()
        .transpose()
}

fn extract_table_attributes(attributes: &[Attribute]) -> Result<Option<TableAttributes>> {
    attributes
        .iter()
        .filter(|attribute| attribute.path().is_ident(BINDING))
        .map(TableAttributes::try_from)
        .next()
        .transpose()
}

struct TableEntry<'a> {
    ident: &'a Ident,
    name: String,
    slot: SlotType,
}

fn make_entry(field: &Field) -> Result<Option<TableEntry>> {
    let Some(ident) = field.ident.as_ref() else {
        return Err(Error::new(
            field.span(),
            "FieldTable can only be derived for structs with named fields!",
        ));
    };

    let attributes = extract_field_attributes(&field.attrs)?;
    if matches!(attributes, Some(FieldAttributes { ignore: true, .. })) {
        return Ok(None);
    }

    let Some(slot) = slot_type(&field.ty) else {
        return match attributes {
            Some(FieldAttributes { name: Some(name), .. }) => Err(Error::new(
                name.span(),
                "Named binding fields must be Reference, ReferenceList or ActivationSlot!",
            )),
            _ => Ok(None),
        };
    };

    let name = attributes
        .and_then(|attributes| attributes.name)
        .map(|name| name.value())
        .unwrap_or_else(|| ident.to_string());

    Ok(Some(TableEntry { ident, name, slot }))
}

pub fn expand_field_table(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(DataStruct { fields, .. }) = &input.data else {
        return Err(Error::new(
            input.span(),
            "Can only derive FieldTable on structs!",
        ));
    };

    let entries: Vec<_> = match fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .map(make_entry)
            .filter_map_ok(|entry| entry)
            .try_collect()?,
        Fields::Unnamed(fields) if !fields.unnamed.is_empty() => {
            return Err(Error::new(
                fields.span(),
                "FieldTable can only be derived for structs with named fields!",
            ))
        }
        _ => vec![],
    };

    let ident = &input.ident;
    let name = extract_table_attributes(&input.attrs)?
        .and_then(|attributes| attributes.name)
        .map(|name| name.value())
        .unwrap_or_else(|| ident.to_string().to_case(Case::Snake));

    let field_targets = entries
        .iter()
        .filter_map(|entry| {
            let field = entry.ident;
            let name = &entry.name;
            match entry.slot {
                SlotType::Reference => Some(quote! {
                    springtime_bind::component_type::FieldTarget::<Self>::unary(#name, |component: &Self| &component.#field)
                }),
                SlotType::ReferenceList => Some(quote! {
                    springtime_bind::component_type::FieldTarget::<Self>::list(#name, |component: &Self| &component.#field)
                }),
                SlotType::Activation => None,
            }
        })
        .collect_vec();

    let activation_fields = entries
        .iter()
        .filter(|entry| matches!(entry.slot, SlotType::Activation))
        .map(|entry| {
            let field = entry.ident;
            let name = &entry.name;
            quote! {
                springtime_bind::component_type::ActivationField::<Self>::new(#name, |component: &Self| &component.#field)
            }
        })
        .collect_vec();

    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics springtime_bind::component_type::FieldTable for #ident #type_generics #where_clause {
            fn component_name() -> &'static str {
                #name
            }

            fn field_targets() -> Vec<springtime_bind::component_type::FieldTarget<Self>> {
                vec![#(#field_targets),*]
            }

            fn activation_fields() -> Vec<springtime_bind::component_type::ActivationField<Self>> {
                vec![#(#activation_fields),*]
            }
        }
    })
}
