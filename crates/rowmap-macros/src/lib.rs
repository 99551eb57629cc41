//! Derive macro for rowmap entities.
//!
//! `rowmap-macros` is the **compile-time codegen layer**. `#[derive(Entity)]`
//! turns a plain struct into an `Entity` by emitting a static
//! `EntityDescriptor`: one getter and one setter per mapped field, plus the
//! table and identity markers. Nothing is checked beyond syntax; mapping
//! rules are enforced when the session first derives metadata for the type.
//!
//! Used by application crates via the `rowmap` facade, which must sit next to
//! `rowmap-core` in the dependency graph.

use proc_macro::TokenStream;
use quote::quote;

mod parse;

use parse::{EntityDef, FieldDef, parse_entity};

/// Derive macro for the `Entity` trait.
///
/// Every named field is mapped unless marked `skip`. Field types must
/// implement `Clone`, `Into<Value>` and `FromValue`; the struct must
/// implement `Default`, which seeds instances built from rows.
///
/// # Attributes
///
/// - `#[rowmap(table = "name")]` - Override table name (defaults to the struct name)
/// - `#[rowmap(id)]` - Mark the identity field
/// - `#[rowmap(column = "name")]` - Override column name
/// - `#[rowmap(skip)]` - Leave the field unmapped
///
/// # Example
///
/// ```ignore
/// use rowmap::Entity;
///
/// #[derive(Debug, Default, Entity)]
/// #[rowmap(table = "persons")]
/// struct Person {
///     #[rowmap(id)]
///     id: i64,
///     first_name: Option<String>,
///     last_name: Option<String>,
///     #[rowmap(column = "email_address")]
///     email: Option<String>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(rowmap))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_entity_impl(&entity).into()
}

fn generate_entity_impl(entity: &EntityDef) -> proc_macro2::TokenStream {
    let name = &entity.name;
    let type_name = name.to_string();
    let table = option_str(entity.table.as_deref());
    let fields = entity.fields.iter().map(|f| generate_field(name, f));

    quote! {
        impl rowmap_core::Entity for #name {
            fn descriptor() -> &'static rowmap_core::EntityDescriptor<Self> {
                static DESCRIPTOR: rowmap_core::EntityDescriptor<#name> =
                    rowmap_core::EntityDescriptor {
                        type_name: #type_name,
                        table: #table,
                        new: <#name as ::core::default::Default>::default,
                        fields: &[#(#fields),*],
                    };
                &DESCRIPTOR
            }
        }
    }
}

fn generate_field(owner: &syn::Ident, field: &FieldDef) -> proc_macro2::TokenStream {
    let ident = &field.name;
    let ty = &field.ty;
    let name = ident.to_string();
    let column = option_str(field.column.as_deref());
    let identity = field.identity;

    quote! {
        rowmap_core::FieldDescriptor {
            name: #name,
            column: #column,
            identity: #identity,
            get: |entity: &#owner| {
                rowmap_core::Value::from(::core::clone::Clone::clone(&entity.#ident))
            },
            set: |entity: &mut #owner, value: &rowmap_core::Value| {
                entity.#ident = <#ty as rowmap_core::FromValue>::from_value(value)?;
                ::core::result::Result::Ok(())
            },
        }
    }
}

fn option_str(value: Option<&str>) -> proc_macro2::TokenStream {
    match value {
        Some(s) => quote! { ::core::option::Option::Some(#s) },
        None => quote! { ::core::option::Option::None },
    }
}
