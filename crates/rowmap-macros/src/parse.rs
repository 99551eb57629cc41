//! Parsing logic for the Entity derive macro.
//!
//! Extracts struct-level and field-level `#[rowmap(...)]` attributes into
//! [`EntityDef`] and [`FieldDef`] for code generation. Only syntax is checked
//! here; mapping rules (exactly one identity, unique columns, identifier
//! shape) are enforced when metadata is derived at runtime.

use proc_macro2::Span;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, Lit, Result, Type};

/// Parsed definition of a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `Person`).
    pub name: Ident,
    /// Table override from `#[rowmap(table = "...")]`.
    pub table: Option<String>,
    /// Mapped fields, in declaration order. Skipped fields are left out.
    pub fields: Vec<FieldDef>,
}

/// Parsed definition of one mapped field.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    /// Column override from `#[rowmap(column = "...")]`.
    pub column: Option<String>,
    pub ty: Type,
    /// Marked with `#[rowmap(id)]`.
    pub identity: bool,
}

pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let table = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    Ok(EntityDef {
        name: input.ident.clone(),
        table,
        fields,
    })
}

/// Parse struct-level `#[rowmap(...)]` attributes.
///
/// Supported keys:
/// - `table = "name"` (defaults to the struct name)
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("rowmap") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                if table.is_some() {
                    return Err(Error::new_spanned(
                        meta.path,
                        "duplicate rowmap attribute: table",
                    ));
                }
                table = Some(string_value(&meta, "table name")?);
                Ok(())
            } else {
                Err(Error::new_spanned(
                    meta.path,
                    "unknown rowmap struct attribute (expected `table`)",
                ))
            }
        })?;
    }

    Ok(table)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => {
            let mut parsed = Vec::with_capacity(named.named.len());
            for field in &named.named {
                if let Some(def) = parse_field(field)? {
                    parsed.push(def);
                }
            }
            Ok(parsed)
        }
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

/// Parse one field. Returns `None` for `#[rowmap(skip)]`.
fn parse_field(field: &Field) -> Result<Option<FieldDef>> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut column: Option<String> = None;
    let mut identity = false;
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("rowmap") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("id") {
                identity = true;
            } else if path.is_ident("skip") {
                skip = true;
            } else if path.is_ident("column") {
                if column.is_some() {
                    return Err(Error::new_spanned(
                        path,
                        "duplicate rowmap attribute: column",
                    ));
                }
                column = Some(string_value(&meta, "column name")?);
            } else {
                return Err(Error::new_spanned(
                    path,
                    "unknown rowmap field attribute (expected `id`, `column` or `skip`)",
                ));
            }
            Ok(())
        })?;
    }

    if skip {
        if identity || column.is_some() {
            return Err(Error::new_spanned(
                &name,
                "a skipped field cannot also be `id` or have a `column`",
            ));
        }
        return Ok(None);
    }

    Ok(Some(FieldDef {
        name,
        column,
        ty: field.ty.clone(),
        identity,
    }))
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<String> {
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Str(lit_str) => Ok(lit_str.value()),
        other => Err(Error::new_spanned(
            other,
            format!("expected string literal for {what}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn parses_table_identity_and_columns() {
        let input: DeriveInput = parse_quote! {
            #[rowmap(table = "persons")]
            struct Person {
                #[rowmap(id, column = "person_id")]
                id: i64,
                first_name: Option<String>,
                #[rowmap(skip)]
                cached_label: String,
            }
        };

        let def = parse_entity(&input).unwrap();
        assert_eq!(def.name, "Person");
        assert_eq!(def.table.as_deref(), Some("persons"));
        assert_eq!(def.fields.len(), 2);
        assert!(def.fields[0].identity);
        assert_eq!(def.fields[0].column.as_deref(), Some("person_id"));
        assert_eq!(def.fields[1].name, "first_name");
        assert!(!def.fields[1].identity);
        assert_eq!(def.fields[1].column, None);
    }

    #[test]
    fn table_defaults_to_none() {
        let input: DeriveInput = parse_quote! {
            struct Tag {
                #[rowmap(id)]
                id: i64,
            }
        };
        assert_eq!(parse_entity(&input).unwrap().table, None);
    }

    #[test]
    fn identity_is_not_required_at_parse_time() {
        let input: DeriveInput = parse_quote! {
            struct Loose {
                name: String,
            }
        };
        let def = parse_entity(&input).unwrap();
        assert!(def.fields.iter().all(|f| !f.identity));
    }

    #[test]
    fn rejects_unknown_attributes() {
        let input: DeriveInput = parse_quote! {
            #[rowmap(schema = "x")]
            struct Event {
                #[rowmap(id)]
                id: i64,
            }
        };
        let err = parse_entity(&input).unwrap_err();
        assert!(
            err.to_string().contains("unknown rowmap struct attribute"),
            "{err}"
        );

        let input: DeriveInput = parse_quote! {
            struct Event {
                #[rowmap(primary_key)]
                id: i64,
            }
        };
        let err = parse_entity(&input).unwrap_err();
        assert!(
            err.to_string().contains("unknown rowmap field attribute"),
            "{err}"
        );
    }

    #[test]
    fn rejects_duplicate_table() {
        let input: DeriveInput = parse_quote! {
            #[rowmap(table = "a")]
            #[rowmap(table = "b")]
            struct Event {
                #[rowmap(id)]
                id: i64,
            }
        };
        assert!(parse_entity(&input).is_err());
    }

    #[test]
    fn rejects_non_string_column() {
        let input: DeriveInput = parse_quote! {
            struct Event {
                #[rowmap(id, column = 5)]
                id: i64,
            }
        };
        let err = parse_entity(&input).unwrap_err();
        assert!(err.to_string().contains("expected string literal"), "{err}");
    }

    #[test]
    fn rejects_skipped_identity() {
        let input: DeriveInput = parse_quote! {
            struct Event {
                #[rowmap(id, skip)]
                id: i64,
            }
        };
        assert!(parse_entity(&input).is_err());
    }

    #[test]
    fn rejects_generics_enums_and_tuple_structs() {
        let generic: DeriveInput = parse_quote! {
            struct Wrapper<T> {
                #[rowmap(id)]
                id: i64,
                inner: T,
            }
        };
        assert!(parse_entity(&generic).is_err());

        let en: DeriveInput = parse_quote! {
            enum Kind { A, B }
        };
        assert!(parse_entity(&en).is_err());

        let tuple: DeriveInput = parse_quote! {
            struct Pair(i64, String);
        };
        assert!(parse_entity(&tuple).is_err());
    }
}
