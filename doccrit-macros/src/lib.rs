//! Procedural macros for the doccrit project.
//!
//! - `#[derive(Fields)]` generates a `{Type}Fields` accessor type with one function per
//!   stored field, each returning a typed `Property`.
//! - `#[derive(Entity)]` binds a type to its collection.
//!
//! Generated code refers to items through the `doccrit` umbrella crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Data, DeriveInput, Expr, ExprLit, Fields, Lit, LitStr, Meta, Token, parse_macro_input,
    punctuated::Punctuated,
};

/// Derives typed property accessors for a struct with named fields.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Fields)]
/// struct Book {
///     #[serde(rename = "_id")]
///     id: ObjectId,
///     title: String,
///     #[doccrit(rename = "pub_year")]
///     year: i32,
///     #[serde(skip)]
///     cached: Option<String>,
/// }
///
/// assert_eq!(BookFields::id().path(), "_id");
/// assert_eq!(BookFields::year().path(), "pub_year");
/// ```
#[proc_macro_derive(Fields, attributes(doccrit))]
pub fn derive_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_fields_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Implements `Entity`, optionally with an explicit collection name.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Entity)]
/// #[entity(collection = "books")]
/// struct Book { title: String }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_entity_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// A field that gets an accessor.
struct FieldInfo {
    accessor: syn::Ident,
    ty: syn::Type,
    stored_name: String,
}

fn derive_fields_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let vis = &input.vis;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Fields derive does not support generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Fields derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Fields derive only supports structs",
            ));
        }
    };

    let field_infos = fields
        .iter()
        .map(parse_field)
        .collect::<syn::Result<Vec<_>>>()?
        .into_iter()
        .flatten();

    let fields_ident = format_ident!("{}Fields", name);
    let accessors = field_infos.map(|field| {
        let FieldInfo {
            accessor,
            ty,
            stored_name,
        } = field;
        let doc = format!("The `{stored_name}` field.");
        quote! {
            #[doc = #doc]
            pub fn #accessor() -> ::doccrit::property::Property<#name, #ty> {
                ::doccrit::property::Property::new(#stored_name)
            }
        }
    });

    let doc = format!("Typed property references for [`{name}`].");
    Ok(quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, Copy)]
        #vis struct #fields_ident;

        #[allow(dead_code)]
        impl #fields_ident {
            #(#accessors)*
        }

        impl ::doccrit::property::HasFields for #name {
            type Fields = #fields_ident;
        }

        impl ::doccrit::property::Embedded for #name {
            type Target = #name;
        }
    })
}

/// Returns `None` for skipped fields.
fn parse_field(field: &syn::Field) -> syn::Result<Option<FieldInfo>> {
    let accessor = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Fields must be named"))?;

    let mut serde_rename = None;
    let mut doccrit_rename = None;
    let mut skip = false;

    for attr in &field.attrs {
        if attr.path().is_ident("serde") {
            let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
            for meta in metas {
                match meta {
                    Meta::Path(path) if path.is_ident("skip") || path.is_ident("skip_serializing") => {
                        skip = true;
                    }
                    Meta::NameValue(pair) if pair.path.is_ident("rename") => {
                        if let Expr::Lit(ExprLit {
                            lit: Lit::Str(value),
                            ..
                        }) = &pair.value
                        {
                            serde_rename = Some(value.value());
                        }
                    }
                    _ => {}
                }
            }
        } else if attr.path().is_ident("doccrit") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    doccrit_rename = Some(value.value());
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `rename = \"...\"` or `skip`"))
                }
            })?;
        }
    }

    if skip {
        return Ok(None);
    }

    let raw = accessor.to_string();
    let stored_name = doccrit_rename
        .or(serde_rename)
        .unwrap_or_else(|| raw.strip_prefix("r#").unwrap_or(&raw).to_string());

    Ok(Some(FieldInfo {
        accessor,
        ty: field.ty.clone(),
        stored_name,
    }))
}

fn derive_entity_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut collection = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `collection = \"...\"`"))
            }
        })?;
    }

    let body = collection.map(|collection| {
        quote! {
            fn collection_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(#collection)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::doccrit::entity::Entity for #name #ty_generics #where_clause {
            #body
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn fields_use_stored_names() {
        let input: DeriveInput = parse_quote! {
            pub struct Book {
                #[serde(rename = "_id")]
                id: String,
                #[serde(rename = "ignored", default)]
                #[doccrit(rename = "pub_year")]
                year: i32,
                r#type: String,
                #[serde(skip)]
                cached: Option<String>,
                #[doccrit(skip)]
                scratch: u8,
            }
        };

        let code = derive_fields_impl(&input).unwrap().to_string();
        assert!(code.contains("pub struct BookFields"));
        assert!(code.contains("\"_id\""));
        assert!(code.contains("\"pub_year\""));
        assert!(!code.contains("\"ignored\""));
        assert!(code.contains("\"type\""));
        assert!(!code.contains("cached"));
        assert!(!code.contains("scratch"));
        assert!(code.contains("HasFields for Book"));
        assert!(code.contains("type Target = Book"));
    }

    #[test]
    fn fields_reject_tuple_structs_and_enums() {
        let tuple: DeriveInput = parse_quote! { struct Pair(i32, i32); };
        assert!(derive_fields_impl(&tuple).is_err());

        let enumeration: DeriveInput = parse_quote! { enum Kind { A, B } };
        assert!(derive_fields_impl(&enumeration).is_err());
    }

    #[test]
    fn fields_reject_generics() {
        let input: DeriveInput = parse_quote! { struct Wrapper<T> { inner: T } };
        assert!(derive_fields_impl(&input).is_err());
    }

    #[test]
    fn fields_reject_unknown_doccrit_options() {
        let input: DeriveInput = parse_quote! {
            struct Book {
                #[doccrit(index)]
                title: String,
            }
        };
        assert!(derive_fields_impl(&input).is_err());
    }

    #[test]
    fn entity_with_collection() {
        let input: DeriveInput = parse_quote! {
            #[entity(collection = "books")]
            struct Book { title: String }
        };

        let code = derive_entity_impl(&input).unwrap().to_string();
        assert!(code.contains("Entity for Book"));
        assert!(code.contains("\"books\""));
    }

    #[test]
    fn entity_without_collection_uses_default() {
        let input: DeriveInput = parse_quote! { struct Book { title: String } };

        let code = derive_entity_impl(&input).unwrap().to_string();
        assert!(code.contains("Entity for Book"));
        assert!(!code.contains("collection_name"));
    }
}
