//! `#[derive(PropertyStore)]`: generates a `PropertyKey` enum and an
//! `rtc_agent::property::PropertyStore` implementation from a struct of
//! `rtc_agent::property::Property<T>` fields.
//!
//! Grounded on the teacher's satellite proc-macro crates (`case_macros`,
//! `online_config`'s derive): a small, single-purpose macro crate next to
//! the hand-written core, rather than a monolithic build-script step.
//! Fields not annotated with `#[property(...)]` are left untouched (they
//! may hold agent-internal state such as a logger handle) and are not
//! part of the generated key set.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, Lit, PathArguments, Type};

struct PropertyField {
    ident: syn::Ident,
    variant: syn::Ident,
    inner_ty: Type,
    mode: Mode,
}

#[derive(Clone, Copy)]
enum Mode {
    R,
    W,
    Rw,
}

impl Mode {
    fn parse(s: &str) -> Mode {
        match s {
            "r" => Mode::R,
            "w" => Mode::W,
            _ => Mode::Rw,
        }
    }

    fn access_mode_variant(self) -> proc_macro2::TokenStream {
        match self {
            Mode::R => quote!(rtc_agent::property::AccessMode::Readable),
            Mode::W => quote!(rtc_agent::property::AccessMode::Writable),
            Mode::Rw => quote!(rtc_agent::property::AccessMode::ReadWrite),
        }
    }
}

fn property_mode(attrs: &[syn::Attribute]) -> Option<Mode> {
    for attr in attrs {
        if !attr.path().is_ident("property") {
            continue;
        }
        let mut mode = Mode::Rw;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("mode") {
                let value = meta.value()?;
                let lit: Lit = value.parse()?;
                if let Lit::Str(s) = lit {
                    mode = Mode::parse(&s.value());
                }
            }
            Ok(())
        });
        return Some(mode);
    }
    None
}

fn inner_type_of_property(ty: &Type) -> Option<Type> {
    if let Type::Path(p) = ty {
        let seg = p.path.segments.last()?;
        if seg.ident != "Property" {
            return None;
        }
        if let PathArguments::AngleBracketed(args) = &seg.arguments {
            if let Some(GenericArgument::Type(t)) = args.args.first() {
                return Some(t.clone());
            }
        }
    }
    None
}

fn to_pascal_case(ident: &syn::Ident) -> syn::Ident {
    let s = ident.to_string();
    let mut out = String::with_capacity(s.len());
    let mut cap_next = true;
    for ch in s.chars() {
        if ch == '_' {
            cap_next = true;
            continue;
        }
        if cap_next {
            out.extend(ch.to_uppercase());
            cap_next = false;
        } else {
            out.push(ch);
        }
    }
    syn::Ident::new(&out, ident.span())
}

/// See module docs.
#[proc_macro_derive(PropertyStore, attributes(property))]
pub fn derive_property_store(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let struct_name = input.ident.clone();

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => panic!("PropertyStore can only be derived for structs with named fields"),
        },
        _ => panic!("PropertyStore can only be derived for structs"),
    };

    let mut props = Vec::new();
    for f in fields {
        let Some(mode) = property_mode(&f.attrs) else {
            continue;
        };
        let ident = f.ident.clone().expect("named field");
        let inner_ty = inner_type_of_property(&f.ty)
            .unwrap_or_else(|| panic!("field `{ident}` annotated #[property] must have type Property<T>"));
        let variant = to_pascal_case(&ident);
        props.push(PropertyField {
            ident,
            variant,
            inner_ty,
            mode,
        });
    }

    let key_name = syn::Ident::new(&format!("{struct_name}Key"), Span::call_site());

    let variants: Vec<_> = props.iter().map(|p| &p.variant).collect();
    let field_name_strs: Vec<_> = props.iter().map(|p| p.ident.to_string()).collect();
    let field_idents: Vec<_> = props.iter().map(|p| &p.ident).collect();
    let access_modes: Vec<_> = props.iter().map(|p| p.mode.access_mode_variant()).collect();
    let inner_tys: Vec<_> = props.iter().map(|p| &p.inner_ty).collect();

    let keys_len = props.len();

    let expanded = quote! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum #key_name {
            #(#variants),*
        }

        impl rtc_agent::property::PropertyStore for #struct_name {
            type Key = #key_name;

            fn keys() -> &'static [Self::Key] {
                const KEYS: [#key_name; #keys_len] = [#(#key_name::#variants),*];
                &KEYS
            }

            fn key_name(key: Self::Key) -> rtc_agent::event::EventName {
                match key {
                    #(#key_name::#variants => rtc_agent::event::EventName::new(#field_name_strs)),*
                }
            }

            fn key_by_name(name: rtc_agent::event::EventName) -> Option<Self::Key> {
                match name.as_str() {
                    #(#field_name_strs => Some(#key_name::#variants),)*
                    _ => None,
                }
            }

            fn access_mode(key: Self::Key) -> rtc_agent::property::AccessMode {
                match key {
                    #(#key_name::#variants => #access_modes),*
                }
            }

            fn last_update_ns(&self, key: Self::Key) -> i64 {
                match key {
                    #(#key_name::#variants => self.#field_idents.last_update_ns()),*
                }
            }

            fn get(&self, key: Self::Key) -> Result<rtc_agent::property::PropertyValue, rtc_agent::error::PropertyError> {
                match key {
                    #(#key_name::#variants => Ok(self.#field_idents.get().clone().into())),*
                }
            }

            fn set(
                &mut self,
                key: Self::Key,
                value: rtc_agent::property::PropertyValue,
                now_ns: i64,
            ) -> Result<(), rtc_agent::error::PropertyError> {
                match key {
                    #(#key_name::#variants => {
                        if !<Self as rtc_agent::property::PropertyStore>::access_mode(key).is_writable() {
                            return Err(rtc_agent::error::PropertyError::PropertyAccess {
                                name: <Self as rtc_agent::property::PropertyStore>::key_name(key),
                                mode: "write",
                            });
                        }
                        let actual = value.type_name();
                        let typed: #inner_tys = value.try_into().map_err(|_| {
                            rtc_agent::error::PropertyError::PropertyType {
                                name: <Self as rtc_agent::property::PropertyStore>::key_name(key),
                                expected: stringify!(#inner_tys),
                                actual,
                            }
                        })?;
                        self.#field_idents.set(typed, now_ns);
                        Ok(())
                    }),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}
