use proc_macro2::{Literal, TokenStream};
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    Data, DeriveInput, GenericArgument, Ident, LitInt, PathArguments, Token, Type, TypePath,
};

bitflags::bitflags! {
    #[derive(Clone, Copy)]
    struct Access: u8 {
        const READ = 0x1;
        const WRITE = 0x2;
    }
}

const INT_TYPES: [(&str, u32); 5] = [
    ("u8", 8),
    ("u16", 16),
    ("u32", 32),
    ("u64", 64),
    ("u128", 128),
];

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;

    let Data::Struct(ref data) = input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "IoRegister can only be derived for structs",
        ));
    };

    let mut fields = data.fields.iter();
    let value_field = match (fields.next(), fields.next()) {
        (Some(field), None) if field.ident.as_ref().is_some_and(|ident| ident == "value") => field,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "structs deriving IoRegister must have a single field named `value`",
            ));
        }
    };

    let value_type = &value_field.ty;
    let value_bits = int_type_bits(value_type).ok_or_else(|| {
        syn::Error::new_spanned(value_type, "the `value` field must be an unsigned integer")
    })?;

    let mut read_mask = u128_mask(value_bits);
    let mut write_mask = u128_mask(value_bits);
    let mut accessors = TokenStream::new();

    for attr in &input.attrs {
        if !attr.path().is_ident("field") {
            continue;
        }

        let field: RegisterField = attr.parse_args()?;

        if field.hi >= value_bits {
            return Err(syn::Error::new_spanned(
                attr,
                "field bit range does not fit in the `value` type",
            ));
        }

        let field_mask = (u128_mask(field.hi - field.lo + 1)) << field.lo;
        if !field.access.contains(Access::READ) {
            read_mask &= !field_mask;
        }
        if !field.access.contains(Access::WRITE) {
            write_mask &= !field_mask;
        }

        accessors.extend(field.getter(value_type));
        accessors.extend(field.setter(value_type));
    }

    let read_mask = Literal::u128_unsuffixed(read_mask);
    let write_mask = Literal::u128_unsuffixed(write_mask);

    Ok(quote! {
        impl #name {
            pub const fn new(value: #value_type) -> Self {
                Self { value }
            }

            #accessors
        }

        impl Default for #name {
            fn default() -> Self {
                Self::new(0)
            }
        }

        impl crate::memory::IoRegister<#value_type> for #name {
            #[inline]
            fn read(self) -> #value_type {
                self.value & #read_mask
            }

            #[inline]
            fn write(&mut self, value: #value_type) {
                self.value &= !#write_mask;
                self.value |= value & #write_mask;
            }
        }

        impl From<#value_type> for #name {
            #[inline]
            fn from(value: #value_type) -> Self {
                Self { value }
            }
        }

        impl From<#name> for #value_type {
            #[inline]
            fn from(register: #name) -> Self {
                register.value
            }
        }
    })
}

struct RegisterField {
    name: Ident,
    ty: Type,
    lo: u32,
    hi: u32,
    access: Access,
}

impl RegisterField {
    fn getter(&self, value_type: &Type) -> TokenStream {
        let name = &self.name;
        let ty = &self.ty;
        let (lo, hi) = (self.lo, self.hi);

        if is_bool(ty) {
            quote! {
                #[inline]
                pub fn #name(self) -> bool {
                    <#value_type as ::util::bits::BitOps>::bits(self.value, #lo, #hi) != 0
                }
            }
        } else if int_type_bits(ty).is_some() {
            quote! {
                #[inline]
                pub fn #name(self) -> #ty {
                    <#value_type as ::util::bits::BitOps>::bits(self.value, #lo, #hi) as #ty
                }
            }
        } else {
            quote! {
                #[inline]
                pub fn #name(self) -> #ty {
                    <#ty as From<#value_type>>::from(
                        <#value_type as ::util::bits::BitOps>::bits(self.value, #lo, #hi),
                    )
                }
            }
        }
    }

    fn setter(&self, value_type: &Type) -> TokenStream {
        let name = &self.name;
        let setter = Ident::new(&format!("set_{name}"), self.name.span());
        let ty = &self.ty;
        let (lo, hi) = (self.lo, self.hi);

        if is_bool(ty) || int_type_bits(ty).is_some() {
            quote! {
                #[inline]
                pub fn #setter(&mut self, value: #ty) {
                    self.value = <#value_type as ::util::bits::BitOps>::with_bits(
                        self.value, #lo, #hi, value as #value_type,
                    );
                }
            }
        } else {
            quote! {
                #[inline]
                pub fn #setter(&mut self, value: #ty) {
                    let value = <#value_type as From<#ty>>::from(value);
                    self.value = <#value_type as ::util::bits::BitOps>::with_bits(
                        self.value, #lo, #hi, value,
                    );
                }
            }
        }
    }
}

impl Parse for RegisterField {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        input.parse::<Token![:]>()?;

        let mut access = Access::READ | Access::WRITE;
        let ty = unwrap_access_marker(input.parse()?, &mut access)?;

        input.parse::<Token![=]>()?;
        let lo_lit: LitInt = input.parse()?;
        let lo: u32 = lo_lit.base10_parse()?;

        let hi = if input.peek(Token![..=]) {
            input.parse::<Token![..=]>()?;
            let hi_lit: LitInt = input.parse()?;
            hi_lit.base10_parse()?
        } else {
            lo
        };

        if hi < lo {
            return Err(syn::Error::new(lo_lit.span(), "empty field bit range"));
        }

        Ok(RegisterField {
            name,
            ty,
            lo,
            hi,
            access,
        })
    }
}

/// Strips a `readonly<T>` / `writeonly<T>` wrapper, recording the access it
/// implies, and returns the inner field type.
fn unwrap_access_marker(ty: Type, access: &mut Access) -> syn::Result<Type> {
    let Type::Path(TypePath { qself: None, ref path }) = ty else {
        return Ok(ty);
    };

    if path.segments.len() != 1 {
        return Ok(ty);
    }

    let segment = path.segments.first().unwrap();
    let removed = if segment.ident == "readonly" {
        Access::WRITE
    } else if segment.ident == "writeonly" {
        Access::READ
    } else {
        return Ok(ty);
    };

    let PathArguments::AngleBracketed(ref args) = segment.arguments else {
        return Err(syn::Error::new_spanned(
            segment,
            "expected readonly<T> or writeonly<T>",
        ));
    };

    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => {
            access.remove(removed);
            Ok(inner.clone())
        }
        _ => Err(syn::Error::new_spanned(
            args,
            "expected a single type argument",
        )),
    }
}

fn is_bool(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.path.is_ident("bool"))
}

fn int_type_bits(ty: &Type) -> Option<u32> {
    let Type::Path(path) = ty else {
        return None;
    };

    INT_TYPES
        .iter()
        .find(|(name, _)| path.path.is_ident(name))
        .map(|&(_, bits)| bits)
}

fn u128_mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1 << bits) - 1
    }
}
