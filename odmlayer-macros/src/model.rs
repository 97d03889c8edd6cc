use proc_macro2::{Group, TokenStream};
use quote::quote;
use syn::{
    DataStruct, DeriveInput, Field, Fields, GenericArgument, Lit, LitStr, Path, PathArguments,
    Result, Token, Type, meta::ParseNestedMeta,
};

struct ModelOptions {
    name: String,
    collection: Option<String>,
    connection: Option<String>,
    manual: bool,
    krate: Path,
    rename_all: Option<RenameRule>,
}

/// Container-level `#[serde(rename_all = "...")]` rule applied to field names.
#[derive(Clone, Copy)]
enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(rule: &str) -> Option<Self> {
        Some(match rule {
            "lowercase" | "snake_case" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            _ => return None,
        })
    }

    /// Applies the rule to a snake_case field name.
    fn apply(self, field: &str) -> String {
        match self {
            RenameRule::Lower => field.to_string(),
            RenameRule::Upper | RenameRule::ScreamingSnake => field.to_ascii_uppercase(),
            RenameRule::Pascal => pascal_case(field),
            RenameRule::Camel => {
                let pascal = pascal_case(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            RenameRule::Kebab => field.replace('_', "-"),
            RenameRule::ScreamingKebab => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

fn pascal_case(field: &str) -> String {
    let mut pascal = String::with_capacity(field.len());
    let mut capitalize = true;

    for ch in field.chars() {
        if ch == '_' {
            capitalize = true;
        } else if capitalize {
            pascal.push(ch.to_ascii_uppercase());
            capitalize = false;
        } else {
            pascal.push(ch);
        }
    }

    pascal
}

struct FieldOptions {
    display_name: String,
    key: Option<String>,
    object_id: bool,
    number: bool,
    value: Option<Lit>,
}

pub(crate) fn generate_model_for_struct(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    if !ast.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &ast.generics,
            "Model cannot be derived for generic structs",
        ));
    }

    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &ast.ident,
            "Model can only be derived for structs with named fields",
        ));
    };

    let options = parse_model_options(ast)?;
    let krate = &options.krate;

    let mut descriptors = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        if let Some(field_options) = parse_field_options(field, options.rename_all)? {
            descriptors.push(descriptor_tokens(krate, field, &field_options));
        }
    }

    let name = &ast.ident;
    let model_name = &options.name;
    let collection = options
        .collection
        .as_ref()
        .map(|collection| quote! { .collection(#collection) });
    let connection = options
        .connection
        .as_ref()
        .map(|connection| quote! { .connection(#connection) });
    let transform = if options.manual {
        quote! { #krate::metadata::TransformMode::Manual }
    } else {
        quote! { #krate::metadata::TransformMode::Automatic }
    };

    Ok(quote! {
        impl #krate::model::Model for #name {
            fn model_name() -> &'static str {
                #model_name
            }

            fn metadata() -> &'static #krate::metadata::ModelMetadata {
                static METADATA: ::std::sync::OnceLock<#krate::metadata::ModelMetadata> =
                    ::std::sync::OnceLock::new();

                METADATA.get_or_init(|| {
                    #krate::metadata::ModelMetadata::builder(#model_name)
                        #collection
                        #connection
                        .transform(#transform)
                        #(.field(#descriptors))*
                        .build()
                })
            }
        }
    })
}

fn parse_model_options(ast: &DeriveInput) -> Result<ModelOptions> {
    let mut options = ModelOptions {
        name: ast.ident.to_string(),
        collection: None,
        connection: None,
        manual: false,
        krate: syn::parse_quote!(::odmlayer),
        rename_all: None,
    };

    for attr in &ast.attrs {
        if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    if !meta.input.peek(Token![=]) {
                        return Err(meta.error(
                            "separate serialize and deserialize rename_all rules are not supported",
                        ));
                    }

                    let rule = string_value(&meta)?;
                    options.rename_all = Some(
                        RenameRule::parse(&rule)
                            .ok_or_else(|| meta.error(format!("unknown rename_all rule {rule:?}")))?,
                    );
                } else {
                    skip_meta(&meta)?;
                }

                Ok(())
            })?;
            continue;
        }

        if !attr.path().is_ident("model") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                options.name = string_value(&meta)?;
            } else if meta.path.is_ident("collection") {
                options.collection = Some(string_value(&meta)?);
            } else if meta.path.is_ident("connection") {
                options.connection = Some(string_value(&meta)?);
            } else if meta.path.is_ident("transform") {
                options.manual = match string_value(&meta)?.as_str() {
                    "automatic" => false,
                    "manual" => true,
                    _ => return Err(meta.error("transform must be \"automatic\" or \"manual\"")),
                };
            } else if meta.path.is_ident("crate") {
                let path: LitStr = meta.value()?.parse()?;
                options.krate = path.parse()?;
            } else {
                return Err(meta.error("unknown model attribute"));
            }

            Ok(())
        })?;
    }

    Ok(options)
}

/// Returns `None` for fields serde skips entirely.
fn parse_field_options(field: &Field, rename_all: Option<RenameRule>) -> Result<Option<FieldOptions>> {
    let Some(ident) = &field.ident else {
        return Ok(None);
    };

    let name = ident.to_string().trim_start_matches("r#").to_string();
    let mut options = FieldOptions {
        display_name: rename_all.map_or_else(|| name.clone(), |rule| rule.apply(&name)),
        key: None,
        object_id: false,
        number: false,
        value: None,
    };
    let mut skipped = false;

    for attr in &field.attrs {
        if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    options.display_name = string_value(&meta)?;
                } else if meta.path.is_ident("skip") {
                    skipped = true;
                } else {
                    skip_meta(&meta)?;
                }

                Ok(())
            })?;
        } else if attr.path().is_ident("field") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    options.key = Some(string_value(&meta)?);
                } else if meta.path.is_ident("object_id") {
                    options.object_id = true;
                } else if meta.path.is_ident("number") {
                    options.number = true;
                } else if meta.path.is_ident("value") {
                    options.value = Some(meta.value()?.parse()?);
                } else {
                    return Err(meta.error("unknown field attribute"));
                }

                Ok(())
            })?;
        }
    }

    if options.object_id && options.number {
        return Err(syn::Error::new_spanned(
            field,
            "a field cannot be both object_id and number",
        ));
    }

    Ok(if skipped { None } else { Some(options) })
}

fn descriptor_tokens(krate: &Path, field: &Field, options: &FieldOptions) -> TokenStream {
    let display_name = &options.display_name;
    let key = options.key.as_deref().unwrap_or(display_name);

    let (field_type, coercion) = if options.object_id {
        (quote! { Identifier }, quote! { ObjectId })
    } else if options.number {
        (quote! { Number }, quote! { Number })
    } else {
        (infer_field_type(&field.ty), quote! { None })
    };

    let value = options
        .value
        .as_ref()
        .map(|value| quote! { .with_value(#value) });

    quote! {
        #krate::metadata::FieldDescriptor::new(
            #display_name,
            #key,
            #krate::metadata::FieldDetails::new(
                #krate::metadata::FieldType::#field_type,
                #krate::metadata::Coercion::#coercion,
            )
            #value,
        )
    }
}

/// Maps a Rust field type onto a storage field type, looking through `Option`.
fn infer_field_type(ty: &Type) -> TokenStream {
    match ty {
        Type::Reference(reference) => infer_field_type(&reference.elem),
        Type::Path(path) => {
            let Some(segment) = path.path.segments.last() else {
                return quote! { Any };
            };

            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(arguments) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = arguments.args.first() {
                        return infer_field_type(inner);
                    }
                }
            }

            match segment.ident.to_string().as_str() {
                "String" | "str" => quote! { String },
                "bool" => quote! { Boolean },
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
                | "u128" | "usize" | "f32" | "f64" => quote! { Number },
                "DateTime" => quote! { Date },
                "ObjectId" => quote! { Identifier },
                _ => quote! { Any },
            }
        }
        _ => quote! { Any },
    }
}

fn string_value(meta: &ParseNestedMeta) -> Result<String> {
    let value: LitStr = meta.value()?.parse()?;
    Ok(value.value())
}

/// Consumes a serde option this macro does not care about.
fn skip_meta(meta: &ParseNestedMeta) -> Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.input.parse::<Group>()?;
    }

    Ok(())
}
