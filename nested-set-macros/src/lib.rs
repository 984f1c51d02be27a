use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, Type};

#[proc_macro_derive(NestedSetModel, attributes(nested_set))]
pub fn derive_nested_set_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_nested_set_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    id_field: Option<String>,
    id_type: Option<Type>,
    parent_field: Option<String>,
    left_field: Option<String>,
    right_field: Option<String>,
    depth_field: Option<String>,
    entity_name: Option<String>,
    lock_key: Option<String>,
    advisory_lock: Option<bool>,
    verify_writes: Option<bool>,
}

fn impl_nested_set_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "NestedSetModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("nested_set") {
            parse_nested_set_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    if options.lock_key.is_some() && options.advisory_lock == Some(false) {
        return Err(syn::Error::new(
            struct_ident.span(),
            "`lock_key` cannot be combined with `advisory_lock = false`",
        ));
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let parent_field_name = options
        .parent_field
        .unwrap_or_else(|| "parent_id".to_string());
    let left_field_name = options.left_field.unwrap_or_else(|| "left".to_string());
    let right_field_name = options.right_field.unwrap_or_else(|| "right".to_string());
    let depth_field_name = options.depth_field.unwrap_or_else(|| "depth".to_string());

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let parent_field_ident = Ident::new(&parent_field_name, struct_ident.span());
    let left_field_ident = Ident::new(&left_field_name, struct_ident.span());
    let right_field_ident = Ident::new(&right_field_name, struct_ident.span());
    let depth_field_ident = Ident::new(&depth_field_name, struct_ident.span());

    let mut id_field_type: Option<Type> = options.id_type.clone();
    let mut seen = Vec::new();

    if let Fields::Named(ref fields) = data_struct.fields {
        for field in &fields.named {
            if let Some(ident) = &field.ident {
                if ident == &id_field_ident && id_field_type.is_none() {
                    id_field_type = Some(field.ty.clone());
                }
                seen.push(ident.unraw().to_string());
            }
        }
    } else {
        return Err(syn::Error::new(
            data_struct.fields.span(),
            "NestedSetModel requires named fields",
        ));
    }

    for required in [
        &parent_field_name,
        &left_field_name,
        &right_field_name,
        &depth_field_name,
    ] {
        if !seen.iter().any(|name| name == required) {
            return Err(syn::Error::new(
                struct_ident.span(),
                format!("NestedSetModel requires a `{required}` field"),
            ));
        }
    }

    let id_type = id_field_type.ok_or_else(|| {
        syn::Error::new(
            struct_ident.span(),
            "Unable to determine id field type; specify `id_type = ...` in #[nested_set]",
        )
    })?;

    let table = table_name.unwrap_or_else(|| struct_ident.unraw().to_string());
    // SeaORM structs are all `Model`; the table name is the only distinguishing default.
    let entity_name = options.entity_name.unwrap_or_else(|| table.clone());

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let parent_column_variant = format_ident!("{}", to_pascal_case(&parent_field_name));
    let left_column_variant = format_ident!("{}", to_pascal_case(&left_field_name));
    let right_column_variant = format_ident!("{}", to_pascal_case(&right_field_name));
    let depth_column_variant = format_ident!("{}", to_pascal_case(&depth_field_name));

    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());
    let table_literal = syn::LitStr::new(&table, struct_ident.span());

    let lock_option = match (options.lock_key, options.advisory_lock) {
        (Some(key), _) => {
            let key_literal = syn::LitStr::new(&key, struct_ident.span());
            quote! { .lock_key(#key_literal) }
        }
        (None, Some(false)) => quote! {
            .advisory_lock_strategy(::nested_set::AdvisoryLockStrategy::Disabled)
        },
        (None, _) => quote! {},
    };
    let verify_option = match options.verify_writes {
        Some(verify) => quote! { .verify_writes(#verify) },
        None => quote! {},
    };

    let generated = quote! {
        impl ::nested_set::NestedSetModel for #struct_ident {
            type Entity = Entity;
            type ActiveModel = ActiveModel;
            type Id = #id_type;

            fn nested_set_config() -> &'static ::nested_set::NestedSetConfig {
                static CONFIG: ::nested_set::__private::Lazy<::nested_set::NestedSetConfig> =
                    ::nested_set::__private::Lazy::new(|| {
                        let base = ::nested_set::NestedSetConfig::new(
                            #entity_name_literal,
                            #table_literal,
                        );
                        ::nested_set::NestedSetOptions::default()
                            #lock_option
                            #verify_option
                            .apply(base)
                    });
                &CONFIG
            }

            fn id(&self) -> Self::Id {
                self.#id_field_ident.clone()
            }

            fn parent_id(&self) -> Option<Self::Id> {
                self.#parent_field_ident.clone()
            }

            fn left(&self) -> i32 {
                self.#left_field_ident
            }

            fn right(&self) -> i32 {
                self.#right_field_ident
            }

            fn depth(&self) -> i32 {
                self.#depth_field_ident
            }

            fn set_parent(active: &mut Self::ActiveModel, parent: Option<Self::Id>) {
                active.#parent_field_ident = ::sea_orm::ActiveValue::Set(parent);
            }

            fn set_bounds(active: &mut Self::ActiveModel, left: i32, right: i32, depth: i32) {
                active.#left_field_ident = ::sea_orm::ActiveValue::Set(left);
                active.#right_field_ident = ::sea_orm::ActiveValue::Set(right);
                active.#depth_field_ident = ::sea_orm::ActiveValue::Set(depth);
            }

            fn id_to_value(id: &Self::Id) -> ::sea_orm::Value {
                ::sea_orm::Value::from(id.clone())
            }

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn parent_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#parent_column_variant
            }

            fn left_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#left_column_variant
            }

            fn right_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#right_column_variant
            }

            fn depth_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#depth_column_variant
            }
        }
    };

    Ok(generated.into())
}

fn parse_nested_set_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        match ident.as_str() {
            "id_field" => options.id_field = Some(parse_string(&meta)?),
            "parent_field" => options.parent_field = Some(parse_string(&meta)?),
            "left_field" => options.left_field = Some(parse_string(&meta)?),
            "right_field" => options.right_field = Some(parse_string(&meta)?),
            "depth_field" => options.depth_field = Some(parse_string(&meta)?),
            "entity_name" => options.entity_name = Some(parse_string(&meta)?),
            "lock_key" => options.lock_key = Some(parse_string(&meta)?),
            "advisory_lock" => {
                let value: syn::LitBool = meta.value()?.parse()?;
                options.advisory_lock = Some(value.value());
            }
            "verify_writes" => {
                let value: syn::LitBool = meta.value()?.parse()?;
                options.verify_writes = Some(value.value());
            }
            "id_type" => {
                let ty: Type = meta.value()?.parse()?;
                options.id_type = Some(ty);
            }
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported nested_set option `{other}`"),
                ));
            }
        }

        Ok(())
    })
}

fn parse_string(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: syn::LitStr = meta.value()?.parse()?;
    Ok(value.value())
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
