extern crate proc_macro;

use syn;

/// Assigns a struct a stable, process-wide `SensorKind` id the first time it is
/// acquired, and registers its name so the sensor registry can report readable
/// diagnostics for unknown-kind errors.
#[proc_macro_derive(SensorPayload)]
pub fn derive_sensor_payload(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast: syn::DeriveInput = syn::parse(item).unwrap();
    derive_core(&ast.ident.to_string())
}

fn derive_core(struct_name: &str) -> proc_macro::TokenStream {
    let static_mod = format!("__{}SensorKindModule", struct_name.to_uppercase());
    let static_id = format!("__{}_KIND", struct_name.to_uppercase());

    let tokens = format!(
        r###"
        mod {static_mod} {{
            use super::SensorKind;

            pub(crate) static mut {static_id}: SensorKind = SensorKind {{ id: 0 }};
        }}

        impl SensorPayload for {struct_name} {{
            #[inline]
            fn acquire_kind() -> SensorKind {{
                unsafe {{
                    let counter = SensorKind::name_table().len();
                    {static_mod}::{static_id} = SensorKind::new(counter);
                    SensorKind::name_table().push("{struct_name}");
                    {static_mod}::{static_id}
                }}
            }}

            #[inline]
            fn kind() -> SensorKind {{
                unsafe {{ {static_mod}::{static_id} }}
            }}
        }}"###,
        static_mod = static_mod,
        static_id = static_id,
        struct_name = struct_name,
    );

    tokens.parse().unwrap()
}
