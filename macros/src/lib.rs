use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitInt, parse_macro_input};

/// Busy-wait calibration for the CPU frequencies the crate ships with:
/// `(cpu_hz, floor_us, overhead_cycles, loop_cycles)`.
const KNOWN_CALIBRATIONS: &[(u32, u16, u16, u8)] = &[
    (1_000_000, 25, 22, 4),
    (8_000_000, 2, 16, 4),
    (12_000_000, 1, 20, 4),
    (16_000_000, 1, 20, 4),
    (20_000_000, 1, 28, 4),
    (24_000_000, 0, 20, 4),
];

#[derive(Default)]
struct TierArgs {
    cpu_hz: Option<u32>,
    prescaler: Option<u16>,
    counter_top: Option<u16>,
    floor_us: Option<u16>,
    overhead_cycles: Option<u16>,
    loop_cycles: Option<u8>,
}

/// Derives `ClockConfig` for a unit struct describing one CPU-frequency tier.
///
/// # Example
///
/// ```ignore
/// use tickclock::ClockTier;
///
/// #[derive(ClockTier)]
/// #[clock(cpu_hz = 16_000_000)]
/// pub struct Board16;
///
/// #[derive(ClockTier)]
/// #[clock(cpu_hz = 4_000_000, prescaler = 64, floor_us = 6, overhead_cycles = 20, loop_cycles = 4)]
/// pub struct Board4;
/// ```
///
/// `prescaler` defaults to 64 and `counter_top` to 255 (an 8-bit timer in
/// overflow mode). The busy-wait calibration (`floor_us`, `overhead_cycles`,
/// `loop_cycles`) may be omitted for the built-in frequencies
/// (1, 8, 12, 16, 20 and 24 MHz) and is required for anything else.
///
/// # Requirements
///
/// - The type must be a unit struct
/// - `cpu_hz` must be a whole number of megahertz
/// - `prescaler` must be one of 1, 8, 64, 256, 1024
///
/// Every tier also gets a `const` item that evaluates the derived tick rate
/// and calibration, so a tier that cannot be represented fails the build.
#[proc_macro_derive(ClockTier, attributes(clock))]
pub fn derive_clock_tier(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    match &input.data {
        Data::Struct(data) if matches!(data.fields, Fields::Unit) => {}
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "ClockTier can only be derived for unit structs",
            ));
        }
    }

    let args = parse_args(input)?;

    let cpu_hz = args.cpu_hz.ok_or_else(|| {
        syn::Error::new_spanned(input, "missing #[clock(cpu_hz = ...)] attribute")
    })?;
    if cpu_hz == 0 || cpu_hz % 1_000_000 != 0 {
        return Err(syn::Error::new_spanned(
            input,
            format!("cpu_hz = {cpu_hz} is not a whole number of MHz"),
        ));
    }

    let prescaler = args.prescaler.unwrap_or(64);
    let variant = match prescaler {
        1 => quote!(Div1),
        8 => quote!(Div8),
        64 => quote!(Div64),
        256 => quote!(Div256),
        1024 => quote!(Div1024),
        other => {
            return Err(syn::Error::new_spanned(
                input,
                format!("unsupported prescaler {other}; expected 1, 8, 64, 256 or 1024"),
            ));
        }
    };

    let counter_top = args.counter_top.unwrap_or(255);

    let known = KNOWN_CALIBRATIONS.iter().find(|entry| entry.0 == cpu_hz);
    let (floor_us, overhead_cycles, loop_cycles) =
        match (args.floor_us, args.overhead_cycles, args.loop_cycles, known) {
            (Some(f), Some(o), Some(l), _) => (f, o, l),
            (f, o, l, Some(&(_, kf, ko, kl))) => (f.unwrap_or(kf), o.unwrap_or(ko), l.unwrap_or(kl)),
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    format!(
                        "no busy-wait calibration for {cpu_hz} Hz; built-in tiers are \
                         1, 8, 12, 16, 20 and 24 MHz, otherwise give floor_us, \
                         overhead_cycles and loop_cycles"
                    ),
                ));
            }
        };

    Ok(quote! {
        impl tickclock::config::ClockConfig for #name {
            const CPU_HZ: u32 = #cpu_hz;
            const PRESCALER: tickclock::hw::Prescaler = tickclock::hw::Prescaler::#variant;
            const COUNTER_TOP: u16 = #counter_top;
            const CALIBRATION: tickclock::config::Calibration =
                tickclock::config::Calibration::new(#floor_us, #overhead_cycles, #loop_cycles);
        }

        const _: () = tickclock::config::assert_valid::<#name>();
    })
}

fn parse_args(input: &DeriveInput) -> syn::Result<TierArgs> {
    let mut args = TierArgs::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("clock")) {
        attr.parse_nested_meta(|meta| {
            let key = meta
                .path
                .get_ident()
                .map(|ident| ident.to_string())
                .unwrap_or_default();
            let lit: LitInt = meta.value()?.parse()?;
            match key.as_str() {
                "cpu_hz" => args.cpu_hz = Some(lit.base10_parse()?),
                "prescaler" => args.prescaler = Some(lit.base10_parse()?),
                "counter_top" => args.counter_top = Some(lit.base10_parse()?),
                "floor_us" => args.floor_us = Some(lit.base10_parse()?),
                "overhead_cycles" => args.overhead_cycles = Some(lit.base10_parse()?),
                "loop_cycles" => args.loop_cycles = Some(lit.base10_parse()?),
                _ => return Err(meta.error(format!("unknown clock attribute `{key}`"))),
            }
            Ok(())
        })?;
    }

    Ok(args)
}
