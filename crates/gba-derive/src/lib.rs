mod ioreg;

use syn::{parse_macro_input, DeriveInput};

/// Derives typed accessors for a memory mapped I/O register.
///
/// The register struct must consist of a single integer field named `value`.
/// Each `#[field(...)]` attribute describes one named bit field:
///
/// ```ignore
/// #[derive(IoRegister, Copy, Clone)]
/// #[field(bg_mode: u16 = 0..=2)]
/// #[field(forced_blank: bool = 7)]
/// #[field(vblank_flag: readonly<bool> = 0)]
/// pub struct RegDispcnt {
///     value: u16,
/// }
/// ```
///
/// Bits covered by a `readonly<..>` field are masked out of bus writes, and
/// `writeonly<..>` bits are masked out of bus reads, via the generated
/// `IoRegister` trait impl.
#[proc_macro_derive(IoRegister, attributes(field))]
pub fn io_register_macro(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    ioreg::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
