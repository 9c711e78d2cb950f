//! Helper macros for ABI function generation.
//!
//! `abi_fn!` generates the `#[unsafe(no_mangle)] pub unsafe extern "C" fn`
//! wrappers for the `__asan_*` entry points. Fatal entry points use the
//! `-> !` form.

/// Generate an exported extern "C" function.
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn __asan_example(addr: usize) -> u8 {
///         // implementation body
///     }
/// }
/// ```
macro_rules! abi_fn {
    // Diverging entry point.
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> !
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> ! {
            unsafe { $body }
        }
    };

    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };

    // Variant without return type (returns ())
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };
}

#[allow(unused_imports)]
pub(crate) use abi_fn;
