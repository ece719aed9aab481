
use proc_macro::TokenStream;

/// Runs the annotated `fn(TestEnv)` once per RNG seed, each with its own `TestEnv` and tracing subscriber.
///
/// Seeds are `0..PEGGY_TEST_SAMPLES` (default 1), or just `PEGGY_TEST_RNG_SEED` if that is set.
#[proc_macro_attribute]
pub fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    test::test_macro(args.into(), item.into()).into()
}
