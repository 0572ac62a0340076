//! Attribute macros running an `async fn` on a fresh strand event loop.

mod utils;

use proc_macro::{TokenStream, TokenTree};

/// Runs an `async fn main` on a new event loop.
///
/// Accepts `offload_threads = N` to size the worker pool used by
/// `spawn_blocking`.
///
/// ```rust,ignore
/// #[strand::main(offload_threads = 2)]
/// async fn main() {
///     let handle = strand::Handle::current();
///     let digest = handle.spawn_blocking(|| checksum("data.bin")).await;
///     println!("{digest:?}");
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    utils::strip_async(&mut tokens);

    let Some(pos) = utils::body_position(&tokens) else {
        return utils::compile_error("#[strand::main] expects a function");
    };

    let builder = utils::loop_builder(utils::offload_threads(&attr));
    if let Err(message) = utils::wrap_body(&mut tokens, pos, &builder) {
        return utils::compile_error(&message);
    }

    tokens.into_iter().collect()
}

/// Runs an `async fn` test on its own event loop.
///
/// The test may return a `Result`; the body's value is returned as is.
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    utils::strip_async(&mut tokens);

    let Some(pos) = utils::body_position(&tokens) else {
        return utils::compile_error("#[strand::test] expects a function");
    };

    if let Err(message) = utils::wrap_body(&mut tokens, pos, &utils::loop_builder(None)) {
        return utils::compile_error(&message);
    }

    let mut result: Vec<TokenTree> = "#[::core::prelude::v1::test]"
        .parse::<TokenStream>()
        .map(|attr| attr.into_iter().collect())
        .unwrap_or_default();
    result.extend(tokens);

    result.into_iter().collect()
}
