use proc_macro::{Delimiter, TokenStream, TokenTree};

/// Removes the `async` keyword from a function signature.
///
/// The generated body drives the future itself, so the item becomes a
/// plain synchronous function.
pub(crate) fn strip_async(tokens: &mut Vec<TokenTree>) {
    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }
}

/// Returns the position of the function body, the last brace group.
pub(crate) fn body_position(tokens: &[TokenTree]) -> Option<usize> {
    tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
}

/// Parses `offload_threads = N` out of the attribute arguments.
///
/// Unknown keys are ignored.
pub(crate) fn offload_threads(attr: &TokenStream) -> Option<usize> {
    let attr = attr.to_string();

    attr.split(',').find_map(|part| {
        let value = part.trim().strip_prefix("offload_threads")?;
        value.trim().strip_prefix('=')?.trim().parse::<usize>().ok()
    })
}

/// Builds the expression creating the event loop.
pub(crate) fn loop_builder(offload_threads: Option<usize>) -> String {
    let mut builder = String::from("::strand::LoopBuilder::new()");

    if let Some(n) = offload_threads {
        builder.push_str(&format!(".offload_threads({n})"));
    }

    builder.push_str(".build().expect(\"failed to build the event loop\")");
    builder
}

/// Replaces the body at `pos` with one driving it on `builder`.
pub(crate) fn wrap_body(tokens: &mut [TokenTree], pos: usize, builder: &str) -> Result<(), String> {
    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => return Err("expected a function body".into()),
    };

    let new_block = format!(
        "{{
            let event_loop = {builder};
            event_loop.block_on(async move {{ {block} }})
        }}"
    );

    let stream = new_block
        .parse::<TokenStream>()
        .map_err(|e| format!("failed to expand function body: {e}"))?;

    tokens[pos] = TokenTree::Group(proc_macro::Group::new(Delimiter::Brace, stream));
    Ok(())
}

/// Emits a `compile_error!` carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
