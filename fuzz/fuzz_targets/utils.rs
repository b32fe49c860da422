/// Inputs beyond this size only slow the fuzzer down.
pub const MAX_INPUT_SIZE: usize = 64 * 1024;

/// The longest valid UTF-8 prefix of `data`, capped at `MAX_INPUT_SIZE`.
pub fn input_text(data: &[u8]) -> &str {
    let capped = &data[..data.len().min(MAX_INPUT_SIZE)];
    match std::str::from_utf8(capped) {
        Ok(text) => text,
        Err(err) => std::str::from_utf8(&capped[..err.valid_up_to()]).unwrap_or_default(),
    }
}
