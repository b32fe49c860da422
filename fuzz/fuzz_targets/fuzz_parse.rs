#![no_main]

use libfuzzer_sys::fuzz_target;

mod utils;

fuzz_target!(|data: &[u8]| {
    let text = utils::input_text(data);

    // Malformed input must produce errors, never a panic or a hang.
    let _ = hoist_syntax::lex(text);
    let result = hoist_syntax::parse(text);
    for error in &result.errors {
        assert!(error.range.end <= text.len());
    }
});
