/// Rough token estimate: ~4 bytes per token. Good enough for deciding when
/// the history window needs compressing, without a tokenizer dependency.
pub fn count_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

pub fn count_characters(text: &str) -> usize {
    text.chars().count()
}
