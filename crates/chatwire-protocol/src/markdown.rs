//! Markdown-safety predicate shared by the relay and its clients.

/// Whether `text` currently ends inside a markdown token that should not be
/// flushed yet: a bold run (`**`, `***`), a divider (`---`), a heading
/// marker (`###`), a code fence, or an unfinished table row (a trailing `|`
/// followed only by whitespace or dashes).
///
/// The table rule also matches text that merely ends with a literal `|`.
pub fn needs_buffering(text: &str) -> bool {
    text.ends_with("**")
        || text.ends_with("---")
        || text.ends_with("###")
        || text.ends_with("```")
        || ends_with_open_table_row(text)
}

fn ends_with_open_table_row(text: &str) -> bool {
    text.trim_end_matches(|c: char| c.is_whitespace() || c == '-')
        .ends_with('|')
}
