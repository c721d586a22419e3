/// First `max_chars` characters of `text`, on a char boundary.
pub fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Last `max_chars` characters of `text`, on a char boundary.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Head and tail of a long blob, for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars * 2 {
        return text.to_string();
    }
    format!(
        "{} ...[{} chars omitted]... {}",
        head_chars(text, max_chars),
        total - max_chars * 2,
        tail_chars(text, max_chars)
    )
}
