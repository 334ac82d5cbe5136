use unicode_segmentation::UnicodeSegmentation;

/// Cuts `value` to at most `limit` graphemes, ending in an ellipsis when cut.
pub fn truncate(value: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    let graphemes: Vec<&str> = UnicodeSegmentation::graphemes(value, true).collect();
    if graphemes.len() <= limit {
        return value.to_string();
    }
    let mut truncated = graphemes[..limit - 1].concat();
    truncated.push('…');
    truncated
}

/// Like [`truncate`], but `limit` counts chars. Cuts on grapheme boundaries,
/// so the result may be shorter than `limit`.
pub fn truncate_chars(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let mut truncated = String::new();
    let mut used = 0;
    for grapheme in UnicodeSegmentation::graphemes(value, true) {
        let width = grapheme.chars().count();
        if used + width > limit - 1 {
            break;
        }
        truncated.push_str(grapheme);
        used += width;
    }
    truncated.push('…');
    truncated
}

pub fn truncate_opt(value: Option<&str>, limit: usize) -> Option<String> {
    value.map(|value| truncate(value, limit))
}
