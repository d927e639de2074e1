//! Fenced code block extraction

const FENCE: &str = "```";

/// Byte offset where the code of a leading fenced block starts.
///
/// Leading blank lines are skipped. The first non-blank line must be a bare
/// fence or a fence immediately followed by a single language tag; the code
/// starts on the line after it.
pub fn find_code_start(text: &str) -> Option<usize> {
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            offset += line.len();
            continue;
        }

        let tag = trimmed.strip_prefix(FENCE)?.trim_end();
        if tag.is_empty() || !tag.contains(char::is_whitespace) {
            return Some(offset + line.len());
        }
        return None;
    }

    None
}

/// The code inside a leading fenced block, if the text has one
pub fn extract_code_block(text: &str) -> Option<&str> {
    let start = find_code_start(text)?;
    let end = text[start..].find(FENCE)?;
    Some(&text[start..start + end])
}

/// The fenced code if present, otherwise the whole text
pub fn extract_or_verbatim(text: &str) -> &str {
    extract_code_block(text).unwrap_or(text)
}
