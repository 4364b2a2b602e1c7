//! Prompt text utilities.

/// Room left after sentence-level truncation.
const SENTENCE_MARGIN: usize = 50;

/// Fit `prompt` within `max_chars` characters.
///
/// Whole sentences are kept while they fit in `max_chars - 50`. When that
/// leaves fewer than 50 characters the prompt is hard-cut and suffixed with
/// `...`. Lengths are counted in characters, not bytes.
pub fn truncate_prompt(prompt: &str, max_chars: usize) -> String {
    if prompt.chars().count() <= max_chars {
        return prompt.to_string();
    }

    let budget = max_chars.saturating_sub(SENTENCE_MARGIN);
    let mut truncated = String::new();
    let mut used = 0usize;
    for sentence in prompt.split('.') {
        let len = sentence.chars().count() + 1;
        if used + len > budget {
            break;
        }
        truncated.push_str(sentence);
        truncated.push('.');
        used += len;
    }

    if used < SENTENCE_MARGIN {
        let cut: String = prompt.chars().take(max_chars.saturating_sub(3)).collect();
        truncated = format!("{cut}...");
    }

    truncated.trim().to_string()
}
