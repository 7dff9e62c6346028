//! Text normalization and chunking
//!
//! Normalization runs exactly once per submission, before any splitting, so
//! chunk boundaries stay stable across modes.

/// Collapse whitespace runs to single spaces and strip control characters.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() {
                pending_space = true;
            }
            continue;
        }
        if ch.is_control() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

/// Split normalized text into chunks of at most `max_chars` characters.
///
/// Splits at sentence boundaries (inclusive of `.`, `!`, `?`); a single
/// sentence longer than the budget falls back to word boundaries. A single
/// word longer than the budget becomes its own chunk rather than being
/// broken mid-word. Joining the chunks with single spaces reproduces the
/// input's word sequence exactly.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    // The budget is in characters; byte length diverges on non-ASCII text.
    let mut current_chars = 0usize;

    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let sentence_chars = sentence.chars().count();

        if sentence_chars > max_chars {
            // Oversized sentence: flush what we have, then pack words.
            flush(&mut chunks, &mut current, &mut current_chars);
            for word in sentence.split_whitespace() {
                let word_chars = word.chars().count();
                if current_chars != 0 && current_chars + 1 + word_chars > max_chars {
                    flush(&mut chunks, &mut current, &mut current_chars);
                }
                if current_chars != 0 {
                    current.push(' ');
                    current_chars += 1;
                }
                current.push_str(word);
                current_chars += word_chars;
            }
            flush(&mut chunks, &mut current, &mut current_chars);
            continue;
        }

        if current_chars != 0 && current_chars + 1 + sentence_chars > max_chars {
            flush(&mut chunks, &mut current, &mut current_chars);
        }
        if current_chars != 0 {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(sentence);
        current_chars += sentence_chars;
    }

    flush(&mut chunks, &mut current, &mut current_chars);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_chars: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
        *current_chars = 0;
    }
}
