// ============================================================
// Layer 4 — Sentence Segmenter
// ============================================================
// Splits review text into sentences. Cutting sentences into
// words is left to the tokenizer.
//
// Sentence boundaries:
//   a run of '.', '!' or '?' followed by whitespace (or end of
//   text), and any line break. Abbreviations are not special
//   cased; a stray split only produces a shorter sentence.

/// Split text into trimmed, non-empty sentence strings.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current   = String::new();
    let mut chars     = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }

        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            // Keep "?!" / "..." runs attached to their sentence
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                None                          => push_sentence(&mut sentences, &mut current),
                Some(n) if n.is_whitespace()  => push_sentence(&mut sentences, &mut current),
                _                             => {}
            }
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}
