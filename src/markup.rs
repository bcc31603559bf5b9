//! Structural markup stripping.
//!
//! Documents arrive as markdown; embeddings work better on plain
//! prose, so the pipeline strips structural markers before chunking.
//! This is intentionally lossy: only the visible text survives.

/// Strip markdown structure from `text`, keeping the readable content.
pub fn strip_markup(text: &str) -> String {
    let mut out_lines: Vec<String> = Vec::new();
    let mut in_code_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code_fence = !in_code_fence;
            continue;
        }
        if in_code_fence {
            // Code bodies stay verbatim; they often carry searchable content.
            out_lines.push(line.to_string());
            continue;
        }

        // Horizontal rules carry no text.
        if !trimmed.is_empty() && trimmed.chars().all(|c| c == '-' || c == '*' || c == '_') {
            if trimmed.len() >= 3 {
                continue;
            }
        }

        let without_block = strip_block_prefix(trimmed);
        let cleaned = strip_inline(&without_block);
        out_lines.push(cleaned);
    }

    let joined = out_lines.join("\n");
    collapse_blank_lines(&joined)
}

/// Remove leading heading/list/quote markers from a line.
fn strip_block_prefix(line: &str) -> String {
    let mut rest = line;

    while let Some(stripped) = rest.strip_prefix('>') {
        rest = stripped.trim_start();
    }

    if let Some(stripped) = rest.strip_prefix('#') {
        let mut heading = stripped;
        while let Some(next) = heading.strip_prefix('#') {
            heading = next;
        }
        return heading.trim_start().to_string();
    }

    for marker in ["- [ ] ", "- [x] ", "- ", "* ", "+ "] {
        if let Some(stripped) = rest.strip_prefix(marker) {
            return stripped.to_string();
        }
    }

    // Ordered list markers: "12. text".
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(stripped) = after.strip_prefix(". ") {
            return stripped.to_string();
        }
    }

    rest.to_string()
}

/// Remove inline emphasis, code spans, links and images.
fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' | '_' | '`' => {
                i += 1;
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '[' => {
                // Image: keep the alt text, drop the target.
                i += 1;
            }
            '[' => {
                if let Some((label, consumed)) = parse_link(&chars[i..]) {
                    out.push_str(&label);
                    i += consumed;
                } else {
                    out.push('[');
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out.trim_end().to_string()
}

/// Parse `[label](target)` starting at `chars[0] == '['`.
/// Returns the label and the number of chars consumed.
fn parse_link(chars: &[char]) -> Option<(String, usize)> {
    let close = chars.iter().position(|&c| c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let paren = chars[close + 1..].iter().position(|&c| c == ')')?;
    let label: String = chars[1..close].iter().collect();
    Some((label, close + 1 + paren + 1))
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }

    out.trim().to_string()
}
