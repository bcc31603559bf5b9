//! Sentence-aligned document chunking.
//!
//! Splits plain text at sentence boundaries into chunks sized for
//! embedding, packing consecutive sentences until the next one would
//! overflow the limit. Each chunk after the first is seeded with a
//! trailing word window from its predecessor so retrieval keeps
//! cross-boundary context. Pure and deterministic; no I/O.

use crate::config::ChunkerConfig;
use crate::document::Chunk;

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkerConfig::default())
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into overlapping, sentence-aligned chunks.
    ///
    /// Offsets are character offsets into `text`, and the chunk spans
    /// tile the input: each chunk's fresh span starts where the
    /// previous one ended. Empty or whitespace-only input yields an
    /// empty list, which callers must treat as "nothing to index".
    pub fn chunk(&self, text: &str, document_id: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunk_size = self.config.chunk_size.max(1);
        let chars: Vec<char> = text.chars().collect();
        let spans = sentence_spans(&chars);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut carry = String::new();
        let mut cur: Option<(usize, usize)> = None;

        for &(start, end) in &spans {
            let sent_len = end - start;

            if sent_len > chunk_size {
                // A single sentence that cannot fit gets hard-split.
                if let Some((cs, ce)) = cur.take() {
                    self.emit(&mut chunks, document_id, &chars, cs, ce, &mut carry);
                }
                let mut pos = start;
                while pos < end {
                    let stop = (pos + chunk_size).min(end);
                    self.emit(&mut chunks, document_id, &chars, pos, stop, &mut carry);
                    pos = stop;
                }
                continue;
            }

            match cur {
                Some((cs, ce)) if (end - cs) > chunk_size => {
                    self.emit(&mut chunks, document_id, &chars, cs, ce, &mut carry);
                    cur = Some((start, end));
                }
                Some((cs, _)) => {
                    cur = Some((cs, end));
                }
                None => {
                    cur = Some((start, end));
                }
            }
        }

        if let Some((cs, ce)) = cur {
            self.emit(&mut chunks, document_id, &chars, cs, ce, &mut carry);
        }

        chunks
    }

    fn emit(
        &self,
        chunks: &mut Vec<Chunk>,
        document_id: &str,
        chars: &[char],
        start: usize,
        end: usize,
        carry: &mut String,
    ) {
        let span_text: String = chars[start..end].iter().collect();
        let trimmed = span_text.trim();

        let content = if carry.is_empty() {
            trimmed.to_string()
        } else {
            format!("{carry} {trimmed}")
        };

        *carry = tail_words(&content, self.config.overlap_size.saturating_sub(1));

        chunks.push(Chunk {
            document_id: document_id.to_string(),
            index: chunks.len(),
            content,
            start_offset: start,
            end_offset: end,
            embedding_id: None,
        });
    }
}

/// Segment `chars` into contiguous sentence spans covering the whole
/// input. Trailing whitespace rides with its sentence so the spans
/// tile the text exactly; whitespace-only prefixes attach to the
/// following sentence.
fn sentence_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if is_terminator(c) {
            i += 1;
            while i < len && is_closer(chars[i]) {
                i += 1;
            }
            let boundary = i >= len || chars[i].is_whitespace();
            while i < len && chars[i].is_whitespace() && chars[i] != '\n' {
                i += 1;
            }
            if boundary {
                close_span(&mut spans, &chars[..len], &mut start, i);
            }
            continue;
        }

        if c == '\n' {
            i += 1;
            while i < len && chars[i].is_whitespace() {
                i += 1;
            }
            close_span(&mut spans, &chars[..len], &mut start, i);
            continue;
        }

        i += 1;
    }

    if start < len {
        let tail_blank = chars[start..].iter().all(|c| c.is_whitespace());
        if tail_blank {
            if let Some(last) = spans.last_mut() {
                last.1 = len;
            } else {
                spans.push((start, len));
            }
        } else {
            spans.push((start, len));
        }
    }

    spans
}

fn close_span(spans: &mut Vec<(usize, usize)>, chars: &[char], start: &mut usize, end: usize) {
    // Whitespace-only segments are glue for the next sentence.
    if chars[*start..end].iter().all(|c| c.is_whitespace()) {
        return;
    }
    spans.push((*start, end));
    *start = end;
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | '\u{201d}' | '\u{2019}' | ')' | ']')
}

/// Collect trailing whole words of `text` within `budget` characters.
fn tail_words(text: &str, budget: usize) -> String {
    if budget == 0 {
        return String::new();
    }

    let mut words: Vec<&str> = Vec::new();
    let mut total = 0;

    for word in text.split_whitespace().rev() {
        let add = word.chars().count() + usize::from(!words.is_empty());
        if total + add > budget {
            break;
        }
        total += add;
        words.push(word);
    }

    words.reverse();
    words.join(" ")
}
