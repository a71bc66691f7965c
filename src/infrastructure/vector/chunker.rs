//! Text chunking implementation
//!
//! Splits text into overlapping token windows. Windows advance by
//! `tokens_per_chunk - chunk_overlap` tokens and the last window ends at the
//! last token.

use std::ops::Range;

use tiktoken_rs::CoreBPE;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChunkingConfig, TextChunk, TokenizerKind};

enum Tokenizer {
    Whitespace,
    Bpe(Box<CoreBPE>),
}

/// Byte spans of the tokens of a text, ready to be windowed
struct Tokens<'a> {
    text: &'a str,
    spans: Vec<Range<usize>>,
}

impl Tokens<'_> {
    fn len(&self) -> usize {
        self.spans.len()
    }

    fn window(&self, range: Range<usize>) -> String {
        let start = self.spans[range.start].start;
        let end = self.spans[range.end - 1].end;
        self.text[start..end].to_string()
    }
}

/// Token-window chunker
pub struct Chunker {
    config: ChunkingConfig,
    tokenizer: Tokenizer,
}

impl Chunker {
    /// Create a new chunker with default configuration
    pub fn new() -> DomainResult<Self> {
        Self::with_config(ChunkingConfig::default())
    }

    /// Create a new chunker with custom configuration
    pub fn with_config(config: ChunkingConfig) -> DomainResult<Self> {
        config
            .validate()
            .map_err(|e| DomainError::ValidationFailed(format!("Invalid chunking config: {e}")))?;

        let tokenizer = match config.tokenizer {
            TokenizerKind::Whitespace => Tokenizer::Whitespace,
            TokenizerKind::Cl100k => {
                let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
                    DomainError::ValidationFailed(format!("Failed to load tokenizer: {e}"))
                })?;
                Tokenizer::Bpe(Box::new(bpe))
            }
        };

        Ok(Self { config, tokenizer })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into windows.
    ///
    /// The returned iterator is lazy and finite; calling `chunk` again yields
    /// the same sequence. Fails only when the text contains characters that
    /// cannot appear in a document.
    pub fn chunk<'a>(&'a self, text: &'a str) -> DomainResult<Chunks<'a>> {
        validate_text(text)?;
        let spans = match &self.tokenizer {
            Tokenizer::Whitespace => whitespace_spans(text),
            Tokenizer::Bpe(bpe) => bpe_spans(bpe, text),
        };
        let tokens = Tokens { text, spans };
        Ok(Chunks {
            tokens,
            size: self.config.tokens_per_chunk,
            overlap: self.config.chunk_overlap,
            start: 0,
            next_index: 1,
            done: false,
        })
    }

    /// Count tokens in text
    pub fn count_tokens(&self, text: &str) -> usize {
        match &self.tokenizer {
            Tokenizer::Whitespace => whitespace_spans(text).len(),
            Tokenizer::Bpe(bpe) => bpe.encode_with_special_tokens(text).len(),
        }
    }
}

/// Lazy sequence of token windows
pub struct Chunks<'a> {
    tokens: Tokens<'a>,
    size: usize,
    overlap: usize,
    start: usize,
    next_index: u32,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = DomainResult<TextChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.tokens.len();
        if self.done || self.start >= total {
            return None;
        }

        let end = (self.start + self.size).min(total);
        let chunk = TextChunk {
            chunk_index: self.next_index,
            text: self.tokens.window(self.start..end),
            token_count: end - self.start,
        };

        if end >= total {
            self.done = true;
        } else {
            self.start = end - self.overlap;
        }
        self.next_index += 1;
        Some(Ok(chunk))
    }
}

fn validate_text(text: &str) -> DomainResult<()> {
    match text
        .chars()
        .find(|c| c.is_control() && !matches!(*c, '\n' | '\r' | '\t'))
    {
        Some(c) => Err(DomainError::InvalidInput(format!(
            "text contains control character U+{:04X}",
            u32::from(c)
        ))),
        None => Ok(()),
    }
}

/// Byte spans of BPE tokens, widened to whole characters.
///
/// A token may carry only part of a multi-byte character, so a token
/// window is cut at the enclosing character boundaries instead of being
/// decoded on its own.
fn bpe_spans(bpe: &CoreBPE, text: &str) -> Vec<Range<usize>> {
    let ids = bpe.encode_with_special_tokens(text);
    let mut spans = Vec::with_capacity(ids.len());
    let mut offset = 0;
    for bytes in bpe._decode_native_and_split(ids) {
        let end = (offset + bytes.len()).min(text.len());
        spans.push(floor_boundary(text, offset)..ceil_boundary(text, end));
        offset = end;
    }
    spans
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn whitespace_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn collect(chunker: &Chunker, text: &str) -> Vec<TextChunk> {
        chunker
            .chunk(text)
            .unwrap()
            .collect::<DomainResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_three_hundred_tokens_make_three_chunks() {
        let chunker = Chunker::with_config(ChunkingConfig::whitespace(128, 10)).unwrap();
        let chunks = collect(&chunker, &words(300));

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(chunks[0].token_count, 128);
        assert_eq!(chunks[1].token_count, 128);
        assert_eq!(chunks[2].token_count, 64);
        assert!(chunks[1].text.starts_with("w118 "));
        assert!(chunks[2].text.starts_with("w236 "));
        assert!(chunks[2].text.ends_with("w299"));
    }

    #[test]
    fn test_empty_and_blank_text() {
        let chunker = Chunker::with_config(ChunkingConfig::whitespace(4, 1)).unwrap();
        assert!(collect(&chunker, "").is_empty());
        assert!(collect(&chunker, " \n\t ").is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = Chunker::with_config(ChunkingConfig::whitespace(128, 10)).unwrap();
        let chunks = collect(&chunker, "  hello   there ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello   there");
        assert_eq!(chunks[0].chunk_index, 1);
    }

    #[test]
    fn test_control_characters_are_rejected() {
        let chunker = Chunker::with_config(ChunkingConfig::whitespace(4, 1)).unwrap();
        assert!(matches!(
            chunker.chunk("bad\u{0}text"),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(chunker.chunk("fine\ttext\r\n").is_ok());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(Chunker::with_config(ChunkingConfig::whitespace(4, 4)).is_err());
    }

    #[test]
    fn test_bpe_chunking_is_deterministic() {
        let chunker = Chunker::with_config(ChunkingConfig {
            tokens_per_chunk: 16,
            chunk_overlap: 4,
            tokenizer: TokenizerKind::Cl100k,
        })
        .unwrap();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(10);

        let first = collect(&chunker, &text);
        let second = collect(&chunker, &text);
        assert_eq!(first, second);
        assert!(first.len() > 1);
        assert!(first.iter().all(|c| c.token_count <= 16));
        assert_eq!(
            first.len(),
            chunker.config().expected_chunks(chunker.count_tokens(&text))
        );
    }

    #[test]
    fn test_bpe_windows_keep_multibyte_characters_whole() {
        let chunker = Chunker::with_config(ChunkingConfig {
            tokens_per_chunk: 16,
            chunk_overlap: 4,
            tokenizer: TokenizerKind::Cl100k,
        })
        .unwrap();
        let text = "🦀 日本語の文章です。".repeat(20);

        let chunks = collect(&chunker, &text);

        assert!(chunks.len() > 1);
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            (1..=chunks.len() as u32).collect::<Vec<_>>()
        );
        assert!(chunks.iter().all(|c| !c.text.is_empty() && text.contains(c.text.as_str())));
        assert!(chunks[0].text.starts_with("🦀"));
        assert!(chunks.last().unwrap().text.ends_with("です。"));
    }

    proptest! {
        #[test]
        fn prop_chunk_indices_are_contiguous_from_one(
            token_count in 0usize..600,
            size in 2usize..64,
            overlap_seed in 0usize..64,
        ) {
            let overlap = overlap_seed % size;
            let chunker = Chunker::with_config(ChunkingConfig::whitespace(size, overlap)).unwrap();
            let text = words(token_count);

            let first = collect(&chunker, &text);
            let second = collect(&chunker, &text);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), chunker.config().expected_chunks(token_count));
            for (i, chunk) in first.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_index as usize, i + 1);
                prop_assert!(chunk.token_count <= size);
            }
        }
    }
}
