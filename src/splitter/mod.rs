// Text splitting module
// Recursive boundary-aware splitting of a document into overlapping chunks

#[cfg(test)]
mod tests;

use std::ops::Range;

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::{Result, SearchError};

/// Separator priority used when none is given: paragraph break, line break,
/// word break, then arbitrary character boundary (the empty string).
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A contiguous piece of the source document.
///
/// `content` is always the literal substring `text[start..end]` of the input,
/// so concatenating chunks (accounting for the overlap between neighbors)
/// reconstructs the document exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text
    pub content: String,
    /// Byte offset of the chunk start in the source document
    pub start: usize,
    /// Byte offset one past the chunk end
    pub end: usize,
    /// Position of this chunk in document order
    pub index: usize,
}

/// Splits text into chunks of at most `chunk_size` characters, breaking at
/// the most natural boundary available and sharing up to `chunk_overlap`
/// characters between neighbors.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

/// A candidate piece produced by one separator level, before merging.
/// Separators stay attached to the preceding piece so no characters are lost.
#[derive(Debug, Clone)]
struct Piece {
    range: Range<usize>,
    chars: usize,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        Self::with_separators(
            config,
            DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    /// Create a splitter with a custom separator priority list. The empty
    /// string means "split at any character boundary"; a list without it may
    /// emit pieces larger than `chunk_size` when no separator applies.
    #[inline]
    pub fn with_separators(config: &ChunkingConfig, separators: Vec<String>) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(SearchError::Config(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(SearchError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if separators.is_empty() {
            return Err(SearchError::Config(
                "at least one separator is required".to_string(),
            ));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators,
        })
    }

    /// Split `text` into chunks in document order. Empty input yields an
    /// empty sequence.
    #[inline]
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut ranges = Vec::new();
        self.split_range(text, 0..text.len(), 0, &mut ranges);

        let chunks: Vec<Chunk> = ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| Chunk {
                content: text[range.clone()].to_string(),
                start: range.start,
                end: range.end,
                index,
            })
            .collect();

        debug!(
            "split {} bytes into {} chunks (size {}, overlap {})",
            text.len(),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );

        chunks
    }

    /// Recursively split one region of the text at the finest separator
    /// level needed to bring every piece under the size limit.
    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        separator_index: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        let segment = &text[range.clone()];

        // Pick the first separator that applies to this segment. The empty
        // string (character boundary) always applies.
        let mut chosen = None;
        for (i, separator) in self.separators.iter().enumerate().skip(separator_index) {
            if separator.is_empty() || segment.contains(separator.as_str()) {
                chosen = Some(i);
                break;
            }
        }

        let Some(chosen) = chosen else {
            // No separator occurs in this segment at all; emit it untouched,
            // oversize or not, rather than corrupt an atomic unit.
            out.push(range);
            return;
        };
        let next_index = chosen + 1;

        let pieces = if self.separators[chosen].is_empty() {
            char_pieces(text, &range)
        } else {
            pieces_by_separator(text, &range, &self.separators[chosen])
        };

        let mut good: Vec<Piece> = Vec::new();
        for piece in pieces {
            if piece.chars <= self.chunk_size {
                good.push(piece);
            } else {
                // Flush what fits so far, then break the oversize piece at
                // the next separator level (or emit it as-is when this was
                // the final level).
                self.merge_pieces(&good, out);
                good.clear();

                if next_index >= self.separators.len() {
                    out.push(piece.range);
                } else {
                    self.split_range(text, piece.range, next_index, out);
                }
            }
        }
        self.merge_pieces(&good, out);
    }

    /// Merge consecutive pieces into chunks of at most `chunk_size`
    /// characters, retaining trailing pieces totalling at most
    /// `chunk_overlap` characters as the start of the next chunk.
    fn merge_pieces(&self, pieces: &[Piece], out: &mut Vec<Range<usize>>) {
        if pieces.is_empty() {
            return;
        }

        let mut window_start = 0;
        let mut window_chars = 0;

        for (i, piece) in pieces.iter().enumerate() {
            if window_chars + piece.chars > self.chunk_size && window_chars > 0 {
                out.push(pieces[window_start].range.start..pieces[i - 1].range.end);

                while window_chars > self.chunk_overlap
                    || (window_chars + piece.chars > self.chunk_size && window_chars > 0)
                {
                    window_chars -= pieces[window_start].chars;
                    window_start += 1;
                }
            }
            window_chars += piece.chars;
        }

        let last = pieces.len() - 1;
        out.push(pieces[window_start].range.start..pieces[last].range.end);
    }
}

/// Split a region at each occurrence of `separator`, keeping the separator
/// attached to the preceding piece.
fn pieces_by_separator(text: &str, range: &Range<usize>, separator: &str) -> Vec<Piece> {
    let segment = &text[range.clone()];
    let mut pieces = Vec::new();
    let mut position = 0;

    while let Some(found) = segment[position..].find(separator) {
        let end = position + found + separator.len();
        pieces.push(make_piece(text, range.start + position, range.start + end));
        position = end;
    }

    if position < segment.len() {
        pieces.push(make_piece(
            text,
            range.start + position,
            range.start + segment.len(),
        ));
    }

    pieces
}

/// One piece per character; merging turns these into fixed-stride windows.
fn char_pieces(text: &str, range: &Range<usize>) -> Vec<Piece> {
    text[range.clone()]
        .char_indices()
        .map(|(offset, ch)| Piece {
            range: range.start + offset..range.start + offset + ch.len_utf8(),
            chars: 1,
        })
        .collect()
}

fn make_piece(text: &str, start: usize, end: usize) -> Piece {
    Piece {
        chars: text[start..end].chars().count(),
        range: start..end,
    }
}
