use super::*;
use crate::config::ChunkingConfig;

fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
    TextSplitter::new(&ChunkingConfig {
        chunk_size,
        chunk_overlap,
    })
    .expect("splitter should build")
}

/// Words of a fixed width separated by spaces, long enough to force
/// several chunks.
fn word_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{:04}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn empty_text_yields_no_chunks() {
    let chunks = splitter(512, 128).split("");
    assert!(chunks.is_empty());
}

#[test]
fn short_text_single_chunk() {
    let text = "A single short paragraph.";
    let chunks = splitter(512, 128).split(text);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, text);
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks[0].end, text.len());
    assert_eq!(chunks[0].index, 0);
}

#[test]
fn thousand_char_document_two_chunks() {
    // 1000 characters split into two paragraphs: 489 + 2 (separator) + 509
    let text = format!("{}\n\n{}", "a".repeat(489), "b".repeat(509));
    assert_eq!(text.len(), 1000);

    let chunks = splitter(512, 128).split(&text);

    assert_eq!(chunks.len(), 2);
    // The second chunk starts no more than 128 characters before char 512
    assert!(chunks[1].start >= 512 - 128);
    assert!(chunks[1].start <= 512);
    assert_eq!(chunks[1].end, 1000);
}

#[test]
fn chunks_respect_size_limit() {
    let text = word_text(200);
    let chunks = splitter(200, 50).split(&text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(
            chunk.content.chars().count() <= 200,
            "chunk {} has {} chars",
            chunk.index,
            chunk.content.chars().count()
        );
    }
}

#[test]
fn adjacent_chunks_overlap_within_bounds() {
    let text = word_text(200);
    let chunks = splitter(200, 50).split(&text);

    assert!(chunks.len() > 1);
    for pair in chunks.windows(2) {
        // The next chunk starts inside the previous one...
        assert!(
            pair[1].start < pair[0].end,
            "chunks {} and {} do not overlap",
            pair[0].index,
            pair[1].index
        );
        // ...but shares at most the configured overlap
        assert!(pair[0].end - pair[1].start <= 50);
    }
}

#[test]
fn chunks_are_exact_substrings_and_cover_the_document() {
    let texts = [
        word_text(300),
        format!(
            "First paragraph with detail.\n\n{}\n\nThird paragraph closes.",
            word_text(120)
        ),
        "short".to_string(),
    ];

    for text in &texts {
        let chunks = splitter(150, 30).split(text);
        assert!(!chunks.is_empty());

        // Each chunk is the literal substring at its offsets
        for chunk in &chunks {
            assert_eq!(chunk.content, &text[chunk.start..chunk.end]);
        }

        // Concatenating the non-overlapping portions reconstructs the text
        let mut reconstructed = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let next_start = chunks.get(i + 1).map_or(chunk.end, |next| next.start);
            assert!(next_start >= chunk.start);
            reconstructed.push_str(&text[chunk.start..next_start]);
        }
        reconstructed.push_str(&text[chunks.last().expect("chunks is non-empty").end..]);
        assert_eq!(&reconstructed, text);

        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.last().expect("chunks is non-empty").end, text.len());
    }
}

#[test]
fn chunk_order_matches_document_order() {
    let text = word_text(300);
    let chunks = splitter(120, 20).split(&text);

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i);
    }
    for pair in chunks.windows(2) {
        assert!(pair[0].start < pair[1].start);
    }
}

#[test]
fn prefers_paragraph_boundaries() {
    let text = format!("{}\n\n{}", "x".repeat(100), "y".repeat(100));
    let chunks = splitter(120, 20).split(&text);

    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].content.ends_with("\n\n"));
    assert!(chunks[1].content.starts_with('y'));
}

#[test]
fn falls_back_to_character_boundaries() {
    // No separators at all in the text; the character-level fallback applies
    let text = "z".repeat(250);
    let chunks = splitter(100, 20).split(&text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.content.chars().count() <= 100);
    }
    // Fixed stride: each window advances by size minus overlap
    for pair in chunks.windows(2) {
        assert_eq!(pair[1].start, pair[0].end - 20);
    }
}

#[test]
fn atomic_unit_without_finer_separator_is_emitted_as_is() {
    // Word-level splitting only; the long token cannot be broken further
    let config = ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 10,
    };
    let splitter = TextSplitter::with_separators(&config, vec![" ".to_string()])
        .expect("splitter should build");

    let long_token = "q".repeat(300);
    let text = format!("start {} end", long_token);
    let chunks = splitter.split(&text);

    let oversize = chunks
        .iter()
        .find(|c| c.content.chars().count() > 100)
        .expect("oversize atomic unit should be emitted");
    assert!(oversize.content.contains(&long_token));
}

#[test]
fn multibyte_text_splits_on_char_boundaries() {
    let text = "도큐먼트 검색 시스템은 청크를 만듭니다 ".repeat(30);
    let chunks = splitter(50, 10).split(&text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(text.is_char_boundary(chunk.start));
        assert!(text.is_char_boundary(chunk.end));
        assert_eq!(chunk.content, &text[chunk.start..chunk.end]);
        assert!(chunk.content.chars().count() <= 50);
    }
}

#[test]
fn size_accounting_uses_characters_not_bytes() {
    // Multibyte characters with no separators: 3 bytes per char
    let text = "한".repeat(120);
    let chunks = splitter(100, 0).split(&text);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content.chars().count(), 100);
    assert_eq!(chunks[1].content.chars().count(), 20);
}

#[test]
fn constructor_rejects_overlap_not_smaller_than_size() {
    let result = TextSplitter::new(&ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 100,
    });
    assert!(result.is_err());

    let result = TextSplitter::new(&ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 200,
    });
    assert!(result.is_err());
}

#[test]
fn constructor_rejects_zero_chunk_size() {
    let result = TextSplitter::new(&ChunkingConfig {
        chunk_size: 0,
        chunk_overlap: 0,
    });
    assert!(result.is_err());
}

#[test]
fn repeated_separators_survive_round_trip() {
    let text = "one\n\n\n\ntwo\n\n\n\nthree";
    let chunks = splitter(8, 2).split(text);

    for chunk in &chunks {
        assert_eq!(chunk.content, &text[chunk.start..chunk.end]);
    }
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks.last().expect("chunks is non-empty").end, text.len());
}
