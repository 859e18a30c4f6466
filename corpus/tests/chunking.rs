//! Properties of the recursive chunker over realistic page text.

use lore_corpus::{ChunkerConfig, RecursiveChunker, split_text};
use pretty_assertions::assert_eq;

/// A page with paragraphs, lines, sentences and long words.
fn sample_page() -> String {
    let mut page = String::new();
    for p in 0..12 {
        for s in 0..(3 + p % 4) {
            page.push_str(&format!(
                "Sentence {s} of paragraph {p} mentions the Erdtree and the Lands Between. "
            ));
            if s % 2 == 1 {
                page.push('\n');
            }
        }
        page.push_str("\n\n");
    }
    page.push_str(&"Godrick".repeat(40));
    page
}

/// Word-only text where every window boundary falls inside one merge run.
fn word_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("w{i:03}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shared_boundary(prev: &str, next: &str, max: usize) -> Option<usize> {
    let prev: Vec<char> = prev.chars().collect();
    let next: Vec<char> = next.chars().collect();
    (1..=max.min(prev.len()).min(next.len()))
        .rev()
        .find(|&n| prev[prev.len() - n..] == next[..n])
}

#[test]
fn chunking_is_deterministic() {
    let page = sample_page();
    for (size, overlap) in [(1000, 200), (120, 30), (50, 0), (17, 16)] {
        let first = split_text(&page, size, overlap).unwrap();
        let second = split_text(&page, size, overlap).unwrap();
        assert_eq!(first, second, "size={size} overlap={overlap}");
    }
}

#[test]
fn chunks_respect_the_size_limit() {
    let page = sample_page();
    for (size, overlap) in [(1000, 200), (120, 30), (50, 10), (8, 3)] {
        for chunk in split_text(&page, size, overlap).unwrap() {
            let len = chunk.chars().count();
            assert!(len <= size, "chunk of {len} chars exceeds {size}: {chunk:?}");
            assert!(!chunk.is_empty());
        }
    }
}

#[test]
fn adjacent_chunks_overlap() {
    let text = word_text(100);
    let (size, overlap) = (20, 9);
    let chunks = split_text(&text, size, overlap).unwrap();
    assert!(chunks.len() > 1);

    for pair in chunks.windows(2) {
        let shared = shared_boundary(&pair[0], &pair[1], overlap);
        assert!(
            shared.is_some(),
            "no overlap between {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }

    // Windows hold four words; the last two carry over.
    assert_eq!(chunks[0], "w000 w001 w002 w003");
    assert_eq!(chunks[1], "w002 w003 w004 w005");
}

#[test]
fn zero_overlap_drops_nothing_and_repeats_nothing() {
    let text = word_text(50);
    let chunks = split_text(&text, 24, 0).unwrap();
    assert_eq!(chunks.join(" "), text);
}

#[test]
fn golden_sentence_fallback() {
    let chunks = split_text("A. B. C.", 5, 2).unwrap();
    assert_eq!(chunks, vec!["A. B".to_string(), "B. C.".to_string()]);
}

#[test]
fn golden_default_parameters_keep_small_pages_whole() {
    let page = "Queen Marika the Eternal is the goddess of the Lands Between.";
    let chunks = split_text(page, 1000, 200).unwrap();
    assert_eq!(chunks, vec![page.to_string()]);
}

#[test]
fn custom_separators_without_fallback_keep_long_spans() {
    let config = ChunkerConfig::new(10, 2).with_separators(["\n"]);
    let chunker = RecursiveChunker::new(config).unwrap();
    let chunks = chunker.split("short\nthis line is far too long\nend");
    assert_eq!(
        chunks,
        vec![
            "short".to_string(),
            "this line is far too long".to_string(),
            "end".to_string()
        ]
    );
}
