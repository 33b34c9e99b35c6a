/// Chunk sizing policy: explicit overrides win, short documents get a size
/// proportional to their length so they still split into a few chunks, and
/// everything else uses the fixed default window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkPlan {
    pub const DEFAULT_SIZE: usize = 5000;
    pub const DEFAULT_OVERLAP: usize = 200;
    pub const SHORT_TEXT_LIMIT: usize = 3000;
    pub const MIN_SIZE: usize = 200;

    pub fn for_text(
        text_len: usize,
        size_override: Option<usize>,
        overlap_override: Option<usize>,
    ) -> Self {
        if let Some(size) = size_override {
            return Self {
                size: size.max(Self::MIN_SIZE),
                overlap: overlap_override.unwrap_or(0),
            };
        }

        if text_len <= Self::SHORT_TEXT_LIMIT {
            let size = (text_len / 3).max(500);
            Self {
                size,
                overlap: (size / 10).min(100),
            }
        } else {
            Self {
                size: Self::DEFAULT_SIZE,
                overlap: Self::DEFAULT_OVERLAP,
            }
        }
    }
}

/// How far back from a window edge a break point may sit, and how far into
/// the window it must sit, measured in characters.
const BREAK_WINDOW: usize = 1000;

/// Splits `text` into overlapping, boundary-aware segments of at most
/// `max_size` characters.
///
/// Each window that ends before the text does is cut back to the nearest
/// newline, or failing that the nearest sentence break (`". "`), provided
/// the break lies within [`BREAK_WINDOW`] of the window edge and more than
/// [`BREAK_WINDOW`] past the window start. Chunks are trimmed and empty
/// ones dropped; the window advances by `max_size - overlap` and the final
/// window always reaches the end of the text. Stateless and deterministic.
pub fn chunk_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();

    if total == 0 || max_size == 0 {
        return chunks;
    }

    let overlap = overlap.min(max_size - 1);
    let mut start = 0usize;

    while start < total {
        let mut end = (start + max_size).min(total);

        if end < total {
            let mut break_at = rfind_char(&chars, start, end, '\n');
            if break_at.map_or(true, |at| end - at > BREAK_WINDOW) {
                if let Some(at) = rfind_sentence_break(&chars, start, end) {
                    if end - at < BREAK_WINDOW {
                        break_at = Some(at);
                    }
                }
            }
            if let Some(at) = break_at {
                if at > start + BREAK_WINDOW {
                    end = at + 1;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= total {
            break;
        }

        // A boundary cut can shrink the window below the overlap; always
        // move forward so the walk terminates.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

fn rfind_char(chars: &[char], start: usize, end: usize, needle: char) -> Option<usize> {
    chars[start..end]
        .iter()
        .rposition(|&c| c == needle)
        .map(|offset| start + offset)
}

fn rfind_sentence_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    if end < start + 2 {
        return None;
    }
    (start..=end - 2)
        .rev()
        .find(|&at| chars[at] == '.' && chars[at + 1] == ' ')
}

#[cfg(test)]
mod tests {
    use super::{chunk_text, ChunkPlan};

    #[test]
    fn short_text_fits_one_chunk() {
        let text = "Acme Corp provides thermal testing. Contact: a@acme.com.";
        let chunks = chunk_text(text, 5000, 200);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 5000, 200).is_empty());
        assert!(chunk_text("   \n ", 5000, 200).is_empty());
    }

    #[test]
    fn cuts_at_newline_near_window_edge() {
        let mut text = "a".repeat(1100);
        text.push('\n');
        text.push_str(&"b".repeat(900));

        let chunks = chunk_text(&text, 1200, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(1100));
        assert_eq!(chunks[1], "b".repeat(900));
    }

    #[test]
    fn falls_back_to_sentence_break() {
        let mut text = "a".repeat(1148);
        text.push_str(". ");
        text.push_str(&"b".repeat(850));

        let chunks = chunk_text(&text, 1200, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('.'));
        assert_eq!(chunks[0].len(), 1149);
    }

    #[test]
    fn windows_overlap_by_requested_amount() {
        let text: String = ('a'..='z').cycle().take(24).collect();
        let chunks = chunk_text(&text, 10, 3);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - 3..];
            assert!(pair[1].starts_with(tail));
        }
    }

    #[test]
    fn no_chunk_exceeds_max_size() {
        let text = "word ".repeat(3000);
        for chunk in chunk_text(&text, 1500, 200) {
            assert!(chunk.chars().count() <= 1500);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The lab runs vibration and thermal cycles. ".repeat(200);
        let first = chunk_text(&text, 1300, 150);
        let second = chunk_text(&text, 1300, 150);
        assert_eq!(first, second);
    }

    #[test]
    fn final_window_reaches_text_end() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, 1200, 100);
        let tail = chunks.last().expect("chunks");
        assert!(text.ends_with(tail.as_str()));
    }

    #[test]
    fn plan_scales_down_for_short_documents() {
        let plan = ChunkPlan::for_text(3000, None, None);
        assert_eq!(plan, ChunkPlan { size: 1000, overlap: 100 });

        let tiny = ChunkPlan::for_text(600, None, None);
        assert_eq!(tiny, ChunkPlan { size: 500, overlap: 50 });
    }

    #[test]
    fn plan_uses_defaults_for_long_documents() {
        let plan = ChunkPlan::for_text(20_000, None, None);
        assert_eq!(
            plan,
            ChunkPlan {
                size: ChunkPlan::DEFAULT_SIZE,
                overlap: ChunkPlan::DEFAULT_OVERLAP
            }
        );
    }

    #[test]
    fn plan_clamps_explicit_size_to_minimum() {
        let plan = ChunkPlan::for_text(10_000, Some(50), Some(10));
        assert_eq!(plan, ChunkPlan { size: 200, overlap: 10 });
    }
}
