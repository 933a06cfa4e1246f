//! Adaptive chunking: structural units packed up to a character budget
//! with overlap carried across split boundaries. The carried overlap is
//! counted inside the budget, so no chunk ever exceeds `max_chars`.

mod segment;

use docuvec_config::ChunkingConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ParsingError, ParsingResult};
use segment::{Unit, UnitKind};

/// A chunk before it is persisted: the pipeline assigns document id,
/// chunk index, and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub text: String,
    pub is_header: bool,
    pub is_table: bool,
    pub parent_section: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveChunker {
    max_chars: usize,
    overlap: usize,
}

impl AdaptiveChunker {
    pub fn new(max_chars: usize, overlap: usize) -> ParsingResult<Self> {
        if max_chars == 0 {
            return Err(ParsingError::InvalidChunking(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if overlap >= max_chars {
            return Err(ParsingError::InvalidChunking(format!(
                "overlap ({overlap}) must be smaller than max_chars ({max_chars})"
            )));
        }
        Ok(Self { max_chars, overlap })
    }

    /// Build a chunker from the shared configuration layer
    pub fn from_config(config: &ChunkingConfig) -> ParsingResult<Self> {
        Self::new(config.max_chars, config.overlap)
    }

    /// Split normalized text into ordered chunk drafts. Empty input
    /// yields zero chunks; non-empty input always yields at least one.
    pub fn chunk(&self, text: &str) -> Vec<ChunkDraft> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let units = segment::segment(text);
        if units.is_empty() {
            // Unstructured input: fixed windows keep the contract alive
            return self
                .windows(text)
                .into_iter()
                .map(|w| ChunkDraft {
                    text: w,
                    is_header: false,
                    is_table: false,
                    parent_section: None,
                })
                .collect();
        }

        let mut out: Vec<ChunkDraft> = Vec::new();
        let mut section: Option<String> = None;
        let mut buf = String::new();
        let mut carry = String::new();

        for unit in units {
            match unit.kind {
                UnitKind::Header { .. } => {
                    self.flush(&mut buf, &section, &mut out);
                    carry.clear();
                    section = Some(unit.text.clone());
                    out.push(ChunkDraft {
                        text: unit.text,
                        is_header: true,
                        is_table: false,
                        parent_section: section.clone(),
                    });
                }
                UnitKind::Table => {
                    self.flush(&mut buf, &section, &mut out);
                    carry.clear();
                    for window in self.windows(&unit.text) {
                        out.push(ChunkDraft {
                            text: window,
                            is_header: false,
                            is_table: true,
                            parent_section: section.clone(),
                        });
                    }
                }
                UnitKind::Paragraph => self.pack(unit, &section, &mut buf, &mut carry, &mut out),
            }
        }
        self.flush(&mut buf, &section, &mut out);
        out
    }

    /// Pack a paragraph into the running buffer, flushing with overlap
    /// carry when the budget would be exceeded.
    fn pack(
        &self,
        unit: Unit,
        section: &Option<String>,
        buf: &mut String,
        carry: &mut String,
        out: &mut Vec<ChunkDraft>,
    ) {
        let unit_len = unit.text.chars().count();
        let buf_len = buf.chars().count();

        if unit_len > self.max_chars {
            // Oversized paragraph: flush, then window it directly
            self.flush(buf, section, out);
            for window in self.windows(&unit.text) {
                out.push(ChunkDraft {
                    text: window,
                    is_header: false,
                    is_table: false,
                    parent_section: section.clone(),
                });
            }
            carry.clear();
            return;
        }

        if buf_len > 0 && buf_len + 2 + unit_len > self.max_chars {
            // Carried overlap counts against the next chunk's budget
            *carry = self.tail(buf, self.max_chars.saturating_sub(unit_len + 2));
            self.flush(buf, section, out);
            buf.push_str(carry);
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(&unit.text);
    }

    fn flush(&self, buf: &mut String, section: &Option<String>, out: &mut Vec<ChunkDraft>) {
        let text = buf.trim();
        if !text.is_empty() {
            out.push(ChunkDraft {
                text: text.to_string(),
                is_header: false,
                is_table: false,
                parent_section: section.clone(),
            });
        }
        buf.clear();
    }

    /// Last `overlap` characters of `s` (at most `cap`), on a char
    /// boundary.
    fn tail(&self, s: &str, cap: usize) -> String {
        let keep = self.overlap.min(cap);
        if keep == 0 {
            return String::new();
        }
        let count = s.chars().count();
        if count <= keep {
            return s.to_string();
        }
        s.chars().skip(count - keep).collect()
    }

    /// Fixed-size character windows with overlap. Step is always
    /// positive because overlap < max_chars is enforced at construction.
    fn windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.max_chars {
            return vec![text.to_string()];
        }
        let step = self.max_chars - self.overlap;
        let mut out = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.max_chars).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chars: usize, overlap: usize) -> AdaptiveChunker {
        AdaptiveChunker::new(max_chars, overlap).unwrap()
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(AdaptiveChunker::new(0, 0).is_err());
        assert!(AdaptiveChunker::new(100, 100).is_err());
        assert!(AdaptiveChunker::new(100, 99).is_ok());
    }

    #[test]
    fn builds_from_shared_config() {
        let config = ChunkingConfig::from_env();
        assert!(AdaptiveChunker::from_config(&config).is_ok());
        let degenerate = ChunkingConfig {
            max_chars: 100,
            overlap: 100,
        };
        assert!(AdaptiveChunker::from_config(&degenerate).is_err());
    }

    #[test]
    fn empty_input_yields_zero_chunks() {
        assert!(chunker(100, 10).chunk("").is_empty());
        assert!(chunker(100, 10).chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn non_empty_input_yields_at_least_one_chunk() {
        let chunks = chunker(100, 10).chunk("hello");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
    }

    #[test]
    fn headers_set_parent_section_for_following_chunks() {
        let chunks = chunker(200, 20).chunk("# Billing\nInvoices go out monthly.\n\n# Support\nTickets are triaged daily.");
        let billing: Vec<_> = chunks
            .iter()
            .filter(|c| c.parent_section.as_deref() == Some("Billing"))
            .collect();
        assert_eq!(billing.len(), 2);
        assert!(billing[0].is_header);
        assert!(!billing[1].is_header);
        assert!(chunks
            .iter()
            .any(|c| c.parent_section.as_deref() == Some("Support") && !c.is_header));
    }

    #[test]
    fn tables_become_table_chunks() {
        let chunks = chunker(200, 20).chunk("# Data\ncol_a\tcol_b\n1\t2");
        let table: Vec<_> = chunks.iter().filter(|c| c.is_table).collect();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].parent_section.as_deref(), Some("Data"));
        assert!(table[0].text.contains("col_a\tcol_b"));
    }

    #[test]
    fn packed_paragraphs_respect_max_chars() {
        let paragraph = "word ".repeat(30).trim().to_string();
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = chunker(200, 20).chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 200);
        }
    }

    #[test]
    fn overlap_carries_tail_across_split() {
        let a = "a".repeat(90);
        let b = "b".repeat(80);
        let chunks = chunker(100, 10).chunk(&format!("{a}\n\n{b}"));
        assert_eq!(chunks.len(), 2);
        // The second chunk starts with the tail of the first
        assert!(chunks[1].text.starts_with(&"a".repeat(10)));
        assert!(chunks[1].text.ends_with(&"b".repeat(80)));
        assert!(chunks[1].text.chars().count() <= 100);
    }

    #[test]
    fn carried_overlap_never_pushes_a_chunk_past_the_budget() {
        // Full overlap would not fit next to the 90-char paragraph, so
        // the carry is trimmed to what the budget leaves over
        let a = "a".repeat(90);
        let b = "b".repeat(90);
        let chunks = chunker(100, 10).chunk(&format!("{a}\n\n{b}"));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with(&"a".repeat(8)));
        assert!(!chunks[1].text.starts_with(&"a".repeat(9)));
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
        }
    }

    #[test]
    fn oversized_paragraph_falls_back_to_windows() {
        let long = "x".repeat(500);
        let chunks = chunker(100, 10).chunk(&long);
        assert!(chunks.len() >= 5);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
        }
        // Consecutive windows share the overlap region
        assert_eq!(&chunks[0].text[90..], &chunks[1].text[..10]);
    }
}
