//! Key spans and the merged span set used for resume filtering.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A half-open key interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpan {
    pub start: Bytes,
    pub end: Bytes,
}

impl KeySpan {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.start.as_ref() <= key && key < self.end.as_ref()
    }
}

/// A set of key spans kept sorted and merged.
///
/// Holds the spans persisted by previous successful runs of an import;
/// KVs whose keys fall inside are dropped on resume.
#[derive(Debug, Clone, Default)]
pub struct SpanGroup {
    spans: Vec<KeySpan>,
}

impl SpanGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a span, merging it with any spans it touches.
    pub fn add(&mut self, span: KeySpan) {
        if span.start >= span.end {
            return;
        }
        let mut merged = span;
        let mut kept = Vec::with_capacity(self.spans.len() + 1);
        for existing in self.spans.drain(..) {
            if existing.end < merged.start || merged.end < existing.start {
                kept.push(existing);
            } else {
                if existing.start < merged.start {
                    merged.start = existing.start;
                }
                if existing.end > merged.end {
                    merged.end = existing.end;
                }
            }
        }
        kept.push(merged);
        kept.sort_by(|a, b| a.start.cmp(&b.start));
        self.spans = kept;
    }

    /// Add every span in the iterator.
    pub fn add_all(&mut self, spans: impl IntoIterator<Item = KeySpan>) {
        for span in spans {
            self.add(span);
        }
    }

    /// True if the key lies within any span of the group.
    pub fn contains(&self, key: &[u8]) -> bool {
        // Spans are sorted and disjoint: find the last span starting at
        // or before the key.
        match self
            .spans
            .binary_search_by(|span| span.start.as_ref().cmp(key))
        {
            Ok(_) => true,
            Err(0) => false,
            Err(i) => self.spans[i - 1].contains_key(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }
}
