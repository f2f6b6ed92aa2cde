//! Chunk addressing into text: characters, words, items and lines.
//!
//! A [`Chunk`] names a span of matches of one granularity and may be nested
//! inside another chunk (`char 3 of word 2 of line 4`). Resolution always works
//! container-first: the chunk a span is taken `of` is resolved against the full
//! text, and the inner chunk is then resolved against that substring with its
//! offsets translated back.
//!
//! Ranges are byte offsets that always fall on `char` boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ScriptResult;
use super::ordinal::{Ordinal, OrdinalSource};
use super::value::{SortStyle, Value};

/// Default item delimiter.
pub const DEFAULT_ITEM_DELIMITER: char = ',';

/// Unit a chunk counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// One Unicode scalar value.
    Character,
    /// A maximal run of non-whitespace characters.
    Word,
    /// Text between item delimiters.
    Item,
    /// Text between newlines.
    Line,
}

impl Granularity {
    /// Parse a granularity keyword, singular or plural (`char`, `words`, …).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "char" | "chars" | "character" | "characters" => Some(Granularity::Character),
            "word" | "words" => Some(Granularity::Word),
            "item" | "items" => Some(Granularity::Item),
            "line" | "lines" => Some(Granularity::Line),
            _ => None,
        }
    }

    fn separator(&self, delimiter: char) -> String {
        match self {
            Granularity::Character => String::new(),
            Granularity::Word => " ".to_string(),
            Granularity::Item => delimiter.to_string(),
            Granularity::Line => "\n".to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Character => "char",
            Granularity::Word => "word",
            Granularity::Item => "item",
            Granularity::Line => "line",
        };
        f.write_str(name)
    }
}

/// A chunk specifier, optionally nested inside another chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unit counted by this chunk.
    pub granularity: Granularity,
    /// First match of the span.
    pub start: Ordinal,
    /// Last match of the span; the span is a single match when absent.
    pub end: Option<Ordinal>,
    /// Chunk this one is evaluated inside of.
    pub of: Option<Box<Chunk>>,
}

impl Chunk {
    /// Single-match chunk.
    pub fn new(granularity: Granularity, start: Ordinal) -> Self {
        Self {
            granularity,
            start,
            end: None,
            of: None,
        }
    }

    /// Single-match chunk at a natural-number position.
    pub fn nth(granularity: Granularity, position: i64) -> ScriptResult<Self> {
        Ok(Self::new(granularity, Ordinal::nth(position)?))
    }

    /// Build a chunk from script values, validating both ordinals before any
    /// resolution happens.
    pub fn from_values(
        granularity: Granularity,
        start: &Value,
        end: Option<&Value>,
    ) -> ScriptResult<Self> {
        let start = Ordinal::from_value(start)?;
        let end = end.map(Ordinal::from_value).transpose()?;
        Ok(Self {
            granularity,
            start,
            end,
            of: None,
        })
    }

    /// Extend the span through `end`.
    pub fn through(mut self, end: Ordinal) -> Self {
        self.end = Some(end);
        self
    }

    /// Nest this chunk inside `outer`; when already nested, `outer` wraps the
    /// innermost container.
    pub fn within(mut self, outer: Chunk) -> Self {
        self.of = Some(Box::new(match self.of.take() {
            None => outer,
            Some(existing) => existing.within(outer),
        }));
        self
    }

    /// Nesting depth (1 for a simple chunk).
    pub fn depth(&self) -> usize {
        1 + self.of.as_ref().map(|of| of.depth()).unwrap_or(0)
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.granularity, self.start)?;
        if let Some(end) = &self.end {
            write!(f, " to {}", end)?;
        }
        if let Some(of) = &self.of {
            write!(f, " of {}", of)?;
        }
        Ok(())
    }
}

/// Resolved span of text; `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl Range {
    /// Range between two offsets, in either order.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Empty range at `offset`.
    pub fn empty_at(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Number of bytes covered.
    pub fn length(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range covers nothing.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// How a value is placed relative to a resolved chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preposition {
    /// Replace the chunk.
    Into,
    /// Insert before the chunk.
    Before,
    /// Insert after the chunk.
    After,
}

/// Resolves chunks against text.
pub struct ChunkResolver<'a> {
    delimiter: char,
    source: &'a mut dyn OrdinalSource,
}

impl<'a> ChunkResolver<'a> {
    /// Resolver splitting items on `delimiter` and drawing ANY picks from `source`.
    pub fn new(delimiter: char, source: &'a mut dyn OrdinalSource) -> Self {
        Self { delimiter, source }
    }

    /// Item delimiter in effect.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Resolve `chunk` (and any chunk it is nested in) to a range of `text`.
    ///
    /// Out-of-range positions resolve to the empty range at the end of the
    /// containing text rather than failing.
    pub fn resolve(&mut self, text: &str, chunk: &Chunk) -> Range {
        let container = match &chunk.of {
            Some(outer) => self.resolve(text, outer),
            None => Range::new(0, text.len()),
        };
        let inner = self.resolve_in(&text[container.start..container.end], chunk);
        Range::new(container.start + inner.start, container.start + inner.end)
    }

    fn resolve_in(&mut self, text: &str, chunk: &Chunk) -> Range {
        let spans = split_matches(text, chunk.granularity, self.delimiter);
        let count = spans.len();
        let Some(first) = chunk.start.resolve(count, self.source) else {
            return Range::empty_at(text.len());
        };
        let Some(end) = &chunk.end else {
            return spans[first];
        };
        let last = end.resolve(count, self.source).unwrap_or(count - 1);
        if last < first {
            return Range::empty_at(spans[first].start);
        }
        Range::new(spans[first].start, spans[last].end)
    }

    /// Number of `granularity` matches in `text`.
    pub fn count(&self, text: &str, granularity: Granularity) -> usize {
        split_matches(text, granularity, self.delimiter).len()
    }
}

/// Spans of every match of `granularity` in `text`, in order.
///
/// A trailing item delimiter or newline does not open an extra empty match,
/// and empty text has no items or lines.
pub fn split_matches(text: &str, granularity: Granularity, delimiter: char) -> Vec<Range> {
    match granularity {
        Granularity::Character => text
            .char_indices()
            .map(|(idx, ch)| Range::new(idx, idx + ch.len_utf8()))
            .collect(),
        Granularity::Word => {
            let mut spans = Vec::new();
            let mut start = None;
            for (idx, ch) in text.char_indices() {
                match (ch.is_whitespace(), start) {
                    (false, None) => start = Some(idx),
                    (true, Some(begin)) => {
                        spans.push(Range::new(begin, idx));
                        start = None;
                    }
                    _ => {}
                }
            }
            if let Some(begin) = start {
                spans.push(Range::new(begin, text.len()));
            }
            spans
        }
        Granularity::Item => split_delimited(text, delimiter),
        Granularity::Line => split_delimited(text, '\n'),
    }
}

fn split_delimited(text: &str, delimiter: char) -> Vec<Range> {
    let mut spans = Vec::new();
    if text.is_empty() {
        return spans;
    }
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if ch == delimiter {
            spans.push(Range::new(start, idx));
            start = idx + ch.len_utf8();
        }
    }
    if start < text.len() {
        spans.push(Range::new(start, text.len()));
    }
    spans
}

impl Value {
    /// The text covered by `chunk`.
    pub fn get_chunk(&self, chunk: &Chunk, resolver: &mut ChunkResolver<'_>) -> Value {
        let text = self.string_value();
        let range = resolver.resolve(&text, chunk);
        Value::Text(text[range.start..range.end].to_string())
    }

    /// A copy of this value with `replacement` placed into, before or after `chunk`.
    pub fn set_chunk(
        &self,
        preposition: Preposition,
        chunk: &Chunk,
        replacement: &Value,
        resolver: &mut ChunkResolver<'_>,
    ) -> Value {
        let text = self.string_value();
        let range = resolver.resolve(&text, chunk);
        Value::Text(splice(&text, range, preposition, &replacement.string_value()))
    }

    /// Number of `granularity` matches in the text form.
    pub fn count_chunks(&self, granularity: Granularity, delimiter: char) -> usize {
        split_matches(&self.string_value(), granularity, delimiter).len()
    }

    /// The matches of `granularity`, reordered under `style` and rejoined.
    pub fn sort_chunks(
        &self,
        granularity: Granularity,
        style: SortStyle,
        descending: bool,
        delimiter: char,
    ) -> Value {
        let text = self.string_value();
        let mut parts: Vec<Value> = split_matches(&text, granularity, delimiter)
            .into_iter()
            .map(|range| Value::text(&text[range.start..range.end]))
            .collect();
        parts.sort_by(|lhs, rhs| {
            let order = lhs.compare(rhs, style);
            if descending { order.reverse() } else { order }
        });
        let joined = parts
            .iter()
            .map(Value::string_value)
            .collect::<Vec<_>>()
            .join(&granularity.separator(delimiter));
        Value::Text(joined)
    }
}

/// Place `insert` relative to `range` of `text`.
pub fn splice(text: &str, range: Range, preposition: Preposition, insert: &str) -> String {
    let (cut_start, cut_end) = match preposition {
        Preposition::Into => (range.start, range.end),
        Preposition::Before => (range.start, range.start),
        Preposition::After => (range.end, range.end),
    };
    let mut out = String::with_capacity(text.len() + insert.len());
    out.push_str(&text[..cut_start]);
    out.push_str(insert);
    out.push_str(&text[cut_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ordinal::FixedSource;

    fn nth(granularity: Granularity, position: i64) -> Chunk {
        Chunk::nth(granularity, position).unwrap()
    }

    fn resolve(text: &str, chunk: &Chunk) -> Range {
        let mut source = FixedSource(0);
        ChunkResolver::new(DEFAULT_ITEM_DELIMITER, &mut source).resolve(text, chunk)
    }

    fn slice<'t>(text: &'t str, chunk: &Chunk) -> &'t str {
        let range = resolve(text, chunk);
        &text[range.start..range.end]
    }

    #[test]
    fn simple_granularities() {
        let text = "one two\nthree, four";
        assert_eq!(slice(text, &nth(Granularity::Character, 5)), "t");
        assert_eq!(slice(text, &nth(Granularity::Word, 3)), "three,");
        assert_eq!(slice(text, &nth(Granularity::Item, 2)), " four");
        assert_eq!(slice(text, &nth(Granularity::Line, 1)), "one two");
    }

    #[test]
    fn ranges_span_from_first_to_last_match() {
        let chunk = nth(Granularity::Word, 2).through(Ordinal::nth(3).unwrap());
        assert_eq!(slice("the quick brown fox", &chunk), "quick brown");

        let clamped = nth(Granularity::Item, 2).through(Ordinal::nth(99).unwrap());
        assert_eq!(slice("a,b,c", &clamped), "b,c");

        let backwards = nth(Granularity::Character, 3).through(Ordinal::nth(1).unwrap());
        assert_eq!(resolve("abcdef", &backwards), Range::empty_at(2));
    }

    #[test]
    fn out_of_range_is_empty_at_end() {
        assert_eq!(resolve("a,b", &nth(Granularity::Item, 5)), Range::empty_at(3));
        assert_eq!(resolve("", &nth(Granularity::Word, 1)), Range::empty_at(0));
        assert_eq!(
            resolve("x y", &Chunk::new(Granularity::Line, Ordinal::Last).within(nth(Granularity::Word, 9))),
            Range::empty_at(3)
        );
    }

    #[test]
    fn nested_chunks_resolve_container_first() {
        let text = "alpha beta\ngamma delta epsilon\nzeta";
        let chunk = nth(Granularity::Character, 2)
            .within(nth(Granularity::Word, 3))
            .within(nth(Granularity::Line, 2));
        assert_eq!(chunk.depth(), 3);
        let range = resolve(text, &chunk);
        // line 2 starts at 11, word 3 ("epsilon") at 12 within it, char 2 one further.
        assert_eq!(range, Range::new(11 + 12 + 1, 11 + 12 + 2));
        assert_eq!(&text[range.start..range.end], "p");
    }

    #[test]
    fn word_of_item_matches_manual_offsets() {
        let text = "the quick brown fox";
        let chunk = nth(Granularity::Word, 2).within(nth(Granularity::Item, 1));
        let item = resolve(text, &nth(Granularity::Item, 1));
        let word = resolve(&text[item.start..item.end], &nth(Granularity::Word, 2));
        assert_eq!(
            resolve(text, &chunk),
            Range::new(item.start + word.start, item.start + word.end)
        );
    }

    #[test]
    fn symbolic_ordinals() {
        let text = "a,b,c,d,e";
        assert_eq!(slice(text, &Chunk::new(Granularity::Item, Ordinal::Last)), "e");
        assert_eq!(slice(text, &Chunk::new(Granularity::Item, Ordinal::Middle)), "c");
        let mut source = FixedSource(3);
        let range = ChunkResolver::new(',', &mut source)
            .resolve(text, &Chunk::new(Granularity::Item, Ordinal::Any));
        assert_eq!(&text[range.start..range.end], "d");
    }

    #[test]
    fn custom_delimiter_and_trailing_separators() {
        let mut source = FixedSource(0);
        let mut resolver = ChunkResolver::new(';', &mut source);
        assert_eq!(resolver.count("a;b;", Granularity::Item), 2);
        assert_eq!(resolver.count("a,b;c", Granularity::Item), 2);
        assert_eq!(resolver.count("", Granularity::Line), 0);
        assert_eq!(resolver.count("one\n\nthree", Granularity::Line), 3);
    }

    #[test]
    fn multibyte_characters_stay_on_boundaries() {
        assert_eq!(slice("héllo wörld", &nth(Granularity::Character, 2)), "é");
        assert_eq!(slice("héllo wörld", &nth(Granularity::Word, 2)), "wörld");
    }

    #[test]
    fn set_chunk_prepositions() {
        let mut source = FixedSource(0);
        let mut resolver = ChunkResolver::new(',', &mut source);
        let value = Value::text("alpha,beta,gamma");
        let item = nth(Granularity::Item, 2);

        assert_eq!(value.get_chunk(&item, &mut resolver), Value::text("beta"));
        assert_eq!(
            value.set_chunk(Preposition::Into, &item, &Value::text("BETA"), &mut resolver),
            Value::text("alpha,BETA,gamma")
        );
        assert_eq!(
            value.set_chunk(Preposition::Before, &item, &Value::text(">"), &mut resolver),
            Value::text("alpha,>beta,gamma")
        );
        assert_eq!(
            value.set_chunk(Preposition::After, &item, &Value::text("<"), &mut resolver),
            Value::text("alpha,beta<,gamma")
        );
        // The receiver is untouched.
        assert_eq!(value, Value::text("alpha,beta,gamma"));
    }

    #[test]
    fn sorting_chunks() {
        let value = Value::text("10\n9\nbanana\nApple");
        assert_eq!(
            value.sort_chunks(Granularity::Line, SortStyle::Numeric, false, ','),
            Value::text("9\n10\nApple\nbanana")
        );
        assert_eq!(
            Value::text("c,a,b").sort_chunks(Granularity::Item, SortStyle::Text, true, ','),
            Value::text("c,b,a")
        );
    }

    #[test]
    fn display_reads_like_script() {
        let chunk = nth(Granularity::Word, 2)
            .through(Ordinal::Last)
            .within(nth(Granularity::Line, 4));
        assert_eq!(chunk.to_string(), "word 2 to last of line 4");
    }
}
