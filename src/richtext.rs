//! Caption parsing: split free text into plain text plus hashtag segments.
//!
//! Hashtags are pulled out of the caption wherever they appear and re-appended
//! at the end, each preceded by a single space, so that the publisher can turn
//! them into clickable tags:
//!
//! ```
//! use postbridge::richtext::{Segment, build_styled_text};
//!
//! let styled = build_styled_text("#cat cute");
//! assert_eq!(styled.text(), "cute #cat");
//! assert_eq!(styled.segments()[2], Segment::tag("#cat", "cat"));
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("valid regex"));

/// One run of caption text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Plain { text: String },
    /// `text` is the token as displayed (with `#`), `tag` the value without it.
    Tag { text: String, tag: String },
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Segment::Plain { text: text.into() }
    }

    pub fn tag(text: impl Into<String>, tag: impl Into<String>) -> Self {
        Segment::Tag {
            text: text.into(),
            tag: tag.into(),
        }
    }

    /// Display text of the segment.
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain { text } | Segment::Tag { text, .. } => text,
        }
    }
}

/// A hashtag located by UTF-8 byte range within [`StyledText::text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpan {
    pub byte_start: usize,
    pub byte_end: usize,
    pub tag: String,
}

/// Ordered sequence of plain and tagged segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyledText {
    segments: Vec<Segment>,
}

impl StyledText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plain segment.
    pub fn push_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.segments.push(Segment::plain(text));
        self
    }

    /// Append a tagged segment.
    pub fn push_tag(&mut self, text: impl Into<String>, tag: impl Into<String>) -> &mut Self {
        self.segments.push(Segment::tag(text, tag));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Concatenation of every segment's display text.
    pub fn text(&self) -> String {
        self.segments.iter().map(Segment::text).collect()
    }

    /// Tag segments with their byte offsets in [`StyledText::text`].
    pub fn tag_spans(&self) -> Vec<TagSpan> {
        let mut offset = 0;
        let mut spans = Vec::new();
        for segment in &self.segments {
            let len = segment.text().len();
            if let Segment::Tag { tag, .. } = segment {
                spans.push(TagSpan {
                    byte_start: offset,
                    byte_end: offset + len,
                    tag: tag.clone(),
                });
            }
            offset += len;
        }
        spans
    }
}

/// Build styled text from a raw caption.
///
/// Every `#word` token is removed from the caption, the remainder is trimmed
/// (internal whitespace is left alone) and emitted as one plain segment. Each
/// token then follows in discovery order as `" "` plus a tag segment.
pub fn build_styled_text(raw_caption: &str) -> StyledText {
    let hashtags: Vec<&str> = HASHTAG_RE
        .find_iter(raw_caption)
        .map(|m| m.as_str())
        .collect();
    let clean_message = HASHTAG_RE.replace_all(raw_caption, "");

    let mut styled = StyledText::new();
    styled.push_text(clean_message.trim());
    for hashtag in hashtags {
        styled.push_text(" ").push_tag(hashtag, hashtag.trim_start_matches('#'));
    }
    styled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_without_hashtags_is_single_trimmed_segment() {
        let styled = build_styled_text("  just a photo dump  ");
        assert_eq!(styled.segments(), &[Segment::plain("just a photo dump")]);
    }

    #[test]
    fn hashtags_are_removed_without_collapsing_whitespace() {
        let styled = build_styled_text("Hello #World foo #bar2");
        assert_eq!(
            styled.segments(),
            &[
                Segment::plain("Hello  foo"),
                Segment::plain(" "),
                Segment::tag("#World", "World"),
                Segment::plain(" "),
                Segment::tag("#bar2", "bar2"),
            ]
        );
    }

    #[test]
    fn leading_hashtag_moves_to_the_end() {
        let styled = build_styled_text("#cat cute");
        assert_eq!(
            styled.segments(),
            &[
                Segment::plain("cute"),
                Segment::plain(" "),
                Segment::tag("#cat", "cat"),
            ]
        );
        assert_eq!(styled.text(), "cute #cat");
    }

    #[test]
    fn trailing_hashtags_round_trip() {
        let caption = "  sunny day #beach #summer ";
        let styled = build_styled_text(caption);
        assert_eq!(styled.text(), caption.trim());
    }

    #[test]
    fn empty_caption_yields_one_empty_segment() {
        assert_eq!(build_styled_text("").segments(), &[Segment::plain("")]);
        assert_eq!(build_styled_text(" \n\t ").segments(), &[Segment::plain("")]);
    }

    #[test]
    fn hashtag_only_caption() {
        let styled = build_styled_text("#a_b #c");
        assert_eq!(styled.text(), " #a_b #c");
        assert_eq!(styled.tag_spans().len(), 2);
    }

    #[test]
    fn bare_hash_is_plain_text() {
        let styled = build_styled_text("issue # 5 and #");
        assert_eq!(styled.segments(), &[Segment::plain("issue # 5 and #")]);
    }

    #[test]
    fn matching_is_greedy_over_unicode_word_characters() {
        let styled = build_styled_text("朝ごはん #東京グルメ!");
        assert_eq!(
            styled.segments(),
            &[
                Segment::plain("朝ごはん !"),
                Segment::plain(" "),
                Segment::tag("#東京グルメ", "東京グルメ"),
            ]
        );
    }

    #[test]
    fn tag_spans_use_utf8_byte_offsets() {
        let styled = build_styled_text("café #crème");
        let text = styled.text();
        let spans = styled.tag_spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(&text[span.byte_start..span.byte_end], "#crème");
        assert_eq!(span.tag, "crème");
        assert_eq!(span.byte_start, "café ".len());
    }

    #[test]
    fn segments_serialize_with_kind() {
        let json = serde_json::to_value(build_styled_text("#x")).unwrap();
        assert_eq!(json["segments"][2]["kind"], "tag");
        assert_eq!(json["segments"][2]["tag"], "x");
    }
}
