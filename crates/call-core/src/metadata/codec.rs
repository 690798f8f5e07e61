//! `SInfo:` wire format
//!
//! ```text
//! SInfo:TTTTvalue|TTTTvalue|...
//! ```
//!
//! `TTTT` is a zero-padded decimal tag. A `|` inside a value is doubled.
//! Numbers are written unsigned and zero-padded: 5 digits for 8 and 16 bit
//! values, at least 8 digits for 32 bit values. Signed values are sent as
//! their unsigned bit pattern.

use crate::errors::MetadataError;
use std::fmt::Write;

pub const HEADER: &str = "SInfo:";

const TAG_WIDTH: usize = 4;
const SMALL_WIDTH: usize = 5;
const WIDE_WIDTH: usize = 8;
const TERMINATOR: char = '|';

/// Builds an element list
#[derive(Debug, Default, Clone)]
pub struct MetadataWriter {
    buf: String,
}

impl MetadataWriter {
    /// Writer whose output starts with [`HEADER`]
    pub fn new() -> Self {
        Self { buf: HEADER.to_string() }
    }

    /// Writer without the header, for embedding element lists
    pub fn bare() -> Self {
        Self::default()
    }

    fn tag(&mut self, tag: u16) {
        let _ = write!(self.buf, "{:0width$}", tag, width = TAG_WIDTH);
    }

    fn number(&mut self, tag: u16, value: u32, width: usize) -> &mut Self {
        self.tag(tag);
        let _ = write!(self.buf, "{:0width$}", value, width = width);
        self.buf.push(TERMINATOR);
        self
    }

    pub fn u8(&mut self, tag: u16, value: u8) -> &mut Self {
        self.number(tag, value.into(), SMALL_WIDTH)
    }

    pub fn u16(&mut self, tag: u16, value: u16) -> &mut Self {
        self.number(tag, value.into(), SMALL_WIDTH)
    }

    pub fn u32(&mut self, tag: u16, value: u32) -> &mut Self {
        self.number(tag, value, WIDE_WIDTH)
    }

    pub fn i8(&mut self, tag: u16, value: i8) -> &mut Self {
        self.u8(tag, value as u8)
    }

    pub fn i16(&mut self, tag: u16, value: i16) -> &mut Self {
        self.u16(tag, value as u16)
    }

    pub fn i32(&mut self, tag: u16, value: i32) -> &mut Self {
        self.u32(tag, value as u32)
    }

    pub fn bool(&mut self, tag: u16, value: bool) -> &mut Self {
        self.tag(tag);
        self.buf.push(if value { '1' } else { '0' });
        self.buf.push(TERMINATOR);
        self
    }

    /// Text element; nothing is written for an empty value
    pub fn str(&mut self, tag: u16, value: &str) -> &mut Self {
        if value.is_empty() {
            return self;
        }
        self.tag(tag);
        for ch in value.chars() {
            if ch == TERMINATOR {
                self.buf.push(TERMINATOR);
            }
            self.buf.push(ch);
        }
        self.buf.push(TERMINATOR);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// One decoded element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: u16,
    pub value: String,
}

impl Element {
    /// Value as a C-style integer: leading digits, 0 when there are none
    pub fn int(&self) -> i32 {
        leading_int(&self.value)
    }
}

fn leading_int(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i64 = 0;
    for byte in digits.bytes().take_while(u8::is_ascii_digit) {
        value = (value * 10 + i64::from(byte - b'0')).min(i64::from(u32::MAX));
    }
    let value = if negative { -value } else { value };
    value as i32
}

/// Iterator over the elements of a header-less element list.
///
/// Yields an error and then stops when an element is malformed.
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    rest: &'a str,
    failed: bool,
}

impl<'a> Elements<'a> {
    pub fn new(body: &'a str) -> Self {
        Self { rest: body, failed: false }
    }
}

/// Byte offset of the terminating `|`, skipping doubled ones
fn terminator_find(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'|' {
            if bytes.get(pos + 1) == Some(&b'|') {
                pos += 2;
                continue;
            }
            return Some(pos);
        }
        pos += 1;
    }
    None
}

fn element_parse(text: &str) -> Result<(Element, usize), MetadataError> {
    let end = terminator_find(text).ok_or(MetadataError::MissingTerminator)?;
    let raw = &text[..end];
    if raw.len() < TAG_WIDTH || !raw.is_char_boundary(TAG_WIDTH) {
        return Err(MetadataError::ElementTooShort);
    }
    let (tag_text, value) = raw.split_at(TAG_WIDTH);
    let tag = leading_int(tag_text).clamp(0, i32::from(u16::MAX)) as u16;
    let element = Element { tag, value: value.replace("||", "|") };
    Ok((element, end + 1))
}

impl<'a> Iterator for Elements<'a> {
    type Item = Result<Element, MetadataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        match element_parse(self.rest) {
            Ok((element, consumed)) => {
                self.rest = &self.rest[consumed..];
                Some(Ok(element))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Strip the header from a received metadata string
pub fn strip_header(text: &str) -> Result<&str, MetadataError> {
    text.strip_prefix(HEADER).ok_or_else(|| MetadataError::MissingHeader {
        received: text.chars().take(HEADER.len()).collect(),
    })
}

/// Decode a complete metadata string
pub fn parse(text: &str) -> Result<Vec<Element>, MetadataError> {
    Elements::new(strip_header(text)?).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GOLDEN: &str = "00004294967295|00012147483647|000265535|000332767|000400255|000500127|\
000600000000|00074294967295|000800000|000965535|001000000|001100255|00121|00130|0015A|0016|||\
0017|||||0018Single pipe test || with text|0019Double pipe test |||| with text|";

    #[test]
    fn writer_matches_reference_encoding() {
        let mut writer = MetadataWriter::bare();
        writer
            .i32(0, -1)
            .i32(1, i32::MAX)
            .i16(2, -1)
            .i16(3, i16::MAX)
            .i8(4, -1)
            .i8(5, i8::MAX)
            .u32(6, 0)
            .u32(7, u32::MAX)
            .u16(8, 0)
            .u16(9, u16::MAX)
            .u8(10, 0)
            .u8(11, u8::MAX)
            .bool(12, true)
            .bool(13, false)
            .str(14, "")
            .str(15, "A")
            .str(16, "|")
            .str(17, "||")
            .str(18, "Single pipe test | with text")
            .str(19, "Double pipe test || with text");
        assert_eq!(writer.as_str(), GOLDEN);
    }

    #[test]
    fn reader_decodes_reference_encoding() {
        let elements: Vec<Element> = Elements::new(GOLDEN).collect::<Result<_, _>>().unwrap();
        assert_eq!(elements.len(), 19);
        assert_eq!(elements[0], Element { tag: 0, value: "4294967295".into() });
        assert_eq!(elements[14].value, "A");
        assert_eq!(elements[15], Element { tag: 16, value: "|".into() });
        assert_eq!(elements[16].value, "||");
        assert_eq!(elements[17].value, "Single pipe test | with text");
        assert_eq!(elements[18].value, "Double pipe test || with text");
        assert_eq!(elements[4].int(), 255);
    }

    #[test]
    fn header_is_required() {
        assert_eq!(parse("SInfo:").unwrap(), vec![]);
        assert_eq!(
            parse("Hello:0008abc|"),
            Err(MetadataError::MissingHeader { received: "Hello:".into() })
        );
        assert!(MetadataWriter::new().str(8, "1.2.3.4").as_str().starts_with(HEADER));
    }

    #[test]
    fn malformed_elements_stop_the_iteration() {
        let mut elements = Elements::new("0008ab|0008cd");
        assert_eq!(elements.next(), Some(Ok(Element { tag: 8, value: "ab".into() })));
        assert_eq!(elements.next(), Some(Err(MetadataError::MissingTerminator)));
        assert_eq!(elements.next(), None);

        assert_eq!(parse("SInfo:008|"), Err(MetadataError::ElementTooShort));
    }

    #[test]
    fn empty_value_decodes_to_empty_string() {
        assert_eq!(parse("SInfo:0041|").unwrap(), vec![Element { tag: 41, value: String::new() }]);
    }

    #[test]
    fn leading_int_behaves_like_atoi() {
        assert_eq!(leading_int("12ab"), 12);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int("-3"), -3);
        assert_eq!(leading_int("4294967295"), -1);
    }
}
