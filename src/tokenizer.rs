use std::collections::HashMap;

use crate::error::Error;
use crate::source::PeekRead;

/// Object handle: (object number, generation number).
pub type ObjKey = (u32, u16);

/// One lexical item of the PDF object grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Comment(Vec<u8>),
    Name(String),
    Token(String),
    Text(Vec<TextPart>),
    HexData(String),
    CodeStream(Vec<u8>),
    Array(Vec<Item>),
    Dictionary(HashMap<String, Item>),
    Ref { key: ObjKey, kind: RefKind },
    End(u8),
    Null,
}

/// Pieces of a parenthesized string: literal byte runs interleaved with hex
/// code points produced from octal escapes.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Literal(Vec<u8>),
    Code(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// `N G R` — a pointer to an object.
    Indirect,
    /// `N G obj` — the start of an object body.
    Header,
}

/// The vast majority of references are 9 bytes or less; 12 covers multi-digit
/// object numbers without over-reading.
const REF_LOOKAHEAD: usize = 12;

pub struct Lexer<S> {
    src: S,
}

impl<S: PeekRead> Lexer<S> {
    pub fn new(src: S) -> Lexer<S> {
        Lexer { src }
    }

    /// Produces the next lexical item, or `None` at clean end of input.
    pub fn next_item(&mut self) -> Result<Option<Item>, Error> {
        self.skip_whitespace()?;
        if self.peek_byte()?.is_none() {
            return Ok(None);
        }
        let item = self.read_value()?;
        if let Item::End(_) = item {
            // Stray closing delimiter outside any structure; consume it so
            // the caller makes progress.
            self.src.read_byte()?;
        }
        Ok(Some(item))
    }

    /// Raw stream body read, used by the object assembler once the `stream`
    /// keyword has positioned the cursor on the first payload byte.
    pub fn read_stream(&mut self, length: usize) -> Result<Vec<u8>, Error> {
        self.src.read_bytes(length)
    }

    /// Fallback stream read for objects whose `/Length` is unusable: scan
    /// forward to the `endstream` keyword.
    pub fn read_to_endstream(&mut self) -> Result<Vec<u8>, Error> {
        self.src.read_until(b"endstream")
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, Error> {
        let window = self.src.peek(1)?;
        Ok(window.first().copied())
    }

    fn skip_whitespace(&mut self) -> Result<(), Error> {
        while let Some(byte) = self.peek_byte()? {
            if !is_whitespace(byte) {
                break;
            }
            self.src.read_byte()?;
        }
        Ok(())
    }

    /// One value, dispatched on the first non-whitespace byte. Closing
    /// delimiters are returned as `End` without being consumed so enclosing
    /// structures can see their own terminator.
    fn read_value(&mut self) -> Result<Item, Error> {
        self.skip_whitespace()?;
        let byte = self.peek_byte()?.ok_or(Error::UnexpectedEof)?;
        match byte {
            b'(' => {
                self.src.read_byte()?;
                self.read_text()
            }
            b'<' => {
                let double = {
                    let window = self.src.peek(2)?;
                    window.len() == 2 && window[1] == b'<'
                };
                self.src.read_byte()?;
                if double {
                    self.src.read_byte()?;
                    self.read_dictionary()
                } else {
                    self.read_hex()
                }
            }
            b'[' => {
                self.src.read_byte()?;
                self.read_array()
            }
            b'{' => {
                self.src.read_byte()?;
                self.read_code_stream()
            }
            b'/' => Ok(Item::Name(self.read_name()?)),
            b'%' => {
                self.src.read_byte()?;
                self.read_comment()
            }
            b')' | b'>' | b']' | b'}' => Ok(Item::End(byte)),
            _ => self.read_token_or_ref(),
        }
    }

    fn read_text(&mut self) -> Result<Item, Error> {
        let mut raw = Vec::new();
        loop {
            let byte = self.src.read_byte()?;
            if byte == b')' {
                if raw.last() == Some(&b'\\') {
                    // Escaped parenthesis: absorb it and keep collecting.
                    raw.push(b')');
                    continue;
                }
                break;
            }
            raw.push(byte);
        }
        Ok(Item::Text(split_text_parts(&raw)))
    }

    fn read_hex(&mut self) -> Result<Item, Error> {
        let mut out = String::new();
        loop {
            let byte = self.src.read_byte()?;
            if byte == b'>' {
                break;
            }
            if byte.is_ascii_hexdigit() {
                out.push(byte.to_ascii_uppercase() as char);
            }
        }
        if out.len() % 2 == 1 {
            out.push('0');
        }
        Ok(Item::HexData(out))
    }

    fn read_code_stream(&mut self) -> Result<Item, Error> {
        let mut out = Vec::new();
        loop {
            let byte = self.src.read_byte()?;
            if byte == b'}' {
                break;
            }
            out.push(byte);
        }
        Ok(Item::CodeStream(out))
    }

    fn read_name(&mut self) -> Result<String, Error> {
        let mut out = vec![self.src.read_byte()?];
        while let Some(byte) = self.peek_byte()? {
            if is_whitespace(byte) || is_delim(byte) {
                break;
            }
            out.push(byte);
            self.src.read_byte()?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn read_comment(&mut self) -> Result<Item, Error> {
        let mut out = Vec::new();
        while let Some(byte) = self.peek_byte()? {
            if byte == b'\r' || byte == b'\n' {
                break;
            }
            out.push(byte);
            self.src.read_byte()?;
        }
        Ok(Item::Comment(out))
    }

    fn read_array(&mut self) -> Result<Item, Error> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace()?;
            match self.peek_byte()? {
                None => return Err(Error::UnexpectedEof),
                Some(b']') => {
                    self.src.read_byte()?;
                    break;
                }
                Some(_) => {}
            }
            match self.read_value()? {
                Item::End(_) => {
                    // Mismatched closer inside the array; skip it rather
                    // than loop on the same byte.
                    self.src.read_byte()?;
                }
                Item::Text(parts) => {
                    // String parts become individual elements so the text
                    // renderer sees literals and code points uniformly.
                    for part in parts {
                        match part {
                            TextPart::Literal(v) => {
                                items.push(Item::Text(vec![TextPart::Literal(v)]))
                            }
                            TextPart::Code(hex) => items.push(Item::HexData(hex)),
                        }
                    }
                }
                other => items.push(other),
            }
        }
        Ok(Item::Array(items))
    }

    fn read_dictionary(&mut self) -> Result<Item, Error> {
        let mut dict = HashMap::new();
        loop {
            self.skip_whitespace()?;
            let (first, closing) = {
                let window = self.src.peek(2)?;
                if window.is_empty() {
                    return Err(Error::UnexpectedEof);
                }
                (window[0], window == b">>")
            };
            if closing {
                self.src.read_byte()?;
                self.src.read_byte()?;
                break;
            }
            if first != b'/' {
                return Err(Error::Protocol(format!(
                    "dictionary key must be a name, found byte 0x{:02X}",
                    first
                )));
            }
            let key = self.read_name()?;
            match self.read_value()? {
                // A name followed directly by the closing `>>` has no value.
                Item::End(_) => {
                    dict.insert(key, Item::Null);
                }
                value => {
                    dict.insert(key, value);
                }
            }
        }
        Ok(Item::Dictionary(dict))
    }

    fn read_token_or_ref(&mut self) -> Result<Item, Error> {
        if let Some(reference) = self.try_object_ref()? {
            return Ok(reference);
        }
        let token = self.read_token_word()?;
        if token == "stream" {
            self.consume_stream_eol()?;
        }
        Ok(Item::Token(token))
    }

    /// Attempts to recognize `N G R` or `N G obj` in a bounded peek window.
    /// On success exactly the bytes used are consumed; on failure nothing is.
    fn try_object_ref(&mut self) -> Result<Option<Item>, Error> {
        let window: Vec<u8> = self.src.peek(REF_LOOKAHEAD)?.to_vec();
        let truncated = window.len() == REF_LOOKAHEAD;
        let mut tokens: Vec<String> = Vec::new();
        let mut run: Vec<u8> = Vec::new();
        let mut used = 0usize;
        for &byte in &window {
            used += 1;
            if is_regular(byte) {
                run.push(byte);
                continue;
            }
            if !run.is_empty() {
                tokens.push(String::from_utf8_lossy(&run).into_owned());
                run.clear();
            }
            if is_delim(byte) {
                used -= 1;
                break;
            }
            if tokens.len() == 3 {
                break;
            }
        }
        if !run.is_empty() && !truncated {
            // The window ended at end of input, so the trailing run is a
            // complete token; a reference at the last bytes of the file is
            // still recognized.
            tokens.push(String::from_utf8_lossy(&run).into_owned());
        }
        if tokens.len() < 3 || (tokens[2] != "R" && tokens[2] != "obj") {
            return Ok(None);
        }
        let Ok(number) = tokens[0].parse::<u32>() else {
            return Ok(None);
        };
        let Ok(generation) = tokens[1].parse::<u16>() else {
            return Ok(None);
        };
        self.src.read_bytes(used)?;
        let kind = if tokens[2] == "R" {
            RefKind::Indirect
        } else {
            RefKind::Header
        };
        Ok(Some(Item::Ref {
            key: (number, generation),
            kind,
        }))
    }

    fn read_token_word(&mut self) -> Result<String, Error> {
        let mut out = Vec::new();
        while let Some(byte) = self.peek_byte()? {
            if !is_regular(byte) {
                break;
            }
            out.push(byte);
            self.src.read_byte()?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// After the `stream` keyword one byte of end-of-line is consumed; a CR
    /// must be followed by LF (section 3.2.7). The cursor is left on the
    /// first raw byte of the stream body.
    fn consume_stream_eol(&mut self) -> Result<(), Error> {
        if self.src.read_byte()? == b'\r' && self.src.read_byte()? != b'\n' {
            return Err(Error::Protocol(
                "expected LF after CR following stream keyword".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits a collected string run on backslash escapes. Octal escapes become
/// `Code` parts holding the two-digit uppercase hex of the code point, so
/// downstream cmap lookup sees them uniformly with `<...>` hex strings.
fn split_text_parts(raw: &[u8]) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut literal = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        if byte != b'\\' {
            literal.push(byte);
            i += 1;
            continue;
        }
        if i + 1 >= raw.len() {
            break;
        }
        let next = raw[i + 1];
        match next {
            b'0'..=b'7' => {
                let mut value: u16 = 0;
                let mut digits = 0;
                while digits < 3 && i + 1 + digits < raw.len() {
                    let digit = raw[i + 1 + digits];
                    if !(b'0'..=b'7').contains(&digit) {
                        break;
                    }
                    value = (value << 3) | (digit - b'0') as u16;
                    digits += 1;
                }
                if !literal.is_empty() {
                    parts.push(TextPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(TextPart::Code(format!("{:02X}", value & 0xFF)));
                i += 1 + digits;
            }
            b'\n' => i += 2,
            b'\r' => {
                i += 2;
                if i < raw.len() && raw[i] == b'\n' {
                    i += 1;
                }
            }
            _ => {
                literal.push(match next {
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'b' => 0x08,
                    b'f' => 0x0C,
                    other => other,
                });
                i += 2;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(TextPart::Literal(literal));
    }
    parts
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\x00' | b'\x09' | b'\x0a' | b'\x0c' | b'\x0d' | b' ')
}

pub(crate) fn is_delim(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub(crate) fn is_regular(byte: u8) -> bool {
    !(is_delim(byte) || is_whitespace(byte))
}
