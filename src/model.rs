use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use crate::error::Error;
use crate::tokenizer::{Item, ObjKey, TextPart};

/// A PDF indirect object: a numbered, generation-tagged container of an
/// optional dictionary, loose values and an optional raw byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub key: ObjKey,
    pub dict: Option<HashMap<String, Item>>,
    pub values: Vec<Item>,
    pub stream: Option<Vec<u8>>,
    pub is_stream_decoded: bool,
}

impl Object {
    pub fn new(key: ObjKey) -> Object {
        Object {
            key,
            dict: None,
            values: Vec::new(),
            stream: None,
            is_stream_decoded: false,
        }
    }

    pub fn ref_string(&self) -> String {
        format!("{} {}", self.key.0, self.key.1)
    }

    pub fn search(&self, name: &str) -> Option<&Item> {
        self.dict.as_ref()?.get(name)
    }

    pub fn name(&self, key: &str) -> Option<&str> {
        match self.search(key)? {
            Item::Name(v) => Some(v),
            _ => None,
        }
    }

    /// Integer-valued entry; numbers surface from the lexer as tokens.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.search(key)? {
            Item::Token(v) => v.parse().ok(),
            _ => None,
        }
    }

    pub fn object_ref(&self, key: &str) -> Option<ObjKey> {
        match self.search(key)? {
            Item::Ref { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn array(&self, key: &str) -> Option<&[Item]> {
        match self.search(key)? {
            Item::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        self.name("/Type")
    }

    pub fn stream_length(&self) -> Option<usize> {
        let length = self.int("/Length")?;
        if length <= 0 {
            return None;
        }
        usize::try_from(length).ok()
    }

    /// `/Filter` as a single name, or the first element of a filter array.
    pub fn filter_name(&self) -> Option<&str> {
        match self.search("/Filter")? {
            Item::Name(v) => Some(v),
            Item::Array(items) => match items.first()? {
                Item::Name(v) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }

    /// A finished object whose dictionary carries `/Root` is a trailer in
    /// disguise (xref-stream style documents end this way).
    pub fn as_trailer(&self) -> Option<Trailer> {
        self.search("/Root")?;
        self.dict.as_ref().map(Trailer::from_dict)
    }

    /// Decodes the stream buffer in place. Only `/FlateDecode` is known;
    /// anything else is a decode error so the failure latch can engage
    /// instead of garbage flowing into the text layer.
    pub fn decode_stream(&mut self) -> Result<(), Error> {
        if self.is_stream_decoded || self.stream.is_none() {
            return Ok(());
        }
        match self.filter_name().map(str::to_string).as_deref() {
            None => {
                self.is_stream_decoded = true;
                Ok(())
            }
            Some("/FlateDecode") => {
                let decoded = flate_decode(self.stream.as_deref().unwrap_or(&[]))?;
                self.stream = Some(decoded);
                self.is_stream_decoded = true;
                Ok(())
            }
            Some(other) => Err(Error::Decode(format!("unsupported filter {}", other))),
        }
    }
}

/// Canonical serialization, used for debug dumps. Stream bytes are not
/// included. ASCII literals round-trip through the lexer; everything else
/// is written as octal escapes.
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} obj", self.ref_string())?;
        if let Some(dict) = &self.dict {
            write_dict(f, dict)?;
            writeln!(f)?;
        }
        for value in &self.values {
            write_item(f, value)?;
            writeln!(f)?;
        }
        write!(f, "endobj")
    }
}

fn write_dict(f: &mut fmt::Formatter<'_>, dict: &HashMap<String, Item>) -> fmt::Result {
    write!(f, "<<")?;
    for (key, value) in dict {
        write!(f, " {} ", key)?;
        write_item(f, value)?;
    }
    write!(f, " >>")
}

fn write_item(f: &mut fmt::Formatter<'_>, item: &Item) -> fmt::Result {
    match item {
        Item::Comment(bytes) => writeln!(f, "%{}", String::from_utf8_lossy(bytes)),
        Item::Name(name) => write!(f, "{}", name),
        Item::Token(tok) => write!(f, "{}", tok),
        Item::Text(parts) => write_text(f, parts),
        Item::HexData(hex) => write!(f, "<{}>", hex),
        Item::CodeStream(bytes) => write!(f, "{{{}}}", String::from_utf8_lossy(bytes)),
        Item::Array(items) => {
            write!(f, "[")?;
            for (i, element) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write_item(f, element)?;
            }
            write!(f, "]")
        }
        Item::Dictionary(dict) => write_dict(f, dict),
        Item::Ref { key, .. } => write!(f, "{} {} R", key.0, key.1),
        Item::End(byte) => write!(f, "{}", *byte as char),
        Item::Null => write!(f, "null"),
    }
}

fn write_text(f: &mut fmt::Formatter<'_>, parts: &[TextPart]) -> fmt::Result {
    write!(f, "(")?;
    for part in parts {
        match part {
            TextPart::Literal(bytes) => {
                for &byte in bytes {
                    match byte {
                        b'\\' | b'(' | b')' => write!(f, "\\{}", byte as char)?,
                        0x20..=0x7E => write!(f, "{}", byte as char)?,
                        other => write!(f, "\\{:03o}", other)?,
                    }
                }
            }
            TextPart::Code(hex) => {
                let value = u8::from_str_radix(hex, 16).unwrap_or(0);
                write!(f, "\\{:03o}", value)?;
            }
        }
    }
    write!(f, ")")
}

fn flate_decode(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| Error::Decode(format!("flate inflation failed: {}", err)))?;
    Ok(out)
}

/// The final dictionary of a PDF file identifying the Catalog. Later
/// trailers overwrite earlier ones field by field where non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailer {
    pub root: Option<ObjKey>,
    pub encrypt: Option<ObjKey>,
    pub decode_parms: Option<Item>,
}

impl Trailer {
    pub fn from_dict(dict: &HashMap<String, Item>) -> Trailer {
        let get_ref = |name: &str| match dict.get(name) {
            Some(Item::Ref { key, .. }) => Some(*key),
            _ => None,
        };
        Trailer {
            root: get_ref("/Root"),
            encrypt: get_ref("/Encrypt"),
            decode_parms: dict.get("/DecodeParms").cloned(),
        }
    }

    pub fn merge(&mut self, later: Trailer) {
        if later.root.is_some() {
            self.root = later.root;
        }
        if later.encrypt.is_some() {
            self.encrypt = later.encrypt;
        }
        if later.decode_parms.is_some() {
            self.decode_parms = later.decode_parms;
        }
    }
}

/// One row of a classic ASCII xref table. The table is parsed and retained
/// but the pipeline reads the stream linearly and never seeks through it.
#[derive(Debug, Clone, PartialEq)]
pub struct XrefEntry {
    pub number: u32,
    pub offset: u64,
    pub generation: u32,
    pub kind: String,
}

pub type XrefTable = Vec<XrefEntry>;
