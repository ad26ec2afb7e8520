use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::mpsc;
use std::thread;

use crate::document::{Document, Page};
use crate::error::Error;
use crate::parser::Parser;
use crate::source::{BufSource, MemReader, PeekRead};
use crate::tokenizer::{Item, Lexer, ObjKey, TextPart};

/// ToUnicode mapping: uppercase hex code strings to their replacement text.
pub type CMap = HashMap<String, String>;

/// The operands shown between one `BT`/`ET` pair, under a single font.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextSection {
    pub font_name: String,
    pub text_array: Vec<Item>,
}

/// Backpressure boundary between the assembler thread and the graph builder.
const CHANNEL_CAPACITY: usize = 100;

/// Largest span a single bfrange triple may produce; bounds malformed ranges.
const MAX_BFRANGE_SPAN: u32 = 0x1_0000;

/// Extracts text from a PDF byte stream and yields it as a UTF-8 reader.
pub fn text_from<R: Read + Send>(input: R) -> Result<Cursor<Vec<u8>>, Error> {
    Ok(Cursor::new(extract_text(input)?.into_bytes()))
}

/// Extracts text from a PDF byte stream.
pub fn extract_text<R: Read + Send>(input: R) -> Result<String, Error> {
    let mut doc = build_document(input)?;
    doc.finish()?;
    assemble(&doc)
}

/// Runs the producer/consumer pipeline to completion and returns the drained
/// document graph. Exposed so callers can inspect the decode-error latch.
pub fn build_document<R: Read + Send>(input: R) -> Result<Document, Error> {
    thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        scope.spawn(move || Parser::new(Lexer::new(BufSource::new(input))).run(tx));

        let mut doc = Document::new();
        for received in rx {
            match received {
                Ok(parsed) => doc.absorb(parsed)?,
                Err(err) => return Err(err),
            }
        }
        Ok(doc)
    })
}

/// Walks Catalog → Pages → Page and renders every page's text sections.
/// Consecutive pages are separated by a single newline.
pub fn assemble(doc: &Document) -> Result<String, Error> {
    let root = doc.trailer.root.ok_or(Error::MissingCatalog)?;
    let catalog = doc.catalogs.get(&root).ok_or(Error::MissingCatalog)?;

    let mut leaves = Vec::new();
    if let Some(pages_ref) = catalog.pages {
        collect_leaves(doc, pages_ref, &mut leaves);
    }

    let mut out = String::new();
    let mut first = true;
    for page_key in leaves {
        let Some(page) = doc.pages.get(&page_key) else {
            continue;
        };
        if !first {
            out.push('\n');
        }
        first = false;
        for content_ref in &page.contents {
            let Some(Some(sections)) = doc.contents.get(content_ref) else {
                continue;
            };
            for section in sections {
                render_section(doc, page, section, &mut out);
            }
        }
    }
    Ok(out)
}

/// Depth-first flattening of the pages tree, preserving kid order.
fn collect_leaves(doc: &Document, key: ObjKey, out: &mut Vec<ObjKey>) {
    if let Some(node) = doc.page_nodes.get(&key) {
        for kid in &node.kids {
            collect_leaves(doc, *kid, out);
        }
        return;
    }
    if doc.pages.contains_key(&key) {
        out.push(key);
    }
}

fn render_section(doc: &Document, page: &Page, section: &TextSection, out: &mut String) {
    let cmap = page
        .fonts
        .get(&section.font_name)
        .and_then(|font_ref| doc.fonts.get(font_ref))
        .and_then(|font| font.to_unicode)
        .and_then(|unicode_ref| doc.cmaps.get(&unicode_ref))
        .and_then(|slot| slot.as_ref());

    for item in &section.text_array {
        match item {
            Item::Text(parts) => {
                for part in parts {
                    match part {
                        TextPart::Literal(bytes) => out.push_str(&String::from_utf8_lossy(bytes)),
                        TextPart::Code(hex) => render_hex(hex, cmap, out),
                    }
                }
            }
            Item::HexData(hex) => render_hex(hex, cmap, out),
            _ => {}
        }
    }
}

/// Hex code points are grouped four digits at a time when the length allows
/// it (two-byte codes, the common ToUnicode shape) and two otherwise. With a
/// cmap, unmapped groups emit nothing; without one, groups are raw code
/// points.
fn render_hex(hex: &str, cmap: Option<&CMap>, out: &mut String) {
    if hex.is_empty() {
        return;
    }
    let width = if hex.len() % 4 == 0 { 4 } else { 2 };
    for group in hex.as_bytes().chunks(width) {
        let Ok(group) = std::str::from_utf8(group) else {
            continue;
        };
        match cmap {
            Some(map) => {
                if let Some(replacement) = map.get(group) {
                    out.push_str(replacement);
                }
            }
            None => {
                if let Some(ch) = u32::from_str_radix(group, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
        }
    }
}

/// Replays a content stream through the text-operator state machine.
///
/// Operands are tracked in last-seen slots rather than a full stack: numeric
/// tokens are operands and leave the slots alone, any other token is an
/// operator and clears them after acting.
pub fn sections_from(data: &[u8]) -> Result<Vec<TextSection>, Error> {
    let mut lexer = Lexer::new(MemReader::new(data));
    let mut sections = Vec::new();
    let mut section = TextSection::default();
    let mut font = String::new();
    let mut last_name: Option<String> = None;
    let mut last_text: Option<Item> = None;
    let mut last_hex: Option<Item> = None;
    let mut last_array: Option<Item> = None;

    while let Some(item) = lexer.next_item()? {
        match item {
            Item::Name(name) => last_name = Some(name),
            Item::Text(_) => last_text = Some(item),
            Item::HexData(_) => last_hex = Some(item),
            Item::Array(_) => last_array = Some(item),
            Item::Token(op) => {
                if op.parse::<f64>().is_ok() {
                    continue;
                }
                match op.as_str() {
                    "BT" => section = TextSection::default(),
                    "Tf" => {
                        if let Some(name) = last_name.take() {
                            font = name;
                        }
                    }
                    "Tj" => {
                        if let Some(text) = last_text.take() {
                            section.text_array.push(text);
                        } else if let Some(hex) = last_hex.take() {
                            section.text_array.push(hex);
                        }
                    }
                    "TJ" => {
                        if let Some(Item::Array(items)) = last_array.take() {
                            section.text_array.extend(items);
                            section
                                .text_array
                                .push(Item::Text(vec![TextPart::Literal(b" ".to_vec())]));
                        }
                    }
                    "T*" => section
                        .text_array
                        .push(Item::Text(vec![TextPart::Literal(b"\n".to_vec())])),
                    "ET" => {
                        section.font_name = font.clone();
                        sections.push(std::mem::take(&mut section));
                    }
                    _ => {}
                }
                last_name = None;
                last_text = None;
                last_hex = None;
                last_array = None;
            }
            _ => {}
        }
    }
    Ok(sections)
}

/// Parses a ToUnicode cmap stream: `bfchar` and `bfrange` blocks fill the
/// map, `codespacerange` is consumed and ignored, `endcmap` ends parsing.
/// Each block is preceded by its integer count token.
pub fn cmap_from(data: &[u8]) -> Result<CMap, Error> {
    let mut lexer = Lexer::new(MemReader::new(data));
    let mut map = CMap::new();
    let mut prev: Option<String> = None;

    while let Some(item) = lexer.next_item()? {
        let Item::Token(tok) = item else {
            prev = None;
            continue;
        };
        match tok.as_str() {
            "begincodespacerange" => {
                let count = block_count(&prev)?;
                for _ in 0..count * 2 {
                    expect_hex(&mut lexer, Error::InvalidCmap)?;
                }
                prev = None;
            }
            "beginbfchar" => {
                let count = block_count(&prev)?;
                read_bfchar(&mut lexer, count, &mut map)?;
                prev = None;
            }
            "beginbfrange" => {
                let count = block_count(&prev)?;
                read_bfrange(&mut lexer, count, &mut map)?;
                prev = None;
            }
            "endcmap" => return Ok(map),
            _ => prev = Some(tok),
        }
    }
    Ok(map)
}

fn block_count(prev: &Option<String>) -> Result<usize, Error> {
    prev.as_deref()
        .and_then(|tok| tok.parse().ok())
        .ok_or(Error::InvalidCmap)
}

fn expect_hex<S: PeekRead>(lexer: &mut Lexer<S>, invalid: Error) -> Result<String, Error> {
    match lexer.next_item()? {
        Some(Item::HexData(hex)) => Ok(hex),
        Some(_) => Err(invalid),
        None => Err(Error::UnexpectedEof),
    }
}

fn read_bfchar<S: PeekRead>(lexer: &mut Lexer<S>, count: usize, map: &mut CMap) -> Result<(), Error> {
    let mut last_key = String::new();
    for i in 0..count * 2 {
        let hex = expect_hex(lexer, Error::InvalidBfchar)?;
        if i % 2 == 0 {
            map.insert(hex.clone(), String::new());
            last_key = hex;
        } else {
            map.insert(last_key.clone(), unicode_from_hex(&hex));
        }
    }
    Ok(())
}

fn read_bfrange<S: PeekRead>(lexer: &mut Lexer<S>, count: usize, map: &mut CMap) -> Result<(), Error> {
    for _ in 0..count {
        let start_hex = expect_hex(lexer, Error::InvalidBfrange)?;
        let end_hex = expect_hex(lexer, Error::InvalidBfrange)?;
        let dst_hex = expect_hex(lexer, Error::InvalidBfrange)?;
        let digits = start_hex.len();
        let (Ok(start), Ok(end), Ok(dst)) = (
            u32::from_str_radix(&start_hex, 16),
            u32::from_str_radix(&end_hex, 16),
            u32::from_str_radix(&dst_hex, 16),
        ) else {
            return Err(Error::InvalidBfrange);
        };
        if end < start || end - start > MAX_BFRANGE_SPAN {
            continue;
        }
        for (step, code) in (start..=end).enumerate() {
            // Keys keep the width the range start was written with.
            let key = format!("{:0width$X}", code, width = digits);
            if let Some(ch) = char::from_u32(dst + step as u32) {
                map.insert(key, ch.to_string());
            }
        }
    }
    Ok(())
}

/// Destination hex of a positive multiple of four digits is UTF-16BE;
/// anything else is a single code point.
fn unicode_from_hex(hex: &str) -> String {
    if !hex.is_empty() && hex.len() % 4 == 0 {
        let mut units = Vec::with_capacity(hex.len() / 4);
        for group in hex.as_bytes().chunks(4) {
            let Some(unit) = std::str::from_utf8(group)
                .ok()
                .and_then(|s| u16::from_str_radix(s, 16).ok())
            else {
                return String::new();
            };
            units.push(unit);
        }
        String::from_utf16_lossy(&units)
    } else {
        u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    }
}
