use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::model::{Object, Trailer, XrefTable};
use crate::parser::Parsed;
use crate::source::MemReader;
use crate::text::{self, CMap, TextSection};
use crate::tokenizer::{Item, Lexer, ObjKey};

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub pages: Option<ObjKey>,
}

/// Interior node of the pages tree. `is_null` marks nodes synthesized from a
/// child's `/Parent` before the node itself has been seen.
#[derive(Debug, Clone, PartialEq)]
pub struct PagesNode {
    pub kids: Vec<ObjKey>,
    pub is_null: bool,
}

impl PagesNode {
    fn placeholder() -> PagesNode {
        PagesNode {
            kids: Vec::new(),
            is_null: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub fonts: HashMap<String, ObjKey>,
    pub contents: Vec<ObjKey>,
    pub parent: Option<ObjKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub encoding: Option<String>,
    pub to_unicode: Option<ObjKey>,
}

/// The document graph, built by draining the assembler channel.
///
/// Every entity lives in exactly one typed table keyed by object handle;
/// cross-links are handles only. `None` entries in `contents`/`cmaps` are
/// placeholders for referenced streams that have not arrived yet.
#[derive(Default)]
pub struct Document {
    pub catalogs: HashMap<ObjKey, Catalog>,
    pub page_nodes: HashMap<ObjKey, PagesNode>,
    pub pages: HashMap<ObjKey, Page>,
    pub fonts: HashMap<ObjKey, Font>,
    pub contents: HashMap<ObjKey, Option<Vec<TextSection>>>,
    pub cmaps: HashMap<ObjKey, Option<CMap>>,
    pub uncategorized: HashMap<ObjKey, Object>,
    pub trailer: Trailer,
    pub xref: Option<XrefTable>,
    decode_error: Option<Error>,
}

impl Document {
    pub fn new() -> Document {
        Document::default()
    }

    /// First stream decode failure, if any. Once set, all later
    /// content/cmap decodes were skipped.
    pub fn decode_error(&self) -> Option<&Error> {
        self.decode_error.as_ref()
    }

    pub fn absorb(&mut self, parsed: Parsed) -> Result<(), Error> {
        match parsed {
            Parsed::Trailer(trailer) => self.trailer.merge(trailer),
            Parsed::Xref(table) => self.xref = Some(table),
            Parsed::Object(object) => self.classify(object)?,
        }
        Ok(())
    }

    fn classify(&mut self, mut object: Object) -> Result<(), Error> {
        match object.type_name().map(str::to_string).as_deref() {
            Some("/Catalog") => {
                self.catalogs.insert(
                    object.key,
                    Catalog {
                        pages: object.object_ref("/Pages"),
                    },
                );
            }
            Some("/Pages") => {
                self.page_nodes.insert(object.key, pages_node_from(&object));
            }
            Some("/Page") => {
                let page = page_from(&object);
                self.attach_page(object.key, page)?;
            }
            Some("/Font") => {
                let font = font_from(&object);
                self.attach_font(object.key, font)?;
            }
            Some("/ObjStm") => self.expand_object_stream(object)?,
            Some("/XObject") | Some("/FontDescriptor") => {}
            _ => {
                if let Some(slot) = self.contents.get(&object.key) {
                    if slot.is_none() {
                        let sections = self.decode_content(&mut object)?;
                        self.contents.insert(object.key, Some(sections));
                    }
                } else if let Some(slot) = self.cmaps.get(&object.key) {
                    if slot.is_none() {
                        let cmap = self.decode_cmap(&mut object)?;
                        self.cmaps.insert(object.key, Some(cmap));
                    }
                } else {
                    self.uncategorized.insert(object.key, object);
                }
            }
        }
        Ok(())
    }

    /// Stores a page, materializing content streams that already arrived and
    /// reserving placeholders for the rest, then links the page into its
    /// parent node (synthesized when the parent has not been seen).
    fn attach_page(&mut self, key: ObjKey, page: Page) -> Result<(), Error> {
        for content_ref in page.contents.clone() {
            if let Some(mut object) = self.uncategorized.remove(&content_ref) {
                let sections = self.decode_content(&mut object)?;
                self.contents.insert(content_ref, Some(sections));
            } else {
                self.contents.entry(content_ref).or_insert(None);
            }
        }
        if let Some(parent) = page.parent {
            let node = self
                .page_nodes
                .entry(parent)
                .or_insert_with(PagesNode::placeholder);
            if !node.kids.contains(&key) {
                node.kids.push(key);
            }
        }
        self.pages.insert(key, page);
        Ok(())
    }

    fn attach_font(&mut self, key: ObjKey, font: Font) -> Result<(), Error> {
        if let Some(unicode_ref) = font.to_unicode {
            if let Some(mut object) = self.uncategorized.remove(&unicode_ref) {
                let cmap = self.decode_cmap(&mut object)?;
                self.cmaps.insert(unicode_ref, Some(cmap));
            } else {
                self.cmaps.entry(unicode_ref).or_insert(None);
            }
        }
        self.fonts.insert(key, font);
        Ok(())
    }

    /// Decodes a `/Type /ObjStm` body, reads its `(number, offset)` header
    /// pairs and re-feeds each inner object through the classifier. Inner
    /// objects take generation 0.
    fn expand_object_stream(&mut self, mut object: Object) -> Result<(), Error> {
        if !self.decode_object(&mut object) {
            return Ok(());
        }
        let Some(data) = object.stream.take() else {
            return Ok(());
        };
        let count = object.int("/N").unwrap_or(0).max(0) as usize;
        let first = object.int("/First").unwrap_or(0).max(0) as usize;

        let mut header = Lexer::new(MemReader::new(&data));
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let number = int_token(header.next_item()?)
                .ok_or_else(|| Error::Protocol("malformed object stream header".to_string()))?;
            let offset = int_token(header.next_item()?)
                .ok_or_else(|| Error::Protocol("malformed object stream header".to_string()))?;
            entries.push((number as u32, offset as usize));
        }

        for (number, offset) in entries {
            let position = first + offset;
            if position >= data.len() {
                continue;
            }
            let mut lexer = Lexer::new(MemReader::new(&data[position..]));
            let mut inner = Object::new((number, 0));
            match lexer.next_item()? {
                Some(Item::Dictionary(dict)) => inner.dict = Some(dict),
                Some(value) => inner.values.push(value),
                None => continue,
            }
            self.classify(inner)?;
        }
        Ok(())
    }

    fn decode_content(&mut self, object: &mut Object) -> Result<Vec<TextSection>, Error> {
        if !self.decode_object(object) {
            return Ok(Vec::new());
        }
        text::sections_from(object.stream.as_deref().unwrap_or(&[]))
    }

    fn decode_cmap(&mut self, object: &mut Object) -> Result<CMap, Error> {
        if !self.decode_object(object) {
            return Ok(CMap::new());
        }
        text::cmap_from(object.stream.as_deref().unwrap_or(&[]))
    }

    /// Decode with the failure latch: once a decode fails, or the trailer
    /// shows the document is encrypted, all further decodes are skipped but
    /// absorption continues so the page/font graph still builds.
    fn decode_object(&mut self, object: &mut Object) -> bool {
        if self.trailer.encrypt.is_some() && self.decode_error.is_none() {
            self.decode_error = Some(Error::Decode("document is encrypted".to_string()));
        }
        if self.decode_error.is_some() {
            return false;
        }
        match object.decode_stream() {
            Ok(()) => true,
            Err(err) => {
                self.decode_error = Some(err);
                false
            }
        }
    }

    /// Post-drain resolution: everything still referenced only by handle is
    /// pulled out of `uncategorized`, recursively down the pages tree.
    pub fn finish(&mut self) -> Result<(), Error> {
        let catalog_pages: Vec<Option<ObjKey>> =
            self.catalogs.values().map(|c| c.pages).collect();
        for pages_ref in catalog_pages.into_iter().flatten() {
            if !self.page_nodes.contains_key(&pages_ref) && !self.pages.contains_key(&pages_ref) {
                if let Some(object) = self.uncategorized.remove(&pages_ref) {
                    self.page_nodes.insert(pages_ref, pages_node_from(&object));
                } else {
                    // The node never appeared at all: synthesize its kid
                    // list from /Parent back-references.
                    let mut kids: Vec<ObjKey> = self
                        .pages
                        .iter()
                        .filter(|(_, page)| page.parent == Some(pages_ref))
                        .map(|(key, _)| *key)
                        .collect();
                    kids.sort_unstable();
                    self.page_nodes.insert(
                        pages_ref,
                        PagesNode {
                            kids,
                            is_null: true,
                        },
                    );
                }
            }
            let mut seen = HashSet::new();
            self.resolve_tree(pages_ref, &mut seen)?;
        }
        Ok(())
    }

    fn resolve_tree(&mut self, key: ObjKey, seen: &mut HashSet<ObjKey>) -> Result<(), Error> {
        if !seen.insert(key) {
            return Ok(());
        }
        if !self.page_nodes.contains_key(&key) && !self.pages.contains_key(&key) {
            if let Some(object) = self.uncategorized.remove(&key) {
                if object.search("/Kids").is_some() {
                    self.page_nodes.insert(key, pages_node_from(&object));
                } else {
                    let page = page_from(&object);
                    self.attach_page(key, page)?;
                }
            }
        }
        let kids = self.page_nodes.get(&key).map(|node| node.kids.clone());
        if let Some(kids) = kids {
            for kid in kids {
                self.resolve_tree(kid, seen)?;
            }
            return Ok(());
        }
        if self.pages.contains_key(&key) {
            self.resolve_page_assets(key)?;
        }
        Ok(())
    }

    fn resolve_page_assets(&mut self, key: ObjKey) -> Result<(), Error> {
        let Some(page) = self.pages.get(&key).cloned() else {
            return Ok(());
        };
        for content_ref in page.contents {
            let pending = matches!(self.contents.get(&content_ref), None | Some(None));
            if pending {
                if let Some(mut object) = self.uncategorized.remove(&content_ref) {
                    let sections = self.decode_content(&mut object)?;
                    self.contents.insert(content_ref, Some(sections));
                }
            }
        }
        for font_ref in page.fonts.into_values() {
            if !self.fonts.contains_key(&font_ref) {
                if let Some(object) = self.uncategorized.remove(&font_ref) {
                    let font = font_from(&object);
                    self.attach_font(font_ref, font)?;
                }
            }
            let unicode_ref = self.fonts.get(&font_ref).and_then(|font| font.to_unicode);
            if let Some(unicode_ref) = unicode_ref {
                let pending = matches!(self.cmaps.get(&unicode_ref), None | Some(None));
                if pending {
                    if let Some(mut object) = self.uncategorized.remove(&unicode_ref) {
                        let cmap = self.decode_cmap(&mut object)?;
                        self.cmaps.insert(unicode_ref, Some(cmap));
                    }
                }
            }
        }
        Ok(())
    }
}

fn int_token(item: Option<Item>) -> Option<i64> {
    match item {
        Some(Item::Token(tok)) => tok.parse().ok(),
        _ => None,
    }
}

fn pages_node_from(object: &Object) -> PagesNode {
    let kids = object
        .array("/Kids")
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Item::Ref { key, .. } => Some(*key),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    PagesNode {
        kids,
        is_null: false,
    }
}

fn page_from(object: &Object) -> Page {
    let mut page = Page {
        parent: object.object_ref("/Parent"),
        ..Page::default()
    };
    if let Some(Item::Dictionary(resources)) = object.search("/Resources") {
        if let Some(Item::Dictionary(fonts)) = resources.get("/Font") {
            for (name, value) in fonts {
                if let Item::Ref { key, .. } = value {
                    page.fonts.insert(name.clone(), *key);
                }
            }
        }
    }
    // Contents can be a single reference or an array of references.
    match object.search("/Contents") {
        Some(Item::Ref { key, .. }) => page.contents.push(*key),
        Some(Item::Array(items)) => {
            for item in items {
                if let Item::Ref { key, .. } = item {
                    page.contents.push(*key);
                }
            }
        }
        _ => {}
    }
    page
}

fn font_from(object: &Object) -> Font {
    Font {
        encoding: object.name("/Encoding").map(str::to_string),
        to_unicode: object.object_ref("/ToUnicode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::tokenizer::RefKind;

    fn dict_object(key: ObjKey, entries: Vec<(&str, Item)>) -> Object {
        let mut object = Object::new(key);
        object.dict = Some(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        );
        object
    }

    fn name(v: &str) -> Item {
        Item::Name(v.to_string())
    }

    fn reference(key: ObjKey) -> Item {
        Item::Ref {
            key,
            kind: RefKind::Indirect,
        }
    }

    #[test]
    fn catalog_is_stored_with_its_pages_ref() {
        let mut doc = Document::new();
        let object = dict_object(
            (7, 0),
            vec![("/Type", name("/Catalog")), ("/Pages", reference((6, 0)))],
        );
        doc.absorb(Parsed::Object(object)).unwrap();
        assert_eq!(
            doc.catalogs.get(&(7, 0)),
            Some(&Catalog {
                pages: Some((6, 0))
            })
        );
    }

    #[test]
    fn page_reserves_placeholders_for_unseen_content() {
        let mut doc = Document::new();
        let object = dict_object(
            (4, 0),
            vec![
                ("/Type", name("/Page")),
                ("/Contents", reference((8, 0))),
                ("/Parent", reference((3, 0))),
            ],
        );
        doc.absorb(Parsed::Object(object)).unwrap();
        assert_eq!(doc.contents.get(&(8, 0)), Some(&None));
        // The unseen parent was synthesized and linked.
        let node = doc.page_nodes.get(&(3, 0)).expect("synthesized parent");
        assert!(node.is_null);
        assert_eq!(node.kids, vec![(4, 0)]);
    }

    #[test]
    fn late_content_stream_fills_its_placeholder() {
        let mut doc = Document::new();
        let page = dict_object(
            (4, 0),
            vec![("/Type", name("/Page")), ("/Contents", reference((8, 0)))],
        );
        doc.absorb(Parsed::Object(page)).unwrap();

        let mut content = Object::new((8, 0));
        content.dict = Some(HashMap::from([(
            "/Length".to_string(),
            Item::Token("28".to_string()),
        )]));
        content.stream = Some(b"BT /F1 12 Tf (Hi) Tj ET".to_vec());
        doc.absorb(Parsed::Object(content)).unwrap();

        let sections = doc.contents.get(&(8, 0)).unwrap().as_ref().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].font_name, "/F1");
    }

    #[test]
    fn font_reserves_cmap_placeholder() {
        let mut doc = Document::new();
        let font = dict_object(
            (5, 0),
            vec![
                ("/Type", name("/Font")),
                ("/Encoding", name("/WinAnsiEncoding")),
                ("/ToUnicode", reference((9, 0))),
            ],
        );
        doc.absorb(Parsed::Object(font)).unwrap();
        assert_eq!(doc.cmaps.get(&(9, 0)), Some(&None));
        assert_eq!(
            doc.fonts.get(&(5, 0)),
            Some(&Font {
                encoding: Some("/WinAnsiEncoding".to_string()),
                to_unicode: Some((9, 0)),
            })
        );
    }

    #[test]
    fn object_stream_expands_inner_objects() {
        let body = b"10 0 11 34\n<< /Type /Font /Encoding /WinAnsiEncoding >>\n<< /Type /Pages /Kids [] >>";
        // Header is 11 bytes; the second dictionary starts 34 bytes later.
        let mut object = Object::new((20, 0));
        object.dict = Some(HashMap::from([
            ("/Type".to_string(), name("/ObjStm")),
            ("/N".to_string(), Item::Token("2".to_string())),
            ("/First".to_string(), Item::Token("11".to_string())),
        ]));
        object.stream = Some(body.to_vec());

        let mut doc = Document::new();
        doc.absorb(Parsed::Object(object)).unwrap();
        assert!(doc.fonts.contains_key(&(10, 0)));
        assert!(doc.page_nodes.contains_key(&(11, 0)));
    }

    #[test]
    fn decode_failure_latches_and_absorption_continues() {
        let mut doc = Document::new();
        let page = dict_object(
            (4, 0),
            vec![("/Type", name("/Page")), ("/Contents", reference((8, 0)))],
        );
        doc.absorb(Parsed::Object(page)).unwrap();

        let mut bad = Object::new((8, 0));
        bad.dict = Some(HashMap::from([(
            "/Filter".to_string(),
            name("/FlateDecode"),
        )]));
        bad.stream = Some(b"not zlib at all".to_vec());
        doc.absorb(Parsed::Object(bad)).unwrap();

        assert!(doc.decode_error().is_some());
        // The placeholder was filled with empty sections, not left dangling.
        assert_eq!(doc.contents.get(&(8, 0)), Some(&Some(Vec::new())));

        // Later objects still classify.
        let catalog = dict_object((7, 0), vec![("/Type", name("/Catalog"))]);
        doc.absorb(Parsed::Object(catalog)).unwrap();
        assert!(doc.catalogs.contains_key(&(7, 0)));
    }

    #[test]
    fn encrypted_trailer_declines_decoding() {
        let mut doc = Document::new();
        doc.absorb(Parsed::Trailer(Trailer {
            root: Some((7, 0)),
            encrypt: Some((30, 0)),
            decode_parms: None,
        }))
        .unwrap();

        let page = dict_object(
            (4, 0),
            vec![("/Type", name("/Page")), ("/Contents", reference((8, 0)))],
        );
        doc.absorb(Parsed::Object(page)).unwrap();

        let mut content = Object::new((8, 0));
        content.dict = Some(HashMap::new());
        content.stream = Some(b"BT (secret) Tj ET".to_vec());
        doc.absorb(Parsed::Object(content)).unwrap();

        assert!(doc.decode_error().is_some());
        assert_eq!(doc.contents.get(&(8, 0)), Some(&Some(Vec::new())));
    }

    #[test]
    fn finish_resolves_pages_from_uncategorized() {
        let mut doc = Document::new();
        doc.absorb(Parsed::Object(dict_object(
            (7, 0),
            vec![("/Type", name("/Catalog")), ("/Pages", reference((6, 0)))],
        )))
        .unwrap();

        // A pages node with no /Type entry lands in uncategorized.
        let mut node = Object::new((6, 0));
        node.dict = Some(HashMap::from([(
            "/Kids".to_string(),
            Item::Array(vec![reference((4, 0))]),
        )]));
        doc.absorb(Parsed::Object(node)).unwrap();
        assert!(doc.uncategorized.contains_key(&(6, 0)));

        let mut page = Object::new((4, 0));
        page.dict = Some(HashMap::from([(
            "/Contents".to_string(),
            reference((8, 0)),
        )]));
        doc.absorb(Parsed::Object(page)).unwrap();

        let mut content = Object::new((8, 0));
        content.dict = Some(HashMap::new());
        content.stream = Some(b"BT (late) Tj ET".to_vec());
        doc.absorb(Parsed::Object(content)).unwrap();

        doc.finish().unwrap();
        assert!(doc.page_nodes.contains_key(&(6, 0)));
        assert!(doc.pages.contains_key(&(4, 0)));
        let sections = doc.contents.get(&(8, 0)).unwrap().as_ref().unwrap();
        assert_eq!(sections.len(), 1);
    }
}
