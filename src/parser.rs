use std::sync::mpsc::SyncSender;

use crate::error::Error;
use crate::model::{Object, Trailer, XrefEntry, XrefTable};
use crate::source::PeekRead;
use crate::tokenizer::{Item, Lexer, ObjKey, RefKind};

/// Items the assembler hands to the graph builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Object(Object),
    Trailer(Trailer),
    Xref(XrefTable),
}

/// Assembles lexical items into indirect objects, trailers and xref tables.
///
/// Sits directly on the lexer and is the producer half of the pipeline:
/// `run` drains the input into a bounded channel and sends the first error
/// before closing.
pub struct Parser<S> {
    lexer: Lexer<S>,
}

impl<S: PeekRead> Parser<S> {
    pub fn new(lexer: Lexer<S>) -> Parser<S> {
        Parser { lexer }
    }

    pub fn run(mut self, out: SyncSender<Result<Parsed, Error>>) {
        loop {
            match self.next_parsed() {
                Ok(Some(parsed)) => {
                    if out.send(Ok(parsed)).is_err() {
                        // Consumer went away; nothing left to do.
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    let _ = out.send(Err(err));
                    return;
                }
            }
        }
    }

    /// Next assembled value, or `None` at clean end of input. Comments and
    /// stray top-level items are discarded.
    pub fn next_parsed(&mut self) -> Result<Option<Parsed>, Error> {
        while let Some(item) = self.lexer.next_item()? {
            match item {
                Item::Ref {
                    key,
                    kind: RefKind::Header,
                } => {
                    let object = self.read_object(key)?;
                    if let Some(trailer) = object.as_trailer() {
                        return Ok(Some(Parsed::Trailer(trailer)));
                    }
                    return Ok(Some(Parsed::Object(object)));
                }
                Item::Token(tok) if tok == "trailer" => {
                    match self.lexer.next_item()? {
                        Some(Item::Dictionary(dict)) => {
                            return Ok(Some(Parsed::Trailer(Trailer::from_dict(&dict))))
                        }
                        _ => {
                            return Err(Error::Protocol(
                                "trailer keyword not followed by a dictionary".to_string(),
                            ))
                        }
                    }
                }
                Item::Token(tok) if tok == "xref" => {
                    return Ok(Some(Parsed::Xref(self.read_xref()?)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Drains items into an object until `endobj`. The `stream` keyword
    /// switches to raw-byte mode using the `/Length` already present in the
    /// object's dictionary — the one context-sensitive lookup in the
    /// grammar.
    fn read_object(&mut self, key: ObjKey) -> Result<Object, Error> {
        let mut object = Object::new(key);
        loop {
            let item = self.lexer.next_item()?.ok_or(Error::UnexpectedEof)?;
            match item {
                Item::Token(tok) if tok == "stream" => {
                    let data = match object.stream_length() {
                        Some(length) => {
                            let data = self.lexer.read_stream(length)?;
                            if data.len() < length {
                                return Err(Error::UnexpectedEof);
                            }
                            data
                        }
                        // Missing or indirect /Length: recover by scanning
                        // for the endstream keyword.
                        None => self.lexer.read_to_endstream()?,
                    };
                    // A stream without a dictionary is discarded after the
                    // scan; the payload has nothing to describe it.
                    if object.dict.is_some() {
                        object.stream = Some(data);
                    }
                }
                Item::Token(tok) if tok == "endstream" => {}
                Item::Token(tok) if tok == "endobj" => return Ok(object),
                Item::Dictionary(dict) => object.dict = Some(dict),
                other => object.values.push(other),
            }
        }
    }

    /// Classic xref table in the fixed ASCII format: start, count, then
    /// count rows of offset / generation / kind.
    fn read_xref(&mut self) -> Result<XrefTable, Error> {
        let start = self.read_int_token()? as u32;
        let count = self.read_int_token()?;
        let mut table = Vec::with_capacity(count.min(4096) as usize);
        for row in 0..count as u32 {
            let offset = self.read_int_token()?;
            let generation = self.read_int_token()? as u32;
            let kind = match self.lexer.next_item()? {
                Some(Item::Token(tok)) => tok,
                _ => return Err(Error::Protocol("malformed xref row".to_string())),
            };
            table.push(XrefEntry {
                number: start + row,
                offset,
                generation,
                kind,
            });
        }
        Ok(table)
    }

    fn read_int_token(&mut self) -> Result<u64, Error> {
        match self.lexer.next_item()? {
            Some(Item::Token(tok)) => tok
                .parse()
                .map_err(|_| Error::Protocol(format!("expected integer, found {:?}", tok))),
            other => Err(Error::Protocol(format!(
                "expected integer token, found {:?}",
                other
            ))),
        }
    }
}
