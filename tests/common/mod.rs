#![allow(dead_code)]

use std::io::{Cursor, Write};

use glean::document::Document;

/// Compresses raw bytes the way content and cmap streams are stored.
pub fn flate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("compress fixture stream");
    encoder.finish().expect("finish fixture compression")
}

/// `num 0 obj … endobj` with a textual body.
pub fn obj(num: u32, body: &str) -> Vec<u8> {
    format!("{} 0 obj\n{}\nendobj\n", num, body).into_bytes()
}

/// Stream object with a correct `/Length` and optional extra dictionary
/// entries (pass them with a leading space, e.g. " /Filter /FlateDecode").
pub fn stream_obj(num: u32, extra: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "{} 0 obj\n<< /Length {}{} >>\nstream\n",
        num,
        data.len(),
        extra
    )
    .into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out
}

/// Flate-compressed stream object.
pub fn flate_stream_obj(num: u32, extra: &str, raw: &[u8]) -> Vec<u8> {
    let compressed = flate(raw);
    stream_obj(num, &format!(" /Filter /FlateDecode{}", extra), &compressed)
}

pub fn trailer(body: &str) -> Vec<u8> {
    format!("trailer\n<< {} >>\nstartxref\n0\n", body).into_bytes()
}

/// Assembles fixture pieces into a full document byte stream.
pub fn pdf(pieces: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    for piece in pieces {
        out.extend_from_slice(piece);
    }
    out.extend_from_slice(b"%%EOF\n");
    out
}

pub fn extract(bytes: Vec<u8>) -> String {
    glean::extract_text(Cursor::new(bytes)).expect("extract text")
}

pub fn document(bytes: Vec<u8>) -> Document {
    let mut doc = glean::build_document(Cursor::new(bytes)).expect("build document");
    doc.finish().expect("finish document");
    doc
}

/// The usual four-object skeleton: catalog 1, pages 2, page 3, content 4,
/// font 5 (referenced as /F1).
pub fn single_page_pdf(content: Vec<u8>, font_body: &str) -> Vec<u8> {
    pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
        obj(
            3,
            "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        ),
        content,
        obj(5, font_body),
        trailer("/Size 6 /Root 1 0 R"),
    ])
}
