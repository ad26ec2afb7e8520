mod common;

use std::io::Cursor;

use glean::error::Error;

use crate::common::{document, extract, flate, flate_stream_obj, obj, pdf, stream_obj, trailer};

#[test]
fn object_stream_members_are_classified() {
    let inner_font = "<< /Type /Font /Encoding /WinAnsiEncoding >>";
    let inner_pages = "<< /Type /Pages /Kids [] >>";
    let header = format!("10 0 11 {}\n", inner_font.len() + 1);
    let first = header.len();
    let body = format!("{}{}\n{}", header, inner_font, inner_pages);

    let bytes = pdf(&[
        flate_stream_obj(
            20,
            &format!(" /Type /ObjStm /N 2 /First {}", first),
            body.as_bytes(),
        ),
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        trailer("/Size 21 /Root 1 0 R"),
    ]);
    let doc = document(bytes);
    assert!(doc.fonts.contains_key(&(10, 0)), "inner font classified");
    assert!(
        doc.page_nodes.contains_key(&(11, 0)),
        "inner pages node classified"
    );
}

#[test]
fn xref_table_is_retained_but_unused() {
    let bytes = pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        b"xref\n0 2\n0000000000 65535 f\n0000000009 00000 n\n".to_vec(),
        trailer("/Size 3 /Root 1 0 R"),
    ]);
    let doc = document(bytes);
    let table = doc.xref.as_ref().expect("xref table retained");
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].number, 0);
    assert_eq!(table[0].generation, 65535);
    assert_eq!(table[1].number, 1);
    assert_eq!(table[1].offset, 9);
}

#[test]
fn later_trailer_fields_override_earlier_ones() {
    let bytes = pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        obj(7, "<< /Type /Catalog /Pages 2 0 R >>"),
        trailer("/Size 3 /Root 1 0 R"),
        trailer("/Size 8 /Root 7 0 R"),
    ]);
    let doc = document(bytes);
    assert_eq!(doc.trailer.root, Some((7, 0)));
}

#[test]
fn trailer_merge_keeps_earlier_fields_the_update_omits() {
    let bytes = pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        trailer("/Size 3 /Root 1 0 R"),
        trailer("/Size 3 /Prev 100"),
    ]);
    let doc = document(bytes);
    assert_eq!(doc.trailer.root, Some((1, 0)));
}

#[test]
fn stream_with_indirect_length_recovers_via_endstream_scan() {
    let bytes = pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>"),
        b"4 0 obj\n<< /Length 9 0 R >>\nstream\nBT (ok) Tj ET\nendstream\nendobj\n".to_vec(),
        trailer("/Size 5 /Root 1 0 R"),
    ]);
    assert_eq!(extract(bytes), "ok");
}

#[test]
fn truncated_stream_surfaces_unexpected_eof() {
    let mut bytes = b"%PDF-1.4\n4 0 obj\n<< /Length 400 >>\nstream\n".to_vec();
    bytes.extend_from_slice(b"only a few bytes");
    let err = glean::extract_text(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof));
}

#[test]
fn decoded_stream_length_matches_declared_length() {
    let raw = b"BT (sized) Tj ET";
    let compressed = flate(raw);
    let bytes = pdf(&[
        stream_obj(4, " /Filter /FlateDecode", &compressed),
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>"),
        trailer("/Size 5 /Root 1 0 R"),
    ]);
    assert_eq!(extract(bytes), "sized");
}

#[test]
fn pages_node_missing_entirely_is_synthesized_from_parents() {
    // No object 2 ever appears; the kid list comes from /Parent links.
    let bytes = pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>"),
        stream_obj(4, "", b"BT (found) Tj ET"),
        trailer("/Size 5 /Root 1 0 R"),
    ]);
    assert_eq!(extract(bytes), "found");
}

#[test]
fn binary_comment_line_is_skipped() {
    let mut header = b"%PDF-1.4\n%".to_vec();
    header.extend_from_slice(&[0xE2, 0xE3, 0xCF, 0xD3, b'\n']);
    let mut bytes = header;
    for piece in [
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>"),
        stream_obj(4, "", b"BT (binary ok) Tj ET"),
        trailer("/Size 5 /Root 1 0 R"),
    ] {
        bytes.extend_from_slice(&piece);
    }
    bytes.extend_from_slice(b"%%EOF\n");
    assert_eq!(
        glean::extract_text(Cursor::new(bytes)).expect("extract"),
        "binary ok"
    );
}

#[test]
fn uncategorized_objects_remain_after_drain() {
    let bytes = pdf(&[
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        obj(30, "<< /Producer (nobody) >>"),
        trailer("/Size 31 /Root 1 0 R"),
    ]);
    let doc = document(bytes);
    assert!(doc.uncategorized.contains_key(&(30, 0)));
}
