use lopdf::{Dictionary, Document, Object, decode_text_string};

use super::is_facturx_filename;
use crate::core::FacturxError;

/// Name trees deeper than this are treated as corrupt (or cyclic).
const MAX_NAME_TREE_DEPTH: usize = 32;

/// Extract the Factur-X XML from a PDF.
///
/// Looks for an attachment whose name contains `factur-x` or `facturx`
/// (case-insensitive), first in the `/Names /EmbeddedFiles` name tree, then in
/// the catalog's `/AF` array.
pub fn extract_from_pdf(pdf_bytes: &[u8]) -> Result<String, FacturxError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| FacturxError::Extraction(format!("failed to load PDF: {e}")))?;

    let filespec = find_via_names(&doc)
        .or_else(|| find_via_af(&doc))
        .ok_or_else(|| FacturxError::Extraction("no Factur-X XML attachment in PDF".into()))?;

    let content = read_embedded_file(&doc, &filespec).map_err(FacturxError::Extraction)?;
    // Returned byte for byte: a leading BOM stays so the embedded file round-trips.
    String::from_utf8(content)
        .map_err(|e| FacturxError::Extraction(format!("embedded XML is not UTF-8: {e}")))
}

/// One leaf entry of the `/EmbeddedFiles` name tree.
#[derive(Debug, Clone)]
pub(super) struct NameEntry {
    /// Raw key bytes, which define the tree order.
    pub key: Vec<u8>,
    /// Key decoded as a PDF text string.
    pub name: String,
    pub value: Object,
}

/// Collect every entry of the catalog's `/Names /EmbeddedFiles` tree.
///
/// `Ok(vec![])` when the document has no such tree, `Err` when it has one
/// that cannot be walked.
pub(super) fn embedded_file_entries(doc: &Document) -> Result<Vec<NameEntry>, String> {
    let catalog = doc.catalog().map_err(|e| e.to_string())?;
    let Ok(names_obj) = catalog.get(b"Names") else {
        return Ok(Vec::new());
    };
    let names_dict = resolve_dict(doc, names_obj)?;
    let Ok(root) = names_dict.get(b"EmbeddedFiles") else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    walk_name_tree(doc, resolve_dict(doc, root)?, 0, &mut entries)?;
    Ok(entries)
}

fn walk_name_tree(
    doc: &Document,
    node: &Dictionary,
    depth: usize,
    out: &mut Vec<NameEntry>,
) -> Result<(), String> {
    if depth > MAX_NAME_TREE_DEPTH {
        return Err("name tree too deep".into());
    }

    if let Ok(names) = node.get(b"Names") {
        // Leaf: [key1 value1 key2 value2 ...]
        for pair in resolve_obj(doc, names)?.as_array().map_err(|e| e.to_string())?.chunks(2) {
            let [key, value] = pair else { continue };
            let Ok(raw) = key.as_str() else { continue };
            out.push(NameEntry {
                key: raw.to_vec(),
                name: text_of(key),
                value: value.clone(),
            });
        }
    }

    if let Ok(kids) = node.get(b"Kids") {
        for kid in resolve_obj(doc, kids)?.as_array().map_err(|e| e.to_string())? {
            walk_name_tree(doc, resolve_dict(doc, kid)?, depth + 1, out)?;
        }
    }
    Ok(())
}

fn find_via_names(doc: &Document) -> Option<Object> {
    embedded_file_entries(doc)
        .ok()?
        .into_iter()
        .find(|entry| {
            is_facturx_filename(&entry.name)
                || resolve_dict(doc, &entry.value)
                    .map(|spec| is_facturx_filename(&filespec_name(spec)))
                    .unwrap_or(false)
        })
        .map(|entry| entry.value)
}

fn find_via_af(doc: &Document) -> Option<Object> {
    let catalog = doc.catalog().ok()?;
    let af = resolve_obj(doc, catalog.get(b"AF").ok()?).ok()?.as_array().ok()?;
    af.iter()
        .find(|spec| {
            resolve_dict(doc, spec)
                .map(|dict| is_facturx_filename(&filespec_name(dict)))
                .unwrap_or(false)
        })
        .cloned()
}

/// The unicode (`/UF`) file name, falling back to `/F`.
pub(super) fn filespec_name(spec: &Dictionary) -> String {
    spec.get(b"UF")
        .or_else(|_| spec.get(b"F"))
        .map(text_of)
        .unwrap_or_default()
}

fn read_embedded_file(doc: &Document, filespec: &Object) -> Result<Vec<u8>, String> {
    let spec = resolve_dict(doc, filespec)?;
    let ef = resolve_dict(doc, spec.get(b"EF").map_err(|_| "filespec has no /EF entry")?)?;
    let stream_obj = ef
        .get(b"F")
        .or_else(|_| ef.get(b"UF"))
        .map_err(|_| "/EF has neither /F nor /UF")?;
    let stream = resolve_obj(doc, stream_obj)?
        .as_stream()
        .map_err(|e| e.to_string())?;

    // decompressed_content() fails on streams without a /Filter.
    Ok(stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone()))
}

pub(super) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Dictionary, String> {
    match obj {
        Object::Reference(id) => doc.get_dictionary(*id).map_err(|e| e.to_string()),
        Object::Dictionary(d) => Ok(d),
        _ => Err("expected dictionary or reference".to_string()),
    }
}

pub(super) fn resolve_obj<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, String> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).map_err(|e| e.to_string()),
        other => Ok(other),
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, or PDFDocEncoding).
fn text_of(obj: &Object) -> String {
    decode_text_string(obj).unwrap_or_else(|_| {
        obj.as_str()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdfa::testing;
    use lopdf::{Stream, StringFormat, dictionary, text_string};

    const XML: &str = "<rsm:CrossIndustryInvoice/>";

    /// Attach `content` under `name`, wiring the filespec through `place`.
    fn attach(
        doc: &mut Document,
        name: &str,
        content: &str,
        place: impl FnOnce(&mut Document, Object, lopdf::ObjectId),
    ) {
        let stream_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "EmbeddedFile" },
            content.as_bytes().to_vec(),
        ));
        let spec_id = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => text_string(name),
            "UF" => text_string(name),
            "EF" => dictionary! { "F" => Object::Reference(stream_id) },
        });
        place(doc, text_string(name), spec_id);
    }

    fn set_catalog(doc: &mut Document, key: &str, value: Object) {
        doc.catalog_mut().unwrap().set(key, value);
    }

    #[test]
    fn finds_file_in_flat_name_tree() {
        let mut doc = testing::document();
        attach(&mut doc, "factur-x.xml", XML, |doc, key, spec| {
            set_catalog(
                doc,
                "Names",
                Object::Dictionary(dictionary! {
                    "EmbeddedFiles" => dictionary! {
                        "Names" => vec![key, Object::Reference(spec)],
                    },
                }),
            );
        });
        assert_eq!(extract_from_pdf(&testing::save(&mut doc)).unwrap(), XML);
    }

    #[test]
    fn finds_file_in_nested_kids() {
        let mut doc = testing::document();
        attach(&mut doc, "FacturX.xml", XML, |doc, key, spec| {
            let leaf = doc.add_object(dictionary! {
                "Names" => vec![key, Object::Reference(spec)],
                "Limits" => vec![Object::string_literal("FacturX.xml"), Object::string_literal("FacturX.xml")],
            });
            let root = doc.add_object(dictionary! { "Kids" => vec![Object::Reference(leaf)] });
            set_catalog(
                doc,
                "Names",
                Object::Dictionary(dictionary! { "EmbeddedFiles" => Object::Reference(root) }),
            );
        });
        assert_eq!(extract_from_pdf(&testing::save(&mut doc)).unwrap(), XML);
    }

    #[test]
    fn falls_back_to_af_array() {
        let mut doc = testing::document();
        attach(&mut doc, "factur-x.xml", XML, |doc, _, spec| {
            set_catalog(doc, "AF", Object::Array(vec![Object::Reference(spec)]));
        });
        assert_eq!(extract_from_pdf(&testing::save(&mut doc)).unwrap(), XML);
    }

    #[test]
    fn decodes_utf16_file_names() {
        let mut doc = testing::document();
        attach(&mut doc, "Rechnung-Müller-factur-x.xml", XML, |doc, key, spec| {
            assert!(matches!(key, Object::String(_, StringFormat::Hexadecimal)));
            set_catalog(
                doc,
                "Names",
                Object::Dictionary(dictionary! {
                    "EmbeddedFiles" => dictionary! {
                        "Names" => vec![key, Object::Reference(spec)],
                    },
                }),
            );
        });
        assert_eq!(extract_from_pdf(&testing::save(&mut doc)).unwrap(), XML);
    }

    #[test]
    fn other_attachments_are_ignored() {
        let mut doc = testing::document();
        attach(&mut doc, "terms.xml", "<terms/>", |doc, key, spec| {
            set_catalog(
                doc,
                "Names",
                Object::Dictionary(dictionary! {
                    "EmbeddedFiles" => dictionary! {
                        "Names" => vec![key, Object::Reference(spec)],
                    },
                }),
            );
        });
        let err = extract_from_pdf(&testing::save(&mut doc)).unwrap_err();
        assert!(matches!(err, FacturxError::Extraction(_)));
    }

    #[test]
    fn plain_pdf_and_garbage_fail() {
        assert!(matches!(
            extract_from_pdf(&testing::pdf()),
            Err(FacturxError::Extraction(_))
        ));
        assert!(matches!(
            extract_from_pdf(b"not a pdf"),
            Err(FacturxError::Extraction(_))
        ));
    }
}
