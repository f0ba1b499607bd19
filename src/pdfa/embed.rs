use chrono::{DateTime, Utc};
use lopdf::xref::XrefType;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary, text_string};

use super::extract::{embedded_file_entries, filespec_name, resolve_dict, resolve_obj};
use super::xmp::{self, XmpFields};
use super::{FACTURX_FILENAME, is_facturx_filename};
use crate::core::{EmbedStage, FacturxError, Profile};

const ATTACHMENT_DESCRIPTION: &str = "Factur-X XML invoice data (EN 16931)";

/// Trailer keys that only make sense next to a cross-reference stream.
const XREF_STREAM_KEYS: [&[u8]; 8] = [
    b"Type",
    b"W",
    b"Index",
    b"Filter",
    b"DecodeParms",
    b"Length",
    b"Prev",
    b"XRefStm",
];

/// Document metadata written alongside the attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOptions {
    /// Creation/modification time recorded in the PDF. `None` uses the current time.
    pub timestamp: Option<DateTime<Utc>>,
    pub producer: String,
    pub creator: String,
    pub subject: String,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            timestamp: None,
            producer: concat!("facturx ", env!("CARGO_PKG_VERSION")).to_string(),
            creator: "facturx".to_string(),
            subject: "Facture électronique conforme Factur-X".to_string(),
        }
    }
}

/// Embed a Factur-X XML into a PDF with default [`EmbedOptions`].
///
/// Takes existing PDF bytes and the XML to attach. Returns the modified PDF
/// with the XML attached as `factur-x.xml`, or an error naming the failing
/// stage. Nothing is returned on failure.
pub fn embed_in_pdf(
    pdf_bytes: &[u8],
    xml: &str,
    invoice_number: &str,
    profile: Profile,
) -> Result<Vec<u8>, FacturxError> {
    embed_in_pdf_with(pdf_bytes, xml, invoice_number, profile, &EmbedOptions::default())
}

/// Embed a Factur-X XML into a PDF.
///
/// An encrypted source is decrypted with the empty user password first (see
/// [`decrypt_source`]); documents that need a real password are refused with
/// [`FacturxError::Encrypted`]. The result is written with a classic
/// cross-reference table and a PDF 1.7 header.
pub fn embed_in_pdf_with(
    pdf_bytes: &[u8],
    xml: &str,
    invoice_number: &str,
    profile: Profile,
    options: &EmbedOptions,
) -> Result<Vec<u8>, FacturxError> {
    let mut doc = Document::load_mem(pdf_bytes)
        .map_err(|e| FacturxError::embedding(EmbedStage::Load, e.to_string()))?;
    if doc.catalog().is_err() {
        return Err(FacturxError::embedding(
            EmbedStage::Load,
            "document has no catalog",
        ));
    }
    if decrypt_source(&mut doc)? {
        tracing::warn!(invoice_number, "source PDF was encrypted, writing it decrypted");
    }

    let timestamp = options.timestamp.unwrap_or_else(Utc::now);
    let title = match invoice_number.trim() {
        "" => "Facture".to_string(),
        number => format!("Facture {number}"),
    };

    let filespec_id = add_attachment(&mut doc, xml.as_bytes(), timestamp);
    register_embedded_file(&mut doc, filespec_id)?;
    register_associated_file(&mut doc, filespec_id)?;
    set_document_info(&mut doc, &title, options, timestamp);

    let xmp = xmp::build_xmp(&XmpFields {
        title: &title,
        description: &options.subject,
        creator: &options.creator,
        producer: &options.producer,
        timestamp,
        profile,
    });
    let metadata_id = doc.add_object(
        Stream::new(
            dictionary! {
                "Type" => "Metadata",
                "Subtype" => "XML",
            },
            xmp.into_bytes(),
        )
        .with_compression(false),
    );

    let catalog = doc.catalog_mut().map_err(attach_error)?;
    catalog.set("Metadata", Object::Reference(metadata_id));
    catalog.set("MarkInfo", dictionary! { "Marked" => Object::Boolean(true) });

    use_classic_xref(&mut doc);
    doc.version = "1.7".to_string();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| FacturxError::embedding(EmbedStage::Serialize, e.to_string()))?;

    tracing::info!(
        invoice_number,
        profile = %profile,
        xml_bytes = xml.len(),
        pdf_bytes = output.len(),
        "embedded Factur-X XML in PDF"
    );
    Ok(output)
}

/// Decrypt a document protected by the standard security handler.
///
/// Owner-password-only documents (empty user password) are decrypted in
/// place: strings and streams are rewritten in clear and the `/Encrypt`
/// dictionary is removed. Returns whether the document was encrypted.
///
/// A document that needs a user password, or uses a scheme lopdf cannot
/// decrypt (AES, revision 4+), yields [`FacturxError::Encrypted`] and leaves
/// the document untouched.
pub fn decrypt_source(doc: &mut Document) -> Result<bool, FacturxError> {
    if !doc.is_encrypted() {
        return Ok(false);
    }
    let encrypt_id = doc
        .trailer
        .get(b"Encrypt")
        .and_then(Object::as_reference)
        .ok();

    doc.decrypt("").map_err(|e| {
        tracing::debug!(error = %e, "decryption with empty user password failed");
        FacturxError::Encrypted(format!(
            "source PDF is password protected or uses an unsupported scheme ({e})"
        ))
    })?;

    // lopdf drops the trailer entry but keeps the dictionary object.
    if let Some(id) = encrypt_id {
        doc.objects.remove(&id);
    }
    Ok(true)
}

/// Add the embedded file stream and its file specification. Returns the filespec id.
fn add_attachment(doc: &mut Document, xml: &[u8], timestamp: DateTime<Utc>) -> ObjectId {
    let date = pdf_date(timestamp);
    let stream_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "EmbeddedFile",
            "Subtype" => Object::Name(b"application#2Fxml".to_vec()),
            "Params" => dictionary! {
                "Size" => Object::Integer(xml.len() as i64),
                "CreationDate" => Object::string_literal(date.clone()),
                "ModDate" => Object::string_literal(date),
            },
        },
        xml.to_vec(),
    ));

    doc.add_object(dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal(FACTURX_FILENAME),
        "UF" => text_string(FACTURX_FILENAME),
        "Desc" => Object::string_literal(ATTACHMENT_DESCRIPTION),
        "AFRelationship" => Object::Name(b"Data".to_vec()),
        "EF" => dictionary! {
            "F" => Object::Reference(stream_id),
            "UF" => Object::Reference(stream_id),
        },
    })
}

/// Rewrite `/Names /EmbeddedFiles` as a single sorted leaf holding the
/// existing attachments plus ours. A previous Factur-X entry is replaced.
fn register_embedded_file(doc: &mut Document, filespec_id: ObjectId) -> Result<(), FacturxError> {
    let mut entries = match embedded_file_entries(doc) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "existing EmbeddedFiles name tree is unreadable, replacing it");
            Vec::new()
        }
    };
    entries.retain(|entry| !is_facturx_filename(&entry.name));

    let mut leaf: Vec<(Vec<u8>, Object)> = entries
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect();
    leaf.push((FACTURX_FILENAME.as_bytes().to_vec(), Object::Reference(filespec_id)));
    leaf.sort_by(|a, b| a.0.cmp(&b.0));

    let names_array = leaf
        .into_iter()
        .flat_map(|(key, value)| [Object::string_literal(key), value])
        .collect::<Vec<_>>();
    let tree_id = doc.add_object(dictionary! { "Names" => names_array });

    // Other name trees (Dests, JavaScript, ...) are carried over.
    let mut names = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Names").ok())
        .and_then(|obj| resolve_dict(doc, obj).ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    names.set("EmbeddedFiles", Object::Reference(tree_id));
    let names_id = doc.add_object(names);

    doc.catalog_mut()
        .map_err(attach_error)?
        .set("Names", Object::Reference(names_id));
    Ok(())
}

/// Append the filespec to the catalog's `/AF` array, dropping stale Factur-X entries.
fn register_associated_file(doc: &mut Document, filespec_id: ObjectId) -> Result<(), FacturxError> {
    let mut associated: Vec<Object> = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"AF").ok())
        .and_then(|obj| resolve_obj(doc, obj).ok())
        .and_then(|obj| obj.as_array().ok())
        .map(|array| {
            array
                .iter()
                .filter(|spec| {
                    resolve_dict(doc, spec)
                        .map(|dict| !is_facturx_filename(&filespec_name(dict)))
                        .unwrap_or(true)
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    associated.push(Object::Reference(filespec_id));

    doc.catalog_mut()
        .map_err(attach_error)?
        .set("AF", Object::Array(associated));
    Ok(())
}

/// Replace the document information dictionary with one that mirrors the XMP
/// packet entry for entry.
///
/// PDF/A requires both to agree, so keys of the source dictionary that the
/// packet does not carry (Keywords, custom keys, an older CreationDate) are
/// dropped rather than merged.
fn set_document_info(doc: &mut Document, title: &str, options: &EmbedOptions, timestamp: DateTime<Utc>) {
    let date = pdf_date(timestamp);
    if let Ok(previous) = doc.trailer.get(b"Info").and_then(Object::as_reference) {
        doc.objects.remove(&previous);
    }

    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Author" => text_string(&options.creator),
        "Subject" => text_string(&options.subject),
        "Creator" => text_string(&options.creator),
        "Producer" => text_string(&options.producer),
        "CreationDate" => Object::string_literal(date.clone()),
        "ModDate" => Object::string_literal(date),
    });
    doc.trailer.set("Info", Object::Reference(info_id));
}

/// Force a cross-reference table on save, whatever the source used.
fn use_classic_xref(doc: &mut Document) {
    doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;
    for key in XREF_STREAM_KEYS {
        doc.trailer.remove(key);
    }
}

/// PDF date string in UTC (`D:YYYYMMDDHHmmSS+00'00'`).
fn pdf_date(timestamp: DateTime<Utc>) -> String {
    format!("D:{}+00'00'", timestamp.format("%Y%m%d%H%M%S"))
}

fn attach_error(e: lopdf::Error) -> FacturxError {
    FacturxError::embedding(EmbedStage::Attach, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdfa::{extract_from_pdf, testing};
    use chrono::TimeZone;
    use lopdf::decode_text_string;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rsm:CrossIndustryInvoice xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"/>"#;

    fn options() -> EmbedOptions {
        EmbedOptions {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()),
            ..EmbedOptions::default()
        }
    }

    fn embed(pdf: &[u8]) -> Document {
        let out = embed_in_pdf_with(pdf, XML, "F-2024-001", Profile::Basic, &options()).unwrap();
        Document::load_mem(&out).unwrap()
    }

    fn info(doc: &Document) -> &Dictionary {
        let id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        doc.get_dictionary(id).unwrap()
    }

    fn text(dict: &Dictionary, key: &[u8]) -> String {
        decode_text_string(dict.get(key).unwrap()).unwrap()
    }

    #[test]
    fn pdf_date_format() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 7, 8, 9).unwrap();
        assert_eq!(pdf_date(ts), "D:20240105070809+00'00'");
    }

    #[test]
    fn attachment_and_catalog_entries() {
        let doc = embed(&testing::pdf());
        let catalog = doc.catalog().unwrap();

        let af = catalog.get(b"AF").unwrap().as_array().unwrap();
        assert_eq!(af.len(), 1);
        let spec = doc.get_dictionary(af[0].as_reference().unwrap()).unwrap();
        assert_eq!(filespec_name(spec), FACTURX_FILENAME);
        assert_eq!(spec.get(b"AFRelationship").unwrap().as_name().unwrap(), b"Data");

        let ef = spec.get(b"EF").unwrap().as_dict().unwrap();
        let stream = doc
            .get_object(ef.get(b"F").unwrap().as_reference().unwrap())
            .unwrap()
            .as_stream()
            .unwrap();
        assert_eq!(stream.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"application#2Fxml");
        let params = stream.dict.get(b"Params").unwrap().as_dict().unwrap();
        assert_eq!(params.get(b"Size").unwrap().as_i64().unwrap(), XML.len() as i64);
        assert_eq!(
            params.get(b"ModDate").unwrap().as_str().unwrap(),
            b"D:20240315093000+00'00'"
        );

        assert!(catalog.get(b"Metadata").is_ok());
        assert!(catalog.get(b"MarkInfo").is_ok());
        assert_eq!(doc.version, "1.7");
    }

    #[test]
    fn document_info_is_filled() {
        let doc = embed(&testing::pdf());
        let info = info(&doc);
        assert_eq!(text(info, b"Title"), "Facture F-2024-001");
        assert_eq!(text(info, b"Subject"), "Facture électronique conforme Factur-X");
        assert_eq!(text(info, b"Creator"), "facturx");
        assert!(text(info, b"Producer").starts_with("facturx "));
        assert_eq!(
            info.get(b"CreationDate").unwrap().as_str().unwrap(),
            b"D:20240315093000+00'00'"
        );
    }

    #[test]
    fn source_info_is_replaced_to_match_xmp() {
        let mut doc = testing::document();
        let info_id = doc.add_object(dictionary! {
            "CreationDate" => Object::string_literal("D:20200101000000+00'00'"),
            "Author" => Object::string_literal("Jean Dupont"),
            "Keywords" => Object::string_literal("facture, 2020"),
        });
        doc.trailer.set("Info", Object::Reference(info_id));

        let doc = embed(&testing::save(&mut doc));
        let info = info(&doc);
        assert_eq!(
            info.get(b"CreationDate").unwrap().as_str().unwrap(),
            b"D:20240315093000+00'00'"
        );
        assert_eq!(text(info, b"Author"), "facturx");
        assert!(!info.has(b"Keywords"));

        let id = doc.catalog().unwrap().get(b"Metadata").unwrap().as_reference().unwrap();
        let xmp = String::from_utf8(doc.get_object(id).unwrap().as_stream().unwrap().content.clone())
            .unwrap();
        assert!(xmp.contains("<xmp:CreateDate>2024-03-15T09:30:00Z</xmp:CreateDate>"));
        assert!(xmp.contains("<rdf:li>facturx</rdf:li>"));
    }

    #[test]
    fn xmp_stream_is_uncompressed_and_carries_profile() {
        let doc = embed(&testing::pdf());
        let id = doc.catalog().unwrap().get(b"Metadata").unwrap().as_reference().unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"Filter").is_err());
        let xmp = String::from_utf8(stream.content.clone()).unwrap();
        assert!(xmp.contains("<fx:ConformanceLevel>BASIC</fx:ConformanceLevel>"));
        assert!(xmp.contains("Facture F-2024-001"));
    }

    #[test]
    fn output_uses_classic_xref_table() {
        let out =
            embed_in_pdf_with(&testing::pdf(), XML, "F-1", Profile::Minimum, &options()).unwrap();
        assert!(out.starts_with(b"%PDF-1.7"));
        let tail = String::from_utf8_lossy(&out[out.len().saturating_sub(2048)..]).into_owned();
        assert!(tail.contains("\nxref\n") || tail.starts_with("xref\n"));
        assert!(tail.contains("trailer"));
        assert!(!tail.contains("/XRef"));
    }

    #[test]
    fn existing_attachments_are_kept_and_sorted() {
        let mut doc = testing::document();
        let other = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal("zz-terms.pdf"),
        });
        let first = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal("annex.csv"),
        });
        doc.catalog_mut().unwrap().set(
            "Names",
            dictionary! {
                "EmbeddedFiles" => dictionary! {
                    "Names" => vec![
                        Object::string_literal("zz-terms.pdf"), Object::Reference(other),
                        Object::string_literal("annex.csv"), Object::Reference(first),
                    ],
                },
                "Dests" => dictionary! {},
            },
        );
        doc.catalog_mut()
            .unwrap()
            .set("AF", vec![Object::Reference(first)]);

        let doc = embed(&testing::save(&mut doc));
        let names: Vec<String> = embedded_file_entries(&doc)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["annex.csv", "factur-x.xml", "zz-terms.pdf"]);

        let catalog = doc.catalog().unwrap();
        let names_dict = resolve_dict(&doc, catalog.get(b"Names").unwrap()).unwrap();
        assert!(names_dict.get(b"Dests").is_ok());
        assert_eq!(catalog.get(b"AF").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn embedding_twice_replaces_previous_xml() {
        let once = embed_in_pdf(&testing::pdf(), "<old/>", "F-1", Profile::Basic).unwrap();
        let twice = embed_in_pdf(&once, XML, "F-1", Profile::Basic).unwrap();

        let doc = Document::load_mem(&twice).unwrap();
        assert_eq!(embedded_file_entries(&doc).unwrap().len(), 1);
        assert_eq!(doc.catalog().unwrap().get(b"AF").unwrap().as_array().unwrap().len(), 1);
        assert_eq!(extract_from_pdf(&twice).unwrap(), XML);
    }

    const PASSWORD_PADDING: [u8; 32] = [
        0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
        0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
        0x69, 0x7A,
    ];

    fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }
        let (mut i, mut j) = (0u8, 0u8);
        data.iter()
            .map(|byte| {
                i = i.wrapping_add(1);
                j = j.wrapping_add(state[i as usize]);
                state.swap(i as usize, j as usize);
                byte ^ state[state[i as usize].wrapping_add(state[j as usize]) as usize]
            })
            .collect()
    }

    fn hex(bytes: &[u8]) -> Object {
        Object::String(bytes.to_vec(), lopdf::StringFormat::Hexadecimal)
    }

    /// RC4 40-bit (V1 R2) document whose streams are encrypted for `user_password`.
    fn encrypted_pdf(user_password: &str) -> Vec<u8> {
        let mut doc = testing::document();
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "Length" => 40,
            "O" => hex(&[0x5A; 32]),
            "P" => -44,
        });
        doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
        doc.trailer.set("ID", vec![hex(b"facturx-test-id0"), hex(b"facturx-test-id0")]);

        let key = lopdf::encryption::get_encryption_key(&doc, user_password, false).unwrap();
        doc.get_object_mut(encrypt_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("U", hex(&rc4(&key, &PASSWORD_PADDING)));

        // RC4 is symmetric: running the decryptor over clear text encrypts it.
        let streams: Vec<ObjectId> = doc
            .objects
            .iter()
            .filter(|(_, obj)| matches!(obj, Object::Stream(_)))
            .map(|(id, _)| *id)
            .collect();
        for id in streams {
            let cipher =
                lopdf::encryption::decrypt_object(&key, id, doc.get_object(id).unwrap()).unwrap();
            if let Object::Stream(stream) = doc.get_object_mut(id).unwrap() {
                stream.set_content(cipher);
            }
        }

        testing::save(&mut doc)
    }

    fn page_content(doc: &Document) -> Vec<u8> {
        let page_id = *doc.get_pages().values().next().unwrap();
        doc.get_page_content(page_id).unwrap()
    }

    #[test]
    fn owner_password_only_source_is_decrypted() {
        let source = encrypted_pdf("");
        let raw = Document::load_mem(&source).unwrap();
        assert!(raw.is_encrypted());
        assert_ne!(page_content(&raw), b"BT /F1 12 Tf 72 760 Td (Facture F-001) Tj ET");

        let out = embed_in_pdf_with(&source, XML, "F-2024-001", Profile::Basic, &options()).unwrap();
        let doc = Document::load_mem(&out).unwrap();
        assert!(!doc.is_encrypted());
        assert_eq!(page_content(&doc), b"BT /F1 12 Tf 72 760 Td (Facture F-001) Tj ET");
        let leftover = doc
            .objects
            .values()
            .any(|obj| obj.as_dict().is_ok_and(|dict| dict.has(b"O") && dict.has(b"U")));
        assert!(!leftover, "security handler dictionary kept");
        assert_eq!(extract_from_pdf(&out).unwrap(), XML);
    }

    #[test]
    fn user_password_source_is_refused() {
        let err = embed_in_pdf(&encrypted_pdf("secret"), XML, "F-1", Profile::Basic).unwrap_err();
        assert!(matches!(err, FacturxError::Encrypted(_)), "{err}");
    }

    #[test]
    fn unsupported_security_handler_is_refused() {
        let mut doc = testing::document();
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 4,
            "R" => 4,
            "O" => hex(&[0; 32]),
            "U" => hex(&[0; 32]),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
        doc.trailer.set("ID", vec![hex(b"id"), hex(b"id")]);
        assert!(matches!(
            decrypt_source(&mut doc),
            Err(FacturxError::Encrypted(_))
        ));
        assert!(doc.is_encrypted());
    }

    #[test]
    fn clear_source_is_left_alone() {
        let mut doc = testing::document();
        assert!(!decrypt_source(&mut doc).unwrap());
    }

    #[test]
    fn invalid_source_fails_at_load_stage() {
        let err = embed_in_pdf(b"%PDF-1.4 garbage", XML, "F-1", Profile::Basic).unwrap_err();
        assert!(matches!(
            err,
            FacturxError::Embedding {
                stage: EmbedStage::Load,
                ..
            }
        ));
    }

    #[test]
    fn blank_invoice_number_gives_plain_title() {
        let out = embed_in_pdf_with(&testing::pdf(), XML, "  ", Profile::Basic, &options()).unwrap();
        let doc = Document::load_mem(&out).unwrap();
        assert_eq!(text(info(&doc), b"Title"), "Facture");
    }
}
