use super::*;
use crate::error::FailureKind;
use crate::report::Candidate;
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use md5::{Digest, Md5};
use std::io::{Cursor, Read, Write};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

fn package(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in parts {
        let method = if name.ends_with(".png") {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        writer
            .start_file(*name, SimpleFileOptions::default().compression_method(method))
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn read_part(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

fn read_text(bytes: &[u8], name: &str) -> String {
    String::from_utf8(read_part(bytes, name)).unwrap()
}

fn entry_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect::<Vec<_>>()
}

fn preview() -> RunOptions {
    RunOptions {
        preview: true,
        ..RunOptions::default()
    }
}

const WORD_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Contrato de arrendamiento</w:t></w:r></w:p></w:body></w:document>"#;

const WORD_SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:zoom w:percent="100"/><w:documentProtection w:edit="readOnly" w:enforcement="1" w:hashValue="q1w2e3"/><w:defaultTabStop w:val="708"/></w:settings>"#;

fn protected_word() -> Vec<u8> {
    package(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("word/document.xml", WORD_DOCUMENT.as_bytes()),
        ("word/settings.xml", WORD_SETTINGS.as_bytes()),
        ("word/media/image1.png", PNG_BYTES),
    ])
}

#[test]
fn word_edit_protection_is_removed_and_other_parts_survive() {
    let input = protected_word();
    let processed = process_bytes(&input, None, &RunOptions::default()).unwrap();

    assert_eq!(processed.kind, DocumentKind::Word);
    assert_eq!(processed.findings.protections.len(), 1);
    assert_eq!(processed.findings.protections[0].element, "documentProtection");

    let output = processed.output.unwrap();
    assert_eq!(entry_names(&output), entry_names(&input));

    let settings = read_text(&output, "word/settings.xml");
    assert!(!settings.contains("documentProtection"));
    assert!(settings.contains(r#"<w:zoom w:percent="100"/>"#));
    assert!(settings.contains("defaultTabStop"));

    for part in ["word/document.xml", "word/media/image1.png", "[Content_Types].xml"] {
        assert_eq!(read_part(&output, part), read_part(&input, part), "{part}");
    }
}

#[test]
fn second_pass_finds_nothing() {
    let first = process_bytes(&protected_word(), None, &RunOptions::default())
        .unwrap()
        .output
        .unwrap();
    let second = process_bytes(&first, None, &RunOptions::default()).unwrap();
    assert_eq!(second.findings.total(), 0);
    assert!(second.output.is_none());
}

#[test]
fn protection_can_be_left_alone() {
    let options = RunOptions {
        strip_protection: false,
        ..RunOptions::default()
    };
    let processed = process_bytes(&protected_word(), None, &options).unwrap();
    assert!(processed.findings.protections.is_empty());
    assert!(processed.output.is_none());
}

const PML: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const DML: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

fn slide(number: usize) -> String {
    let mut shapes = format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Título 1"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>Resultados {number}</a:t></a:r></a:p></p:txBody></p:sp>"#
    );
    for index in 0..4 {
        let id = 10 + index;
        shapes.push_str(&format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="艺术字 {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>内部资料</a:t></a:r></a:p></p:txBody></p:sp>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{DML}" xmlns:p="{PML}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#
    )
}

fn wordart_presentation(slides: usize) -> Vec<u8> {
    let presentation = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:p="{PML}"><p:sldIdLst/></p:presentation>"#
    );
    let slides: Vec<(String, String)> = (1..=slides)
        .map(|n| (format!("ppt/slides/slide{n}.xml"), slide(n)))
        .collect();

    let mut parts: Vec<(&str, &[u8])> = vec![
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("ppt/presentation.xml", presentation.as_bytes()),
        ("ppt/media/image1.png", PNG_BYTES),
    ];
    parts.extend(
        slides
            .iter()
            .map(|(name, body)| (name.as_str(), body.as_bytes())),
    );
    package(&parts)
}

#[test]
fn wordart_shapes_across_a_deck_are_counted_in_preview() {
    let input = wordart_presentation(60);
    let processed = process_bytes(&input, None, &preview()).unwrap();

    assert_eq!(processed.kind, DocumentKind::PowerPoint);
    assert_eq!(processed.findings.pages, 60);
    assert_eq!(processed.findings.scanned, 300);
    assert_eq!(processed.findings.candidates.len(), 240);
    assert!(processed.output.is_none());
}

#[test]
fn wordart_shapes_across_a_deck_are_removed() {
    let input = wordart_presentation(60);
    let processed = process_bytes(&input, None, &RunOptions::default()).unwrap();
    assert_eq!(processed.findings.total(), 240);

    let output = processed.output.unwrap();
    assert_eq!(entry_names(&output), entry_names(&input));
    assert_eq!(
        read_part(&output, "ppt/media/image1.png"),
        read_part(&input, "ppt/media/image1.png")
    );

    for n in [1, 30, 60] {
        let body = read_text(&output, &format!("ppt/slides/slide{n}.xml"));
        assert!(!body.contains("艺术字"), "slide{n}");
        assert!(body.contains(&format!("Resultados {n}")));
    }

    let again = process_bytes(&output, None, &RunOptions::default()).unwrap();
    assert!(again.findings.candidates.is_empty());
    assert!(again.output.is_none());
}

#[test]
fn animations_of_removed_shapes_are_dropped() {
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{DML}" xmlns:p="{PML}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="4" name="水印"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>样本</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld><p:timing><p:tnLst><p:par><p:cTn id="1"/></p:par></p:tnLst><p:bldLst><p:bldP spid="4" grpId="0"/></p:bldLst></p:timing></p:sld>"#
    );
    let presentation = format!(r#"<p:presentation xmlns:p="{PML}"/>"#);
    let input = package(&[
        ("ppt/presentation.xml", presentation.as_bytes()),
        ("ppt/slides/slide1.xml", body.as_bytes()),
    ]);

    let output = process_bytes(&input, None, &RunOptions::default())
        .unwrap()
        .output
        .unwrap();
    let slide = read_text(&output, "ppt/slides/slide1.xml");
    assert!(!slide.contains("水印"));
    assert!(!slide.contains("bldP"));
}

#[test]
fn shadowed_title_survives_alongside_a_removed_wordart() {
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{DML}" xmlns:p="{PML}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="2" name="Título 1"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr><a:solidFill><a:srgbClr val="1F4E79"/></a:solidFill><a:effectLst><a:outerShdw blurRad="40000" dist="23000" dir="5400000" rotWithShape="0"><a:srgbClr val="000000"><a:alpha val="38000"/></a:srgbClr></a:outerShdw></a:effectLst></p:spPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>Resultados trimestrales</a:t></a:r></a:p></p:txBody></p:sp><p:sp><p:nvSpPr><p:cNvPr id="10" name="艺术字 10"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>内部资料</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
    );
    let presentation = format!(r#"<p:presentation xmlns:p="{PML}"/>"#);
    let input = package(&[
        ("ppt/presentation.xml", presentation.as_bytes()),
        ("ppt/slides/slide1.xml", body.as_bytes()),
    ]);

    let processed = process_bytes(&input, None, &RunOptions::default()).unwrap();
    assert_eq!(processed.findings.scanned, 2);
    assert_eq!(processed.findings.candidates.len(), 1);

    let slide = read_text(&processed.output.unwrap(), "ppt/slides/slide1.xml");
    assert!(slide.contains("Título 1"));
    assert!(slide.contains("Resultados trimestrales"));
    assert!(slide.contains("outerShdw"));
    assert!(!slide.contains("艺术字"));
}

const WORD_HEADER: &str = r##"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:p><w:r><w:t>Pie de empresa</w:t></w:r></w:p><w:p><w:r><w:pict><v:shapetype id="_x0000_t136" coordsize="21600,21600"/><v:shape id="PowerPlusWaterMarkObject357476642" o:spid="_x0000_s2049" type="#_x0000_t136" style="position:absolute;rotation:315;width:412pt;height:206pt" fillcolor="silver" stroked="f"><v:fill opacity=".5"/><v:textpath style="font-family:&quot;Calibri&quot;" string="BORRADOR"/></v:shape></w:pict></w:r></w:p></w:hdr>"##;

#[test]
fn word_header_watermark_is_removed() {
    let input = package(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("word/document.xml", WORD_DOCUMENT.as_bytes()),
        ("word/header1.xml", WORD_HEADER.as_bytes()),
    ]);

    let processed = process_bytes(&input, None, &RunOptions::default()).unwrap();
    assert_eq!(processed.findings.pages, 1);
    assert_eq!(processed.findings.candidates.len(), 1);
    match &processed.findings.candidates[0] {
        Candidate::Shape { shape, matched, .. } => {
            assert_eq!(shape.text, "BORRADOR");
            assert!(matched.contains(&crate::report::Criterion::LegacySignature));
        }
        other => panic!("candidato inesperado: {other:?}"),
    }

    let header = read_text(&processed.output.unwrap(), "word/header1.xml");
    assert!(!header.contains("PowerPlusWaterMarkObject"));
    assert!(!header.contains("w:pict"));
    assert!(header.contains("Pie de empresa"));
}

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><workbookProtection lockStructure="1"/><sheets/></workbook>"#;

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData/><sheetProtection sheet="1" objects="1"/><drawing r:id="rId1"/><picture r:id="rId2"/></worksheet>"#;

const SHEET_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/></Relationships>"#;

#[test]
fn excel_background_and_its_relationship_are_removed() {
    let input = package(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("xl/workbook.xml", WORKBOOK.as_bytes()),
        ("xl/worksheets/sheet1.xml", SHEET.as_bytes()),
        ("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS.as_bytes()),
        ("xl/media/image1.png", PNG_BYTES),
    ]);

    let processed = process_bytes(&input, None, &RunOptions::default()).unwrap();
    assert_eq!(processed.kind, DocumentKind::Excel);
    assert_eq!(processed.findings.protections.len(), 2);
    assert!(matches!(
        processed.findings.candidates.as_slice(),
        [Candidate::Background { element, .. }] if element == "picture"
    ));

    let output = processed.output.unwrap();
    let sheet = read_text(&output, "xl/worksheets/sheet1.xml");
    assert!(!sheet.contains("<picture"));
    assert!(!sheet.contains("sheetProtection"));
    assert!(sheet.contains(r#"<drawing r:id="rId1"/>"#));

    let rels = read_text(&output, "xl/worksheets/_rels/sheet1.xml.rels");
    assert!(rels.contains(r#"Id="rId1""#));
    assert!(!rels.contains(r#"Id="rId2""#));

    assert!(!read_text(&output, "xl/workbook.xml").contains("workbookProtection"));
    assert_eq!(read_part(&output, "xl/media/image1.png"), PNG_BYTES);
}

#[test]
fn zip_without_office_parts_is_rejected() {
    let input = package(&[("notas.txt", b"hola".as_slice())]);
    let error = process_bytes(&input, None, &RunOptions::default()).unwrap_err();
    assert_eq!(error.kind(), FailureKind::PartNotFound);
}

const OLE_HEADER: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[test]
fn encrypted_ole_package_is_reported() {
    let mut input = OLE_HEADER.to_vec();
    input.resize(512, 0);
    input.extend(
        "EncryptedPackage"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes()),
    );

    let error = process_bytes(&input, Some(Path::new("informe.docx")), &preview()).unwrap_err();
    assert_eq!(error.kind(), FailureKind::EncryptedDocument);
}

#[test]
fn legacy_binary_is_never_treated_as_zip() {
    let mut input = OLE_HEADER.to_vec();
    input.resize(1024, 0);

    let error = process_bytes(&input, Some(Path::new("viejo.xlsx")), &RunOptions::default())
        .unwrap_err();
    assert_eq!(error.kind(), FailureKind::UnsupportedLegacyFormat);
    assert!(error.to_string().contains(".xlsx"));

    let error = process_bytes(&input, Some(Path::new("viejo.doc")), &RunOptions::default())
        .unwrap_err();
    assert_eq!(error.kind(), FailureKind::UnsupportedLegacyFormat);
}

#[test]
fn unknown_bytes_are_rejected() {
    let error = process_bytes(b"texto plano", None, &RunOptions::default()).unwrap_err();
    assert_eq!(error.kind(), FailureKind::UnknownFormat);
}

/// Página con una línea horizontal y la misma palabra girada 29.8°.
fn slanted_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let content = b"BT /F1 12 Tf 72 720 Td (Informe CONFIDENCIAL) Tj ET \
q 0.8678 0.4970 -0.4970 0.8678 200 300 cm BT /F1 48 Tf 0 0 Td (CONFIDENCIAL) Tj ET Q"
        .to_vec();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn confidential() -> RunOptions {
    let mut options = RunOptions::default();
    options.rules.keywords = vec!["confidencial".to_string()];
    options
}

#[test]
fn pdf_slanted_keyword_run_is_removed() {
    let input = slanted_pdf();
    let processed = process_bytes(&input, None, &confidential()).unwrap();

    assert_eq!(processed.kind, DocumentKind::Pdf);
    assert_eq!(processed.findings.pages, 1);
    assert_eq!(processed.findings.scanned, 2);
    let [Candidate::TextRun(run)] = processed.findings.candidates.as_slice() else {
        panic!("se esperaba un candidato: {:?}", processed.findings.candidates);
    };
    assert_eq!(run.text, "CONFIDENCIAL");
    assert!((run.angle - 29.8).abs() < 0.05);

    let output = processed.output.unwrap();
    let doc = Document::load_mem(&output).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 1);
    let content = doc.get_page_content(pages[&1]).unwrap();
    assert!(contains(&content, b"(Informe CONFIDENCIAL) Tj"));
    assert!(!contains(&content, b"(CONFIDENCIAL)"));

    let again = process_bytes(&output, None, &confidential()).unwrap();
    assert!(again.findings.candidates.is_empty());
    assert!(again.output.is_none());
}

#[test]
fn pdf_preview_reports_without_output() {
    let options = RunOptions {
        preview: true,
        ..confidential()
    };
    let processed = process_bytes(&slanted_pdf(), None, &options).unwrap();
    assert_eq!(processed.findings.candidates.len(), 1);
    assert!(processed.output.is_none());
}

/// Dos páginas que comparten un primer flujo con `q … cm` sin cerrar; el
/// texto de cada página solo queda girado por ese prefijo.
fn shared_prefix_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let shared_id = doc.add_object(Stream::new(
        dictionary! {},
        b"q 0.7071 0.7071 -0.7071 0.7071 0 0 cm".to_vec(),
    ));
    let mut kids: Vec<Object> = Vec::new();
    for number in 1..=2 {
        let own = format!("BT /F1 48 Tf 100 100 Td (CONFIDENCIAL) Tj ET Q BT /F1 10 Tf 72 40 Td (Página {number}) Tj ET");
        let own_id = doc.add_object(Stream::new(dictionary! {}, own.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => vec![shared_id.into(), own_id.into()],
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 2,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[test]
fn shared_stream_transform_reaches_every_page() {
    let processed = process_bytes(&shared_prefix_pdf(), None, &confidential()).unwrap();
    assert_eq!(processed.findings.pages, 2);
    assert_eq!(processed.findings.candidates.len(), 2);

    let doc = Document::load_mem(&processed.output.unwrap()).unwrap();
    for (number, page_id) in doc.get_pages() {
        let content = doc.get_page_content(page_id).unwrap();
        assert!(!contains(&content, b"(CONFIDENCIAL)"), "página {number}");
        assert!(contains(&content, b"0.7071 0.7071 -0.7071 0.7071 0 0 cm"));
    }
}

const PDF_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];
const FILE_ID: &[u8] = b"docunlock-prueba";

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j = 0_u8;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, usize::from(j));
    }
    let (mut i, mut j) = (0_u8, 0_u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[usize::from(i)]);
            state.swap(usize::from(i), usize::from(j));
            byte ^ state[usize::from(state[usize::from(i)].wrapping_add(state[usize::from(j)]))]
        })
        .collect()
}

fn hex(bytes: Vec<u8>) -> Object {
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// `slanted_pdf` cifrado con RC4 de 128 bits (V2/R3) y contraseña de usuario vacía.
fn rc4_encrypted_pdf() -> Vec<u8> {
    let mut doc = Document::load_mem(&slanted_pdf()).unwrap();
    doc.trailer
        .set("ID", vec![hex(FILE_ID.to_vec()), hex(FILE_ID.to_vec())]);
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 2,
        "R" => 3,
        "Length" => 128,
        "P" => -3904,
        "O" => hex(vec![0x5A; 32]),
    });
    doc.trailer.set("Encrypt", encrypt_id);

    let key = lopdf::encryption::get_encryption_key(&doc, "", false).unwrap();
    let mut check = rc4(&key, &Md5::digest([PDF_PADDING.as_slice(), FILE_ID].concat()));
    for round in 1..=19_u8 {
        let round_key: Vec<u8> = key.iter().map(|byte| byte ^ round).collect();
        check = rc4(&round_key, &check);
    }
    check.extend_from_slice(&PDF_PADDING[..16]);
    doc.get_dictionary_mut(encrypt_id)
        .unwrap()
        .set("U", hex(check));

    let page_id = doc.get_pages()[&1];
    for stream_id in doc.get_page_contents(page_id) {
        let cipher =
            lopdf::encryption::decrypt_object(&key, stream_id, doc.get_object(stream_id).unwrap())
                .unwrap();
        doc.get_object_mut(stream_id)
            .and_then(Object::as_stream_mut)
            .unwrap()
            .set_content(cipher);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn with_encrypt_entries(bytes: &[u8], entries: &[(&str, Object)]) -> Vec<u8> {
    let mut doc = Document::load_mem(bytes).unwrap();
    let encrypt_id = doc
        .trailer
        .get(b"Encrypt")
        .and_then(Object::as_reference)
        .unwrap();
    let encrypt = doc.get_dictionary_mut(encrypt_id).unwrap();
    for (key, value) in entries {
        encrypt.set(*key, value.clone());
    }
    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap();
    output
}

#[test]
fn pdf_with_empty_user_password_is_decrypted_and_cleaned() {
    let input = rc4_encrypted_pdf();
    assert!(!contains(&input, b"(CONFIDENCIAL)"));

    let processed = process_bytes(&input, None, &confidential()).unwrap();
    assert!(matches!(
        processed.findings.protections.as_slice(),
        [hit] if hit.element == "Encrypt"
    ));
    assert_eq!(processed.findings.candidates.len(), 1);

    let output = processed.output.unwrap();
    let doc = Document::load_mem(&output).unwrap();
    assert!(doc.trailer.get(b"Encrypt").is_err());
    assert!(!doc.is_encrypted());
    let content = doc.get_page_content(doc.get_pages()[&1]).unwrap();
    assert!(contains(&content, b"(Informe CONFIDENCIAL) Tj"));
    assert!(!contains(&content, b"(CONFIDENCIAL)"));
}

#[test]
fn pdf_encryption_failures_are_told_apart() {
    let wrong_password =
        with_encrypt_entries(&rc4_encrypted_pdf(), &[("U", hex(vec![0; 32]))]);
    let error = process_bytes(&wrong_password, None, &RunOptions::default()).unwrap_err();
    assert_eq!(error.kind(), FailureKind::EncryptedDocument);
    assert!(error.to_string().contains("exige contraseña"));

    let aes = with_encrypt_entries(
        &rc4_encrypted_pdf(),
        &[("V", Object::Integer(4)), ("R", Object::Integer(4))],
    );
    let error = process_bytes(&aes, None, &RunOptions::default()).unwrap_err();
    assert_eq!(error.kind(), FailureKind::EncryptedDocument);
    assert!(error.to_string().contains("no admitido"));
    assert!(!error.to_string().contains("exige contraseña"));
}

#[test]
fn preview_writes_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("contrato.docx");
    fs::write(&input, protected_word()).unwrap();

    let report = process_file(&input, None, &preview());
    assert!(report.preview);
    assert!(report.output.is_none());
    assert!(matches!(report.outcome, Outcome::Unchanged));
    assert_eq!(report.removal_count(), 1);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn output_lands_next_to_the_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("contrato.docx");
    fs::write(&input, protected_word()).unwrap();

    let report = process_file(&input, None, &RunOptions::default());
    assert!(matches!(report.outcome, Outcome::Modified { removed: 1 }));
    let output = dir.path().join("contrato_limpio.docx");
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
    assert!(!read_text(&fs::read(&output).unwrap(), "word/settings.xml").contains("documentProtection"));
    assert_eq!(fs::read(&input).unwrap(), protected_word());
}

#[test]
fn clean_document_is_copied_verbatim() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("limpio.docx");
    let bytes = package(&[("word/document.xml", WORD_DOCUMENT.as_bytes())]);
    fs::write(&input, &bytes).unwrap();
    let target = dir.path().join("salida.docx");

    let report = process_file(&input, Some(&target), &RunOptions::default());
    assert!(matches!(report.outcome, Outcome::Unchanged));
    assert_eq!(fs::read(&target).unwrap(), bytes);
}

#[test]
fn failures_write_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("roto.pdf");
    fs::write(&input, b"esto no es un PDF").unwrap();

    let report = process_file(&input, None, &RunOptions::default());
    assert!(matches!(
        report.outcome,
        Outcome::Failed {
            kind: FailureKind::UnknownFormat,
            ..
        }
    ));
    assert!(report.output.is_none());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

    let missing = process_file(&dir.path().join("no_existe.docx"), None, &RunOptions::default());
    assert!(matches!(
        missing.outcome,
        Outcome::Failed {
            kind: FailureKind::Io,
            ..
        }
    ));
}
