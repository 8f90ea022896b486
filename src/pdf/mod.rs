//! Procesamiento de PDF con `lopdf`: cifrado con contraseña vacía y marcas de
//! agua de texto inclinado en los flujos de contenido de cada página.

mod cmap;
mod lexer;
mod state;
mod watermark;

use log::{debug, info, warn};
use lopdf::encryption::DecryptionError;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{HashMap, HashSet};

use crate::config::RunOptions;
use crate::error::{Error, Result};
use crate::report::{Candidate, Findings, ProtectionHit};

use cmap::{FontDecoder, ToUnicode};
use state::ContentState;
use watermark::{StreamLocation, apply_edits, scan_stream};

/// Límite de saltos por `Parent` al heredar recursos.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Analiza el PDF y, fuera de vista previa, devuelve los bytes reescritos.
/// `None` significa que no hay nada que escribir.
pub fn process_pdf(bytes: &[u8], options: &RunOptions) -> Result<(Findings, Option<Vec<u8>>)> {
    let mut doc = Document::load_mem(bytes)
        .map_err(|e| Error::CorruptContainer(format!("PDF ilegible: {e}")))?;
    let mut findings = Findings::default();

    let encrypted = doc.is_encrypted();
    if encrypted {
        doc.decrypt("").map_err(decryption_error)?;
        debug!("PDF cifrado con contraseña de usuario vacía");
        if options.strip_protection {
            findings.protections.push(ProtectionHit {
                part: "trailer".to_string(),
                element: "Encrypt".to_string(),
                count: 1,
            });
        }
    }

    let writable = !options.preview && (!encrypted || options.strip_protection);
    let mut pending: Vec<(ObjectId, Vec<u8>)> = Vec::new();

    if options.remove_watermarks {
        let pages = doc.get_pages();
        findings.pages = pages.len();
        let mut visited = HashSet::new();

        for (&page, &page_id) in &pages {
            let fonts = page_fonts(&doc, page_id);
            let mut state = ContentState::default();

            for stream_id in doc.get_page_contents(page_id) {
                let first_visit = visited.insert(stream_id);
                let Some(content) = doc
                    .get_object(stream_id)
                    .and_then(Object::as_stream)
                    .ok()
                    .and_then(stream_bytes)
                else {
                    if first_visit {
                        warn!("página {page}: flujo {stream_id:?} ilegible, se omite");
                    }
                    continue;
                };
                let instructions = match lexer::tokenize(&content) {
                    Ok(instructions) => instructions,
                    Err(e) => {
                        if first_visit {
                            warn!("página {page}: flujo {stream_id:?} sin analizar ({e})");
                        }
                        continue;
                    }
                };

                if !first_visit {
                    // Flujo compartido ya analizado: solo cuenta su efecto en
                    // el estado para los flujos siguientes de esta página
                    for instruction in &instructions {
                        state.apply(instruction);
                    }
                    continue;
                }

                let scan = scan_stream(
                    &content,
                    &instructions,
                    &mut state,
                    &fonts,
                    &options.rules,
                    StreamLocation {
                        page,
                        stream: stream_id,
                    },
                );
                findings.scanned += scan.shows;
                findings
                    .candidates
                    .extend(scan.candidates.into_iter().map(Candidate::TextRun));

                if writable && !scan.edits.is_empty() {
                    pending.push((stream_id, apply_edits(&content, scan.edits)));
                }
            }
        }
    }

    info!(
        "PDF: {} páginas, {} ejecuciones de texto, {} candidatos",
        findings.pages,
        findings.scanned,
        findings.candidates.len()
    );

    if !writable {
        if encrypted && !options.strip_protection && !findings.candidates.is_empty() {
            warn!("PDF cifrado: no se reescribe sin quitar el cifrado");
        }
        return Ok((findings, None));
    }
    if pending.is_empty() && !encrypted {
        return Ok((findings, None));
    }

    for (stream_id, content) in pending {
        if let Ok(Object::Stream(stream)) = doc.get_object_mut(stream_id) {
            stream.set_plain_content(content);
            if let Err(e) = stream.compress() {
                warn!("flujo {stream_id:?}: se guarda sin comprimir ({e})");
            }
        }
    }
    if encrypted {
        doc.trailer.remove(b"Encrypt");
    }

    let output = save_verified(&mut doc)?;
    Ok((findings, Some(output)))
}

/// Solo se descifra RC4 (V 1-2, R 2-3) con contraseña de usuario vacía.
fn decryption_error(error: lopdf::Error) -> Error {
    match error {
        lopdf::Error::Decryption(DecryptionError::IncorrectPassword) => {
            Error::EncryptedDocument("el PDF exige contraseña de apertura".to_string())
        }
        lopdf::Error::Decryption(
            e @ (DecryptionError::UnsupportedEncryption
            | DecryptionError::InvalidRevision
            | DecryptionError::InvalidKeyLength),
        ) => Error::EncryptedDocument(format!("cifrado PDF no admitido ({e})")),
        e => Error::CorruptContainer(format!("diccionario de cifrado inválido ({e})")),
    }
}

/// Guarda en memoria y comprueba que el resultado vuelve a abrirse con las
/// mismas páginas.
fn save_verified(doc: &mut Document) -> Result<Vec<u8>> {
    let expected_pages = doc.get_pages().len();
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::Repackage(format!("no se pudo guardar el PDF: {e}")))?;

    let reloaded = Document::load_mem(&output)
        .map_err(|e| Error::Repackage(format!("el PDF resultante no se abre: {e}")))?;
    let pages = reloaded.get_pages().len();
    if pages != expected_pages {
        return Err(Error::Repackage(format!(
            "el PDF resultante tiene {pages} páginas en lugar de {expected_pages}"
        )));
    }
    Ok(output)
}

fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

fn deref_dictionary<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(reference) => doc.get_dictionary(*reference).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Fuentes de la página, con recursos heredados del árbol de páginas.
fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontDecoder> {
    let mut fonts = HashMap::new();
    let mut node = doc.get_dictionary(page_id).ok();

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(dict) = node else {
            break;
        };
        if let Some(resources) = dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| deref_dictionary(doc, obj))
        {
            if let Some(font_dict) = resources
                .get(b"Font")
                .ok()
                .and_then(|obj| deref_dictionary(doc, obj))
            {
                for (name, font) in font_dict.iter() {
                    if let Some(font) = deref_dictionary(doc, font) {
                        fonts.insert(name.clone(), font_decoder(doc, font));
                    }
                }
            }
            break;
        }
        node = dict
            .get(b"Parent")
            .ok()
            .and_then(|obj| deref_dictionary(doc, obj));
    }

    fonts
}

fn font_decoder(doc: &Document, font: &Dictionary) -> FontDecoder {
    let composite = font
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|subtype| subtype == b"Type0");

    let to_unicode = match font.get(b"ToUnicode") {
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_stream)
            .ok()
            .and_then(stream_bytes)
            .and_then(|data| ToUnicode::parse(&data)),
        Ok(Object::Stream(stream)) => stream_bytes(stream).and_then(|data| ToUnicode::parse(&data)),
        _ => None,
    };

    FontDecoder {
        to_unicode,
        composite,
    }
}
