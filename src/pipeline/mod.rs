//! Canal completo para un archivo: clasificar, quitar protecciones, quitar
//! marcas de agua, reempaquetar y escribir la salida de forma atómica.

use log::{info, warn};
use std::fs;
use std::path::Path;

use crate::classify::{FileFormat, OleKind, classify, describe, inspect_ole};
use crate::config::RunOptions;
use crate::container::{Container, repackage};
use crate::error::{Error, Result};
use crate::office::process_office;
use crate::pdf::process_pdf;
use crate::report::{DocumentKind, Findings, Outcome, ProcessReport};
use crate::utils::{default_output_path, write_atomic};

#[cfg(test)]
mod tests;

/// Resultado en memoria de procesar un documento.
#[derive(Debug)]
pub struct Processed {
    pub kind: DocumentKind,
    pub findings: Findings,
    /// Bytes nuevos; `None` si el documento no cambió o es vista previa.
    pub output: Option<Vec<u8>>,
}

/// Procesa un documento ya leído. `name` solo se usa para orientar mensajes.
pub fn process_bytes(bytes: &[u8], name: Option<&Path>, options: &RunOptions) -> Result<Processed> {
    match classify(bytes) {
        FileFormat::ZipXmlContainer => {
            let mut container = Container::open(bytes.to_vec())?;
            let (kind, findings) = process_office(&mut container, options)?;
            let output = if !options.preview && container.is_modified() {
                Some(repackage(&mut container)?)
            } else {
                None
            };
            Ok(Processed {
                kind,
                findings,
                output,
            })
        }
        FileFormat::Pdf => {
            let (findings, output) = process_pdf(bytes, options)?;
            Ok(Processed {
                kind: DocumentKind::Pdf,
                findings,
                output,
            })
        }
        FileFormat::OleLegacy => Err(ole_error(bytes, name)),
        FileFormat::Unknown => Err(Error::UnknownFormat(describe(bytes))),
    }
}

fn ole_error(bytes: &[u8], name: Option<&Path>) -> Error {
    let extension = name
        .and_then(Path::extension)
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match inspect_ole(bytes) {
        OleKind::EncryptedPackage => Error::EncryptedDocument(
            "documento Office cifrado con contraseña de apertura".to_string(),
        ),
        OleKind::LegacyBinary if matches!(extension.as_str(), "docx" | "xlsx" | "pptx") => {
            Error::UnsupportedLegacyFormat(format!(
                "la extensión .{extension} indica OOXML pero el contenido es un binario OLE; \
                 puede estar cifrado con un esquema no estándar"
            ))
        }
        OleKind::LegacyBinary => Error::UnsupportedLegacyFormat(
            "formato binario anterior a OOXML (.doc/.xls/.ppt); conviértalo antes de procesarlo"
                .to_string(),
        ),
    }
}

/// Procesa un archivo en disco. Sin `output`, la salida va junto a la entrada
/// con el sufijo `_limpio`. En vista previa no se escribe nada.
pub fn process_file(input: &Path, output: Option<&Path>, options: &RunOptions) -> ProcessReport {
    let fail = |error: Error| {
        warn!("{}: {error}", input.display());
        ProcessReport::failure(Some(input.to_path_buf()), options.preview, &error)
    };

    let bytes = match fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => return fail(Error::Io(e)),
    };

    let processed = match process_bytes(&bytes, Some(input), options) {
        Ok(processed) => processed,
        Err(error) => return fail(error),
    };

    if options.preview {
        info!(
            "{}: vista previa, {} elementos por eliminar",
            input.display(),
            processed.findings.total()
        );
        return ProcessReport {
            input: Some(input.to_path_buf()),
            output: None,
            kind: Some(processed.kind),
            preview: true,
            outcome: Outcome::Unchanged,
            findings: processed.findings,
        };
    }

    let target = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));

    let (data, outcome) = match &processed.output {
        Some(data) => (
            data.as_slice(),
            Outcome::Modified {
                removed: processed.findings.total(),
            },
        ),
        // Sin cambios se copian los bytes originales tal cual
        None => (bytes.as_slice(), Outcome::Unchanged),
    };

    if let Err(e) = write_atomic(&target, data) {
        return fail(Error::Io(e));
    }

    info!(
        "{} → {}: {} elementos eliminados",
        input.display(),
        target.display(),
        match outcome {
            Outcome::Modified { removed } => removed,
            _ => 0,
        }
    );

    ProcessReport {
        input: Some(input.to_path_buf()),
        output: Some(target),
        kind: Some(processed.kind),
        preview: false,
        outcome,
        findings: processed.findings,
    }
}
