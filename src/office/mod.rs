//! Procesamiento de documentos Office empaquetados (DOCX, XLSX, PPTX).

pub mod constants;
mod protection;
mod references;
mod shape;
mod watermark;
mod xml;

pub use shape::ShapeDescriptor;
pub use watermark::evaluate;

use log::info;

use crate::config::RunOptions;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::report::{DocumentKind, Findings};

use constants::{CONTENT_TYPES_PART, MAIN_PARTS};

/// Determina el tipo de documento por su parte principal.
pub fn detect_kind(container: &Container) -> Result<DocumentKind> {
    MAIN_PARTS
        .iter()
        .find(|(part, _)| container.contains(part))
        .map(|(_, kind)| *kind)
        .ok_or_else(|| {
            let hint = if container.contains(CONTENT_TYPES_PART) {
                "el paquete no contiene documento, libro ni presentación"
            } else {
                "el ZIP no es un paquete Office"
            };
            Error::PartNotFound(format!(
                "{} ({hint})",
                MAIN_PARTS
                    .iter()
                    .map(|(part, _)| *part)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

/// Quita protecciones y marcas de agua según las opciones. En vista previa el
/// contenedor queda intacto y solo se devuelven los hallazgos.
pub fn process_office(
    container: &mut Container,
    options: &RunOptions,
) -> Result<(DocumentKind, Findings)> {
    let kind = detect_kind(container)?;
    let mut findings = Findings::default();

    if options.strip_protection {
        findings.protections = protection::strip_protection(container, kind, options.preview)?;
    }

    if options.remove_watermarks {
        findings.merge(watermark::remove_watermarks(
            container,
            kind,
            &options.rules,
            options.preview,
        )?);
    }

    info!(
        "{}: {} protecciones, {} candidatos en {} partes revisadas",
        kind.label(),
        findings.protections.len(),
        findings.candidates.len(),
        findings.pages
    );

    Ok((kind, findings))
}
