//! Clasificación del formato a partir de las firmas binarias del archivo.

use serde::{Deserialize, Serialize};

const ZIP_LOCAL_HEADER: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const PDF_SIGNATURE: &[u8] = b"%PDF-";
/// Los lectores aceptan basura previa a la cabecera PDF dentro del primer KiB.
const PDF_HEADER_WINDOW: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FileFormat {
    ZipXmlContainer,
    OleLegacy,
    Pdf,
    Unknown,
}

/// Decide el formato probando ZIP, luego OLE/CFB y por último PDF.
pub fn classify(bytes: &[u8]) -> FileFormat {
    if bytes.starts_with(ZIP_LOCAL_HEADER) {
        FileFormat::ZipXmlContainer
    } else if bytes.starts_with(OLE_SIGNATURE) {
        FileFormat::OleLegacy
    } else if has_pdf_header(bytes) {
        FileFormat::Pdf
    } else {
        FileFormat::Unknown
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window
        .windows(PDF_SIGNATURE.len())
        .any(|candidate| candidate == PDF_SIGNATURE)
}

/// Resultado de inspeccionar un archivo compuesto OLE/CFB.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OleKind {
    /// Paquete OOXML cifrado (flujo `EncryptedPackage`).
    EncryptedPackage,
    /// Documento binario anterior a OOXML (.doc, .xls, .ppt).
    LegacyBinary,
}

/// Distingue un OOXML cifrado de un binario heredado buscando el nombre
/// del flujo `EncryptedPackage` (UTF-16LE) en el directorio CFB.
pub fn inspect_ole(bytes: &[u8]) -> OleKind {
    let needle: Vec<u8> = "EncryptedPackage"
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();

    if bytes.windows(needle.len()).any(|window| window == needle) {
        OleKind::EncryptedPackage
    } else {
        OleKind::LegacyBinary
    }
}

/// Describe el contenido detectado para enriquecer los mensajes de error.
pub fn describe(bytes: &[u8]) -> String {
    match infer::get(bytes) {
        Some(kind) => format!("{} (.{})", kind.mime_type(), kind.extension()),
        None => "contenido sin firma conocida".to_string(),
    }
}
