use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::{Error, Result};

use super::Container;

/// Serializa el contenedor y comprueba que el resultado se puede volver a abrir.
///
/// Cualquier fallo es fatal: nunca se devuelven bytes sin verificar.
pub fn repackage(container: &mut Container) -> Result<Vec<u8>> {
    let bytes = container
        .serialize()
        .map_err(|e| Error::Repackage(e.to_string()))?;
    verify_repackaged(container, &bytes)?;
    Ok(bytes)
}

fn verify_repackaged(source: &mut Container, output: &[u8]) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(output))
        .map_err(|e| Error::Repackage(format!("el resultado no es un ZIP válido: {e}")))?;

    if archive.len() != source.entries.len() {
        return Err(Error::Repackage(format!(
            "se esperaban {} entradas y se escribieron {}",
            source.entries.len(),
            archive.len()
        )));
    }

    for (index, entry) in source.entries.iter().enumerate() {
        let mut written = archive
            .by_index(index)
            .map_err(|e| Error::Repackage(format!("{}: {e}", entry.name)))?;
        if written.name() != entry.name {
            return Err(Error::Repackage(format!(
                "orden alterado: `{}` en lugar de `{}`",
                written.name(),
                entry.name
            )));
        }
        if entry.is_dir {
            continue;
        }

        if let Some(expected) = source.replaced.get(&entry.name) {
            let mut contents = Vec::new();
            written
                .read_to_end(&mut contents)
                .map_err(|e| Error::Repackage(format!("{}: {e}", entry.name)))?;
            if &contents != expected {
                return Err(Error::Repackage(format!(
                    "contenido inesperado en `{}`",
                    entry.name
                )));
            }
            if is_xml_part(&entry.name) {
                check_well_formed(&entry.name, &contents)?;
            }
            continue;
        }

        let Some(source_index) = entry.source_index else {
            continue;
        };
        let written_digest = part_digest(&mut written, &entry.name)?;
        drop(written);

        let mut original = source
            .archive
            .by_index(source_index)
            .map_err(|e| Error::Repackage(format!("{}: {e}", entry.name)))?;
        let original_digest = part_digest(&mut original, &entry.name)?;

        if written_digest != original_digest {
            return Err(Error::Repackage(format!(
                "la parte `{}` cambió sin haber sido modificada",
                entry.name
            )));
        }
    }

    Ok(())
}

fn is_xml_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".rels")
}

fn check_well_formed(name: &str, contents: &[u8]) -> Result<()> {
    let text = std::str::from_utf8(contents)
        .map_err(|e| Error::Repackage(format!("`{name}` no es UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    roxmltree::Document::parse(text)
        .map(|_| ())
        .map_err(|e| Error::Repackage(format!("`{name}` quedó mal formado: {e}")))
}

fn part_digest(reader: &mut impl Read, name: &str) -> Result<[u8; 32]> {
    let mut sha256 = Sha256::new();
    let mut buffer = [0_u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(bytes_read) => sha256.update(&buffer[..bytes_read]),
            Err(e) => return Err(Error::Repackage(format!("{name}: {e}"))),
        }
    }
    Ok(sha256.finalize().into())
}
