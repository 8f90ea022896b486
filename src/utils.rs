//! Utilidades compartidas para nombrar y escribir archivos de salida.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sufijo del archivo limpio cuando no se indica salida.
pub const OUTPUT_SUFFIX: &str = "_limpio";

/// Crea un nombre de archivo temporal oculto en el mismo directorio que `path`,
/// para que el `rename` final no cruce sistemas de archivos.
pub fn generate_temp_filename(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let extension = path.extension().unwrap_or_default().to_string_lossy();

    // Los lotes paralelos pueden escribir varias salidas en el mismo segundo
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    parent.join(format!(
        ".{}_temp_{}_{}.{}",
        stem,
        std::process::id(),
        timestamp,
        extension
    ))
}

/// `informe.docx` → `informe_limpio.docx`, junto al original.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let name = match input.extension() {
        Some(extension) => format!("{stem}{OUTPUT_SUFFIX}.{}", extension.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };
    input.with_file_name(name)
}

pub fn is_cleaned_output(path: &Path) -> bool {
    path.file_stem()
        .is_some_and(|stem| stem.to_string_lossy().ends_with(OUTPUT_SUFFIX))
}

/// Escribe en un temporal y lo promueve con `rename`. Ante cualquier fallo el
/// temporal se borra y el destino queda como estaba.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = generate_temp_filename(path);

    if let Err(e) = fs::write(&temp_path, data) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}
