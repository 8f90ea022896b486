//! Acceso genérico a documentos empaquetados como ZIP de partes con nombre.

mod repackage;

pub use repackage::repackage;

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Entrada del contenedor en el orden original del archivo.
#[derive(Clone, Debug)]
pub(crate) struct EntryInfo {
    pub(crate) name: String,
    /// Índice dentro del ZIP original; `None` para partes nuevas.
    pub(crate) source_index: Option<usize>,
    pub(crate) compression: CompressionMethod,
    pub(crate) is_dir: bool,
}

/// Documento abierto en memoria: partes originales más las reemplazadas.
///
/// Las partes que nunca se reemplazan se copian en crudo al serializar, de modo
/// que sus bytes comprimidos salen idénticos a los de entrada.
pub struct Container {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    entries: Vec<EntryInfo>,
    replaced: HashMap<String, Vec<u8>>,
}

pub(crate) fn corrupt(error: impl Display) -> Error {
    Error::CorruptContainer(error.to_string())
}

impl Container {
    /// Abre un contenedor sin asumir que exista ninguna parte concreta.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(corrupt)?;
            entries.push(EntryInfo {
                name: file.name().to_string(),
                source_index: Some(index),
                compression: file.compression(),
                is_dir: file.is_dir(),
            });
        }

        Ok(Self {
            archive,
            entries,
            replaced: HashMap::new(),
        })
    }

    /// Nombres de las partes en el orden en que se escribirán.
    pub fn part_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == path)
    }

    /// Devuelve el contenido actual de una parte (reemplazado o original).
    pub fn get(&mut self, path: &str) -> Result<Vec<u8>> {
        if let Some(data) = self.replaced.get(path) {
            return Ok(data.clone());
        }

        let mut file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(Error::PartNotFound(path.to_string())),
            Err(e) => return Err(corrupt(e)),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| corrupt(format!("{path}: {e}")))?;
        Ok(contents)
    }

    /// Reemplaza (o añade) una parte.
    pub fn put(&mut self, path: &str, data: Vec<u8>) {
        if !self.contains(path) {
            self.entries.push(EntryInfo {
                name: path.to_string(),
                source_index: None,
                compression: CompressionMethod::Deflated,
                is_dir: false,
            });
        }
        self.replaced.insert(path.to_string(), data);
    }

    pub fn is_modified(&self) -> bool {
        !self.replaced.is_empty()
    }

    pub fn is_replaced(&self, path: &str) -> bool {
        self.replaced.contains_key(path)
    }

    /// Escribe el contenedor completo conservando orden y compresión originales.
    pub fn serialize(&mut self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            let replacement = self.replaced.get(&entry.name);

            match (entry.source_index, replacement) {
                (Some(index), None) => {
                    let file = self.archive.by_index_raw(index).map_err(corrupt)?;
                    writer.raw_copy_file(file).map_err(corrupt)?;
                }
                (Some(index), Some(data)) => {
                    let file = self.archive.by_index(index).map_err(corrupt)?;
                    let mut options =
                        FileOptions::<'_, ()>::default().compression_method(file.compression());
                    if let Some(mode) = file.unix_mode() {
                        options = options.unix_permissions(mode);
                    }
                    if let Some(time) = file.last_modified() {
                        options = options.last_modified_time(time);
                    }
                    drop(file);

                    writer
                        .start_file(entry.name.as_str(), options)
                        .map_err(corrupt)?;
                    writer.write_all(data).map_err(corrupt)?;
                }
                (None, Some(data)) => {
                    let options =
                        FileOptions::<'_, ()>::default().compression_method(entry.compression);
                    writer
                        .start_file(entry.name.as_str(), options)
                        .map_err(corrupt)?;
                    writer.write_all(data).map_err(corrupt)?;
                }
                (None, None) => {}
            }
        }

        let cursor = writer.finish().map_err(corrupt)?;
        Ok(cursor.into_inner())
    }
}
