//! Tipos de error compartidos por todo el motor.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("El contenedor está dañado o no tiene el formato esperado: {0}")]
    CorruptContainer(String),
    #[error("El documento está cifrado con contraseña y no se puede procesar: {0}")]
    EncryptedDocument(String),
    #[error("Formato binario heredado que requiere conversión externa: {0}")]
    UnsupportedLegacyFormat(String),
    #[error("No se encontró la parte obligatoria `{0}`")]
    PartNotFound(String),
    #[error("Formato de archivo no reconocido: {0}")]
    UnknownFormat(String),
    #[error("No se pudo reempaquetar el documento: {0}")]
    Repackage(String),
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

/// Clasificación serializable del motivo de fallo.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CorruptContainer,
    EncryptedDocument,
    UnsupportedLegacyFormat,
    PartNotFound,
    UnknownFormat,
    Repackage,
    Io,
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::CorruptContainer(_) => FailureKind::CorruptContainer,
            Error::EncryptedDocument(_) => FailureKind::EncryptedDocument,
            Error::UnsupportedLegacyFormat(_) => FailureKind::UnsupportedLegacyFormat,
            Error::PartNotFound(_) => FailureKind::PartNotFound,
            Error::UnknownFormat(_) => FailureKind::UnknownFormat,
            Error::Repackage(_) => FailureKind::Repackage,
            Error::Io(_) => FailureKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
