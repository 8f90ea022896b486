//! Modelos compartidos para informar el resultado de cada archivo.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{Error, FailureKind};
use crate::office::ShapeDescriptor;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DocumentKind {
    Word,
    Excel,
    PowerPoint,
    Pdf,
}

impl DocumentKind {
    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Word => "Word",
            DocumentKind::Excel => "Excel",
            DocumentKind::PowerPoint => "PowerPoint",
            DocumentKind::Pdf => "PDF",
        }
    }
}

/// Criterios de detección de marcas de agua en formas Office.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Keyword,
    LegacySignature,
    WordArt,
    Alpha,
    Rotation,
}

impl Criterion {
    pub fn label(self) -> &'static str {
        match self {
            Criterion::Keyword => "palabra clave",
            Criterion::LegacySignature => "firma de marca de agua",
            Criterion::WordArt => "WordArt",
            Criterion::Alpha => "transparencia",
            Criterion::Rotation => "rotación",
        }
    }
}

/// Etiqueta de protección encontrada (y eliminada fuera del modo vista previa).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtectionHit {
    pub part: String,
    pub element: String,
    pub count: usize,
}

/// Ejecución de texto PDF candidata a marca de agua.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextRunCandidate {
    pub page: u32,
    pub stream: (u32, u16),
    pub operator: String,
    pub text: String,
    /// Ángulo normalizado a `[0, 90)`.
    pub angle: f64,
    pub matrix: [f64; 6],
    /// Rango de bytes del operador dentro del flujo descomprimido.
    pub span: (usize, usize),
    pub keyword: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Candidate {
    Shape {
        part: String,
        shape: ShapeDescriptor,
        matched: Vec<Criterion>,
    },
    Background {
        part: String,
        element: String,
    },
    TextRun(TextRunCandidate),
}

impl Candidate {
    fn pattern(&self) -> Vec<String> {
        match self {
            Candidate::Shape { matched, .. } => matched
                .iter()
                .map(|criterion| criterion.label().to_string())
                .collect(),
            Candidate::Background { .. } => vec!["fondo".to_string()],
            Candidate::TextRun(run) => {
                let mut patterns = vec![format!("rotación ({:.1}°)", run.angle)];
                if let Some(keyword) = &run.keyword {
                    patterns.push(format!("palabra clave ({keyword})"));
                }
                patterns
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Unchanged,
    Modified { removed: usize },
    Failed { kind: FailureKind, reason: String },
}

impl Outcome {
    pub fn failed(error: &Error) -> Self {
        Outcome::Failed {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// Hallazgos del motor para un documento, antes de decidir la salida.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Findings {
    pub protections: Vec<ProtectionHit>,
    pub candidates: Vec<Candidate>,
    pub pages: usize,
    pub scanned: usize,
}

impl Findings {
    pub fn total(&self) -> usize {
        self.protections.iter().map(|hit| hit.count).sum::<usize>() + self.candidates.len()
    }

    pub fn merge(&mut self, other: Findings) {
        self.protections.extend(other.protections);
        self.candidates.extend(other.candidates);
        self.pages += other.pages;
        self.scanned += other.scanned;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessReport {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub kind: Option<DocumentKind>,
    pub preview: bool,
    pub outcome: Outcome,
    #[serde(flatten)]
    pub findings: Findings,
}

impl ProcessReport {
    pub fn failure(input: Option<PathBuf>, preview: bool, error: &Error) -> Self {
        Self {
            input,
            output: None,
            kind: None,
            preview,
            outcome: Outcome::failed(error),
            findings: Findings::default(),
        }
    }

    /// Elementos eliminados o, en vista previa, que se eliminarían.
    pub fn removal_count(&self) -> usize {
        self.findings.total()
    }

    /// Resumen de los patrones que dispararon la detección.
    pub fn detected_patterns(&self) -> BTreeSet<String> {
        let mut patterns: BTreeSet<String> = self
            .findings
            .candidates
            .iter()
            .flat_map(Candidate::pattern)
            .collect();
        for hit in &self.findings.protections {
            patterns.insert(format!("protección ({})", hit.element));
        }
        patterns
    }
}
