//! DocUnlock: quita protecciones de edición y marcas de agua de documentos
//! Office (DOCX, XLSX, PPTX) y PDF.

pub mod batch;
pub mod classify;
pub mod config;
pub mod container;
pub mod error;
pub mod formatting;
pub mod office;
pub mod pdf;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use batch::{BatchEvent, collect_inputs, run_batch};
pub use classify::{FileFormat, classify};
pub use config::{CombinationPolicy, CriteriaToggles, DetectionRules, RunOptions};
pub use error::{Error, FailureKind, Result};
pub use pipeline::{Processed, process_bytes, process_file};
pub use report::{Candidate, Criterion, DocumentKind, Findings, Outcome, ProcessReport};
