//! Procesamiento masivo: descubre archivos en rutas y directorios y los procesa
//! en paralelo, informando el progreso por un canal.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use walkdir::WalkDir;

use crate::config::RunOptions;
use crate::pipeline::process_file;
use crate::report::{Outcome, ProcessReport};
use crate::utils::is_cleaned_output;

const SUPPORTED_EXTENSIONS: &[&str] = &["docx", "xlsx", "pptx", "pdf"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BatchEvent {
    Started { total: usize },
    Processing { index: usize, total: usize, path: PathBuf },
    Success { path: PathBuf, removed: usize },
    Failure { path: PathBuf, error: String },
    Finished { successes: usize, failures: usize },
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Expande las rutas recibidas. Los archivos indicados explícitamente se
/// aceptan siempre; de los directorios solo se toman las extensiones conocidas
/// y nunca las salidas `_limpio` de ejecuciones anteriores.
pub fn collect_inputs(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let found: Vec<PathBuf> = WalkDir::new(path)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("{}: {e}", path.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|file| is_supported(file) && !is_cleaned_output(file))
            .collect();

        debug!("{}: {} archivos admitidos", path.display(), found.len());
        files.extend(found);
    }

    files.sort();
    files.dedup();
    files
}

/// Procesa cada archivo con la salida por defecto. El orden de los informes
/// coincide con el de `files`.
pub fn run_batch(
    files: &[PathBuf],
    options: &RunOptions,
    events: Option<Sender<BatchEvent>>,
) -> Vec<ProcessReport> {
    let total = files.len();
    let send = |event: BatchEvent| {
        if let Some(sender) = &events {
            let _ = sender.send(event);
        }
    };

    send(BatchEvent::Started { total });
    let started = AtomicUsize::new(0);

    let reports: Vec<ProcessReport> = files
        .par_iter()
        .map(|path| {
            let index = started.fetch_add(1, Ordering::Relaxed) + 1;
            send(BatchEvent::Processing {
                index,
                total,
                path: path.clone(),
            });

            let report = process_file(path, None, options);
            match &report.outcome {
                Outcome::Failed { reason, .. } => send(BatchEvent::Failure {
                    path: path.clone(),
                    error: reason.clone(),
                }),
                _ => send(BatchEvent::Success {
                    path: path.clone(),
                    removed: report.removal_count(),
                }),
            }
            report
        })
        .collect();

    let failures = reports
        .iter()
        .filter(|report| report.outcome.is_failure())
        .count();
    let successes = total - failures;
    info!("lote terminado: {successes} correctos, {failures} con error");
    send(BatchEvent::Finished {
        successes,
        failures,
    });

    reports
}
