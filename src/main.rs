use clap::{CommandFactory, Parser, error::ErrorKind};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::SystemTime;

use docunlock::config::DEFAULT_NAME_PATTERNS;
use docunlock::formatting::{format_elapsed, format_size, format_system_time};
use docunlock::{
    BatchEvent, CombinationPolicy, DetectionRules, Outcome, ProcessReport, RunOptions,
    collect_inputs, process_file, run_batch,
};

#[derive(Parser)]
#[command(
    name = "docunlock",
    version,
    about = "Quita protecciones de edición y marcas de agua de documentos Office y PDF"
)]
struct Args {
    /// Archivos o directorios de entrada
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Archivo de salida (solo con una entrada)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Recorre los directorios de forma recursiva
    #[arg(short, long)]
    recursive: bool,

    /// Palabra clave de marca de agua (repetible)
    #[arg(short = 'k', long = "keyword")]
    keywords: Vec<String>,

    /// Patrón de nombre de forma (repetible, reemplaza los predeterminados)
    #[arg(long = "name-pattern")]
    name_patterns: Vec<String>,

    /// Solo informa lo que se eliminaría, sin escribir nada
    #[arg(long)]
    preview: bool,

    /// Emite el informe en JSON
    #[arg(long)]
    json: bool,

    /// Conserva las protecciones de edición
    #[arg(long)]
    no_protection: bool,

    /// Conserva las marcas de agua
    #[arg(long)]
    no_watermark: bool,

    #[arg(long)]
    no_keyword: bool,

    #[arg(long)]
    no_legacy: bool,

    #[arg(long)]
    no_wordart: bool,

    #[arg(long)]
    no_alpha: bool,

    #[arg(long)]
    no_rotation: bool,

    /// Exige relleno gris claro en el texto PDF
    #[arg(long)]
    detect_color: bool,

    /// Exige que coincidan todos los criterios habilitados
    #[arg(long)]
    all_criteria: bool,

    /// Umbral de opacidad (0-100000)
    #[arg(long, default_value_t = 80_000, value_parser = clap::value_parser!(u32).range(0..=100_000))]
    alpha: u32,

    /// Ángulo mínimo en grados
    #[arg(long, default_value_t = 5.0)]
    angle_min: f64,

    /// Ángulo máximo en grados
    #[arg(long, default_value_t = 85.0)]
    angle_max: f64,
}

impl Args {
    fn run_options(&self) -> RunOptions {
        let mut rules = DetectionRules {
            keywords: self.keywords.clone(),
            name_patterns: if self.name_patterns.is_empty() {
                DEFAULT_NAME_PATTERNS.iter().map(|p| p.to_string()).collect()
            } else {
                self.name_patterns.clone()
            },
            alpha_threshold: self.alpha,
            angle_min: self.angle_min,
            angle_max: self.angle_max,
            detect_color: self.detect_color,
            ..DetectionRules::default()
        };
        rules.criteria.keyword = !self.no_keyword;
        rules.criteria.legacy_signature = !self.no_legacy;
        rules.criteria.wordart = !self.no_wordart;
        rules.criteria.alpha = !self.no_alpha;
        rules.criteria.rotation = !self.no_rotation;
        if self.all_criteria {
            rules.policy = CombinationPolicy::AllEnabled;
        }

        RunOptions {
            preview: self.preview,
            strip_protection: !self.no_protection,
            remove_watermarks: !self.no_watermark,
            rules,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if !(0.0..90.0).contains(&args.angle_min)
        || !(0.0..90.0).contains(&args.angle_max)
        || args.angle_min > args.angle_max
    {
        Args::command()
            .error(
                ErrorKind::ValueValidation,
                "los ángulos deben cumplir 0 <= --angle-min <= --angle-max < 90",
            )
            .exit();
    }

    let options = args.run_options();
    let start = SystemTime::now();

    let reports = match &args.output {
        Some(output) => {
            if args.inputs.len() != 1 || args.inputs[0].is_dir() {
                Args::command()
                    .error(
                        ErrorKind::ArgumentConflict,
                        "--output solo admite un único archivo de entrada",
                    )
                    .exit();
            }
            vec![process_file(&args.inputs[0], Some(output), &options)]
        }
        None => {
            let files = collect_inputs(&args.inputs, args.recursive);
            if files.is_empty() {
                eprintln!("No se encontraron documentos admitidos.");
                return ExitCode::FAILURE;
            }
            run_with_progress(&files, &options, !args.json)
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("No se pudo serializar el informe: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        for report in &reports {
            print_report(report);
        }
        print_summary(&reports, start);
    }

    if reports.iter().any(|report| report.outcome.is_failure()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_with_progress(files: &[PathBuf], options: &RunOptions, show: bool) -> Vec<ProcessReport> {
    if !show || files.len() == 1 {
        return run_batch(files, options, None);
    }

    let (sender, receiver) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in receiver {
            if let BatchEvent::Processing { index, total, path } = event {
                eprintln!("[{index}/{total}] {}", path.display());
            }
        }
    });

    let reports = run_batch(files, options, Some(sender));
    let _ = printer.join();
    reports
}

fn print_report(report: &ProcessReport) {
    let input = report
        .input
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    let kind = report.kind.map(|kind| kind.label()).unwrap_or("?");

    match &report.outcome {
        Outcome::Failed { reason, .. } => {
            println!("✘ {input}");
            println!("    {reason}");
            return;
        }
        _ if report.preview => {
            println!("◌ {input} ({kind}): vista previa");
            println!("    elementos por eliminar: {}", report.removal_count());
        }
        Outcome::Modified { removed } => {
            println!("✔ {input} ({kind})");
            println!("    elementos eliminados: {removed}");
        }
        Outcome::Unchanged => {
            println!("✔ {input} ({kind}): sin cambios");
        }
    }

    let findings = &report.findings;
    let surface = if report.kind == Some(docunlock::DocumentKind::Pdf) {
        "páginas"
    } else {
        "partes"
    };
    println!(
        "    {surface}: {} | elementos revisados: {}",
        findings.pages, findings.scanned
    );

    let patterns = report.detected_patterns();
    if !patterns.is_empty() {
        println!(
            "    patrones detectados: {}",
            patterns.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    if let Some(output) = &report.output {
        match fs::metadata(output) {
            Ok(metadata) => {
                let modified = metadata
                    .modified()
                    .map(format_system_time)
                    .unwrap_or_default();
                println!(
                    "    salida: {} ({}, {modified})",
                    output.display(),
                    format_size(metadata.len())
                );
            }
            Err(_) => println!("    salida: {}", output.display()),
        }
    }
}

fn print_summary(reports: &[ProcessReport], start: SystemTime) {
    let failures = reports
        .iter()
        .filter(|report| report.outcome.is_failure())
        .count();
    let removed: usize = reports
        .iter()
        .filter(|report| !report.outcome.is_failure())
        .map(ProcessReport::removal_count)
        .sum();

    println!(
        "\n{} archivos, {} con error, {removed} elementos{} en {}",
        reports.len(),
        failures,
        if reports.iter().any(|report| report.preview) {
            " por eliminar"
        } else {
            " eliminados"
        },
        format_elapsed(start)
    );
}
