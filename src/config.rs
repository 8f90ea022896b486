//! Opciones de ejecución y conjunto de reglas de detección.
//!
//! Ambos tipos se construyen una vez por lote y se comparten en solo lectura.

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAME_PATTERNS: [&str; 3] = ["艺术字", "WordArt", "水印"];
/// Umbral de opacidad en la escala 0..=100000 de DrawingML (80 %).
pub const DEFAULT_ALPHA_THRESHOLD: u32 = 80_000;
pub const DEFAULT_ANGLE_MIN: f64 = 5.0;
pub const DEFAULT_ANGLE_MAX: f64 = 85.0;
/// Tolerancia en grados al comparar contra los límites inclusivos.
pub const ANGLE_EPSILON: f64 = 1e-3;

/// Cómo se combinan los criterios habilitados.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationPolicy {
    /// Basta con que coincida un criterio habilitado.
    #[default]
    AnyMatch,
    /// Deben coincidir todos los criterios habilitados.
    AllEnabled,
}

/// Interruptores independientes de cada criterio de detección.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CriteriaToggles {
    pub keyword: bool,
    pub legacy_signature: bool,
    pub wordart: bool,
    pub alpha: bool,
    pub rotation: bool,
}

impl Default for CriteriaToggles {
    fn default() -> Self {
        Self {
            keyword: true,
            legacy_signature: true,
            wordart: true,
            alpha: true,
            rotation: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionRules {
    pub keywords: Vec<String>,
    pub name_patterns: Vec<String>,
    pub criteria: CriteriaToggles,
    pub policy: CombinationPolicy,
    pub alpha_threshold: u32,
    pub angle_min: f64,
    pub angle_max: f64,
    /// Exige un color de relleno grisáceo en los candidatos PDF.
    pub detect_color: bool,
}

impl Default for DetectionRules {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            name_patterns: DEFAULT_NAME_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            criteria: CriteriaToggles::default(),
            policy: CombinationPolicy::default(),
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            angle_min: DEFAULT_ANGLE_MIN,
            angle_max: DEFAULT_ANGLE_MAX,
            detect_color: false,
        }
    }
}

impl DetectionRules {
    /// Coincidencia por subcadena sin distinguir mayúsculas.
    pub fn matching_keyword(&self, haystack: &str) -> Option<&str> {
        find_ignore_case(&self.keywords, haystack)
    }

    pub fn matching_name_pattern(&self, name: &str) -> Option<&str> {
        find_ignore_case(&self.name_patterns, name)
    }

    /// Comprueba un ángulo ya normalizado a `[0, 90)` contra el rango inclusivo.
    pub fn angle_in_range(&self, angle: f64) -> bool {
        angle >= self.angle_min - ANGLE_EPSILON && angle <= self.angle_max + ANGLE_EPSILON
    }
}

fn find_ignore_case<'a>(needles: &'a [String], haystack: &str) -> Option<&'a str> {
    if haystack.is_empty() {
        return None;
    }
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .filter(|needle| !needle.is_empty())
        .find(|needle| haystack.contains(&needle.to_lowercase()))
        .map(String::as_str)
}

/// Normaliza un ángulo en grados a `[0, 90)`; las rotaciones de 90° en 90°
/// (páginas apaisadas, texto vertical) equivalen a 0.
pub fn fold_angle(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let folded = degrees.rem_euclid(90.0);
    // rem_euclid puede devolver exactamente 90.0 por redondeo
    if folded >= 90.0 { 0.0 } else { folded }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOptions {
    /// Solo escanear: informa candidatos y no escribe nada.
    pub preview: bool,
    pub strip_protection: bool,
    pub remove_watermarks: bool,
    pub rules: DetectionRules,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            preview: false,
            strip_protection: true,
            remove_watermarks: true,
            rules: DetectionRules::default(),
        }
    }
}
