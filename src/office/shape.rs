//! Descriptores de forma: la vista de solo lectura que se evalúa contra las
//! reglas de detección. Se construyen a partir de VML (`w:pict`) o DrawingML
//! (`w:drawing`, `p:sp`).

use roxmltree::Node;
use serde::{Deserialize, Serialize};

use crate::config::fold_angle;

use super::constants::{
    DML_NS, PML_NS, VML_ART_TEXT_TYPE, VML_NS, VML_OFFICE_NS, WATERMARK_OBJECT_NAMES, WML_NS,
    WP_NS, WPS_NS,
};
use super::xml::{child, descendant, is_named, ns_attribute, text_content};

/// Elementos VML que dibujan algo; `shapetype` solo declara plantillas.
const VML_DRAWABLES: &[&str] = &[
    "shape", "rect", "roundrect", "oval", "line", "polyline", "arc", "curve", "image",
];

/// Unidades de rotación DrawingML por grado.
const DRAWING_ANGLE_UNIT: f64 = 60_000.0;
/// Escala de porcentaje DrawingML (100 % = 100000).
const ALPHA_SCALE: f64 = 100_000.0;
/// Valores VML en punto fijo 16.16 (`32768f`, `5898240fd`).
const FIXED_POINT_UNIT: f64 = 65_536.0;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    /// `o:spid`, `cNvPr/@id` o `docPr/@id`, según el origen.
    pub id: Option<String>,
    pub name: String,
    pub from_word_art: bool,
    /// Opacidad en la escala 0..=100000; `None` si la forma no declara alfa.
    pub alpha: Option<u32>,
    /// Grados normalizados a `[0, 360)`.
    pub rotation: Option<f64>,
    pub color: Option<String>,
    pub text: String,
    pub locks: Vec<String>,
    /// Atributo `type` de una forma VML.
    pub vml_type: Option<String>,
    /// El estilo VML declara `rotation:` explícitamente.
    pub rotation_styled: bool,
}

impl ShapeDescriptor {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Rotación plegada a `[0, 90)`, comparable con el rango configurado.
    pub fn folded_rotation(&self) -> Option<f64> {
        self.rotation.map(fold_angle)
    }

    /// Firma de las marcas de agua que Word genera por sí mismo.
    pub fn has_legacy_signature(&self) -> bool {
        let art_text = self
            .vml_type
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case(VML_ART_TEXT_TYPE));
        let canonical_name = WATERMARK_OBJECT_NAMES.iter().any(|canonical| {
            self.name.contains(canonical)
                || self.id.as_deref().is_some_and(|id| id.contains(canonical))
        });
        art_text || canonical_name || self.rotation_styled
    }
}

/// Descriptor de un `w:pict`. `None` si no contiene ninguna forma VML dibujable.
pub(crate) fn from_vml(pict: Node<'_, '_>) -> Option<ShapeDescriptor> {
    let shape = pict.descendants().find(|node| {
        node.is_element()
            && node
                .tag_name()
                .namespace()
                .is_some_and(|ns| VML_NS.contains(&ns))
            && VML_DRAWABLES.contains(&node.tag_name().name())
    })?;

    let style = shape.attribute("style").unwrap_or_default();
    let rotation_styled = style_value(style, "rotation").is_some();
    let textpath = descendant(shape, VML_NS, "textpath");

    let mut text = textpath
        .and_then(|node| node.attribute("string"))
        .unwrap_or_default()
        .to_string();
    text.push_str(&text_content(shape, WML_NS, "t"));

    let vml_type = shape.attribute("type").map(str::to_string);
    let from_word_art = textpath.is_some()
        || vml_type
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case(VML_ART_TEXT_TYPE));

    Some(ShapeDescriptor {
        id: ns_attribute(shape, VML_OFFICE_NS, "spid")
            .or_else(|| shape.attribute("id"))
            .map(str::to_string),
        name: shape.attribute("id").unwrap_or_default().to_string(),
        from_word_art,
        alpha: child(shape, VML_NS, "fill")
            .and_then(|fill| fill.attribute("opacity"))
            .and_then(parse_vml_opacity),
        rotation: style_value(style, "rotation")
            .and_then(parse_vml_angle)
            .map(normalize_rotation),
        color: shape.attribute("fillcolor").map(str::to_string),
        text,
        locks: child(shape, VML_OFFICE_NS, "lock")
            .map(|lock| {
                lock.attributes()
                    .filter(|attr| attr.namespace().is_none() && is_true(attr.value()))
                    .map(|attr| attr.name().to_string())
                    .collect()
            })
            .unwrap_or_default(),
        vml_type,
        rotation_styled,
    })
}

/// Descriptor de un `w:drawing` de encabezado.
pub(crate) fn from_word_drawing(drawing: Node<'_, '_>) -> Option<ShapeDescriptor> {
    let doc_pr = descendant(drawing, WP_NS, "docPr")?;
    let mut text = text_content(drawing, WML_NS, "t");
    text.push_str(&text_content(drawing, DML_NS, "t"));

    let mut shape = drawing_properties(drawing);
    shape.id = doc_pr.attribute("id").map(str::to_string);
    shape.name = doc_pr.attribute("name").unwrap_or_default().to_string();
    shape.text = text;
    Some(shape)
}

/// Descriptor de un `p:sp` de diapositiva.
pub(crate) fn from_slide_shape(sp: Node<'_, '_>) -> Option<ShapeDescriptor> {
    let c_nv_pr = child(sp, PML_NS, "nvSpPr").and_then(|nv| child(nv, PML_NS, "cNvPr"))?;

    let mut shape = drawing_properties(sp);
    shape.id = c_nv_pr.attribute("id").map(str::to_string);
    shape.name = c_nv_pr.attribute("name").unwrap_or_default().to_string();
    shape.text = text_content(sp, DML_NS, "t");
    Some(shape)
}

/// Propiedades comunes de DrawingML: WordArt, alfa, rotación, color y bloqueos.
fn drawing_properties(node: Node<'_, '_>) -> ShapeDescriptor {
    let body_pr = node.descendants().find(|n| {
        is_named(*n, DML_NS, "bodyPr") || is_named(*n, WPS_NS, "bodyPr")
    });

    let color = node
        .descendants()
        .filter(|n| {
            is_named(*n, DML_NS, "srgbClr")
                || is_named(*n, DML_NS, "schemeClr")
                || is_named(*n, DML_NS, "prstClr")
        })
        .find(|n| in_own_fill(*n, node))
        .and_then(|n| n.attribute("val"))
        .map(str::to_string);

    let locks = node
        .descendants()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name().ends_with("Locks")
                && n.tag_name()
                    .namespace()
                    .is_some_and(|ns| DML_NS.contains(&ns))
        })
        .flat_map(|n| n.attributes())
        .filter(|attr| is_true(attr.value()))
        .map(|attr| attr.name().to_string())
        .collect();

    ShapeDescriptor {
        from_word_art: body_pr
            .and_then(|n| n.attribute("fromWordArt"))
            .is_some_and(is_true),
        alpha: node
            .descendants()
            .filter(|n| is_named(*n, DML_NS, "alpha") && in_own_fill(*n, node))
            .find_map(|n| n.attribute("val").and_then(parse_drawing_percentage)),
        rotation: descendant(node, DML_NS, "xfrm")
            .and_then(|n| n.attribute("rot"))
            .and_then(|rot| rot.trim().parse::<f64>().ok())
            .map(|rot| normalize_rotation(rot / DRAWING_ANGLE_UNIT)),
        color,
        locks,
        ..ShapeDescriptor::default()
    }
}

/// Contenedores de color que no pintan la forma: sombras, efectos, contornos y
/// referencias de estilo del tema.
const FOREIGN_COLOR_CONTAINERS: &[&str] =
    &["effectLst", "effectDag", "effectRef", "ln", "lnRef", "style"];
const FILL_CONTAINERS: &[&str] = &["solidFill", "gradFill"];

/// El color pertenece al relleno de la forma o de su texto, no a un efecto.
fn in_own_fill(color: Node<'_, '_>, shape: Node<'_, '_>) -> bool {
    let mut in_fill = false;
    for ancestor in color.ancestors().skip(1) {
        if ancestor == shape {
            break;
        }
        let name = ancestor.tag_name().name();
        if FOREIGN_COLOR_CONTAINERS.contains(&name) {
            return false;
        }
        if FILL_CONTAINERS.contains(&name)
            && ancestor
                .tag_name()
                .namespace()
                .is_some_and(|ns| DML_NS.contains(&ns))
        {
            in_fill = true;
        }
    }
    in_fill
}

fn is_true(value: &str) -> bool {
    matches!(value.trim(), "1" | "t" | "true" | "on")
}

fn normalize_rotation(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let normalized = degrees.rem_euclid(360.0);
    if normalized >= 360.0 { 0.0 } else { normalized }
}

fn to_alpha(value: f64) -> Option<u32> {
    value
        .is_finite()
        .then(|| value.round().clamp(0.0, ALPHA_SCALE) as u32)
}

/// `50000` o `50%`.
pub(crate) fn parse_drawing_percentage(value: &str) -> Option<u32> {
    let value = value.trim();
    let scaled = match value.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f64>().ok()? * 1_000.0,
        None => value.parse::<f64>().ok()?,
    };
    to_alpha(scaled)
}

/// `0.5`, `.5`, `50%` o punto fijo `32768f`.
pub(crate) fn parse_vml_opacity(value: &str) -> Option<u32> {
    let value = value.trim();
    let fraction = if let Some(fixed) = value.strip_suffix('f') {
        fixed.trim().parse::<f64>().ok()? / FIXED_POINT_UNIT
    } else if let Some(percent) = value.strip_suffix('%') {
        percent.trim().parse::<f64>().ok()? / 100.0
    } else {
        value.parse::<f64>().ok()?
    };
    to_alpha(fraction * ALPHA_SCALE)
}

/// Ángulo VML en grados, o en punto fijo con sufijo `fd`.
pub(crate) fn parse_vml_angle(value: &str) -> Option<f64> {
    let value = value.trim();
    match value.strip_suffix("fd") {
        Some(fixed) => Some(fixed.trim().parse::<f64>().ok()? / FIXED_POINT_UNIT),
        None => value.trim_end_matches("deg").trim().parse().ok(),
    }
}

fn style_value<'a>(style: &'a str, key: &str) -> Option<&'a str> {
    style
        .split(';')
        .filter_map(|declaration| declaration.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(key))
        .map(|(_, value)| value.trim())
}
