//! Detección y eliminación de marcas de agua en formas de encabezados y
//! diapositivas, más la regla de fondo global.

use log::{debug, warn};
use roxmltree::Node;
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;

use crate::config::{CombinationPolicy, CriteriaToggles, DetectionRules};
use crate::container::Container;
use crate::error::Result;
use crate::report::{Candidate, Criterion, DocumentKind, Findings};

use super::constants::{BACKGROUND_RULES, MC_NS, PML_NS, SHAPE_SURFACES, WML_NS};
use super::references::{prune_relationships, prune_timing, relationship_ids, unreferenced};
use super::shape::{self, ShapeDescriptor};
use super::xml::{PartText, element_matches, is_named, parse, splice_out};

/// `Some(true)` coincide, `Some(false)` no coincide, `None` no aplica.
type Check = fn(&ShapeDescriptor, &DetectionRules) -> Option<bool>;

const CRITERIA: &[(Criterion, Check)] = &[
    (Criterion::Keyword, keyword_matches),
    (Criterion::LegacySignature, legacy_signature_matches),
    (Criterion::WordArt, wordart_matches),
    (Criterion::Alpha, alpha_matches),
    (Criterion::Rotation, rotation_matches),
];

fn keyword_matches(shape: &ShapeDescriptor, rules: &DetectionRules) -> Option<bool> {
    Some(
        rules.matching_keyword(&shape.name).is_some()
            || rules.matching_keyword(&shape.text).is_some()
            || rules.matching_name_pattern(&shape.name).is_some(),
    )
}

fn legacy_signature_matches(shape: &ShapeDescriptor, _: &DetectionRules) -> Option<bool> {
    Some(shape.has_legacy_signature())
}

fn wordart_matches(shape: &ShapeDescriptor, _: &DetectionRules) -> Option<bool> {
    Some(shape.from_word_art)
}

fn alpha_matches(shape: &ShapeDescriptor, rules: &DetectionRules) -> Option<bool> {
    shape.alpha.map(|alpha| alpha < rules.alpha_threshold)
}

/// Solo las formas con texto: una imagen girada no basta para ser marca de agua.
fn rotation_matches(shape: &ShapeDescriptor, rules: &DetectionRules) -> Option<bool> {
    if !shape.has_text() {
        return None;
    }
    Some(rules.angle_in_range(shape.folded_rotation().unwrap_or(0.0)))
}

fn enabled(criterion: Criterion, toggles: &CriteriaToggles) -> bool {
    match criterion {
        Criterion::Keyword => toggles.keyword,
        Criterion::LegacySignature => toggles.legacy_signature,
        Criterion::WordArt => toggles.wordart,
        Criterion::Alpha => toggles.alpha,
        Criterion::Rotation => toggles.rotation,
    }
}

/// Criterios que dispararon. Vacío si la forma no es candidata según la política.
pub fn evaluate(shape: &ShapeDescriptor, rules: &DetectionRules) -> Vec<Criterion> {
    let mut matched = Vec::new();
    let mut failed = false;

    for (criterion, check) in CRITERIA {
        if !enabled(*criterion, &rules.criteria) {
            continue;
        }
        match check(shape, rules) {
            Some(true) => matched.push(*criterion),
            Some(false) => failed = true,
            None => {}
        }
    }

    if rules.policy == CombinationPolicy::AllEnabled && failed {
        matched.clear();
    }
    matched
}

/// Cambios pendientes sobre una parte, calculados mientras el árbol está vivo.
#[derive(Default)]
struct PartEdit {
    ranges: Vec<Range<usize>>,
    relationships: BTreeSet<String>,
    shape_ids: HashSet<String>,
}

impl PartEdit {
    fn covers(&self, range: &Range<usize>) -> bool {
        self.ranges
            .iter()
            .any(|unit| unit.start <= range.start && range.end <= unit.end)
    }

    fn add(&mut self, unit: Node<'_, '_>) {
        self.relationships
            .extend(relationship_ids(unit).map(str::to_string));
        self.ranges.push(unit.range());
    }
}

/// Elemento que se retira: el bloque `mc:AlternateContent` entero cuando la
/// forma es una de sus alternativas.
fn removal_unit<'a, 'input>(element: Node<'a, 'input>) -> Node<'a, 'input> {
    let alternative = element
        .parent_element()
        .filter(|parent| is_named(*parent, MC_NS, "Choice") || is_named(*parent, MC_NS, "Fallback"));
    alternative
        .and_then(|parent| parent.parent_element())
        .filter(|block| is_named(*block, MC_NS, "AlternateContent"))
        .unwrap_or(element)
}

fn shape_at(kind: DocumentKind, element: Node<'_, '_>) -> Option<Option<ShapeDescriptor>> {
    match kind {
        DocumentKind::Word if is_named(element, WML_NS, "pict") => Some(shape::from_vml(element)),
        DocumentKind::Word if is_named(element, WML_NS, "drawing") => {
            Some(shape::from_word_drawing(element))
        }
        DocumentKind::PowerPoint if is_named(element, PML_NS, "sp") => {
            Some(shape::from_slide_shape(element))
        }
        _ => None,
    }
}

/// Escanea todas las superficies de formas y los fondos del documento.
/// Fuera de vista previa, los candidatos se eliminan del contenedor.
pub(crate) fn remove_watermarks(
    container: &mut Container,
    kind: DocumentKind,
    rules: &DetectionRules,
    preview: bool,
) -> Result<Findings> {
    let names = container.part_names();
    let mut findings = Findings::default();

    for surface in SHAPE_SURFACES.iter().filter(|surface| surface.kind == kind) {
        let mut parts: Vec<&String> = names
            .iter()
            .filter(|name| surface.part.matches(name))
            .collect();
        parts.sort_by_key(|name| surface.part.ordinal(name));

        for name in parts {
            findings.pages += 1;
            scan_shapes(container, kind, name, rules, preview, &mut findings)?;
        }
    }

    for rule in BACKGROUND_RULES.iter().filter(|rule| rule.kind == kind) {
        for name in names.iter().filter(|name| rule.part.matches(name)) {
            let Some((part, edit)) = read_part(container, name, |doc_root, edit| {
                for node in doc_root
                    .descendants()
                    .filter(|node| element_matches(*node, &rule.element))
                {
                    if edit.covers(&node.range()) {
                        continue;
                    }
                    edit.add(node);
                }
            })?
            else {
                continue;
            };

            for _ in &edit.ranges {
                findings.candidates.push(Candidate::Background {
                    part: name.clone(),
                    element: rule.element.local_name.to_string(),
                });
            }
            if !preview {
                commit(container, name, part, edit)?;
            }
        }
    }

    Ok(findings)
}

fn scan_shapes(
    container: &mut Container,
    kind: DocumentKind,
    name: &str,
    rules: &DetectionRules,
    preview: bool,
    findings: &mut Findings,
) -> Result<()> {
    let mut candidates = Vec::new();
    let mut scanned = 0;

    let Some((part, edit)) = read_part(container, name, |root, edit| {
        for element in root.descendants() {
            let Some(descriptor) = shape_at(kind, element) else {
                continue;
            };
            scanned += 1;
            let Some(descriptor) = descriptor else {
                warn!("{name}: forma sin estructura reconocible, se omite");
                continue;
            };

            let matched = evaluate(&descriptor, rules);
            if matched.is_empty() {
                continue;
            }

            let unit = removal_unit(element);
            if edit.covers(&unit.range()) {
                continue;
            }
            debug!(
                "{name}: forma '{}' candidata por {:?}",
                descriptor.name, matched
            );
            if kind == DocumentKind::PowerPoint {
                edit.shape_ids.extend(descriptor.id.clone());
            }
            edit.add(unit);
            candidates.push(Candidate::Shape {
                part: name.to_string(),
                shape: descriptor,
                matched,
            });
        }
    })?
    else {
        return Ok(());
    };

    findings.scanned += scanned;
    findings.candidates.extend(candidates);
    if !preview {
        commit(container, name, part, edit)?;
    }
    Ok(())
}

/// Lee y analiza una parte; `visit` registra en un `PartEdit` lo que se quitaría.
/// Una parte ilegible se registra y se omite.
fn read_part<F>(
    container: &mut Container,
    name: &str,
    visit: F,
) -> Result<Option<(PartText, PartEdit)>>
where
    F: FnOnce(Node<'_, '_>, &mut PartEdit),
{
    let Some(part) = PartText::from_bytes(container.get(name)?) else {
        warn!("{name}: la parte no es UTF-8, se omite");
        return Ok(None);
    };

    let mut edit = PartEdit::default();
    match parse(&part.body) {
        Ok(doc) => visit(doc.root(), &mut edit),
        Err(e) => {
            warn!("{name}: XML ilegible ({e}), se omite");
            return Ok(None);
        }
    }

    Ok(Some((part, edit)))
}

/// Aplica los cortes y limpia las referencias que quedaron colgando.
fn commit(container: &mut Container, name: &str, part: PartText, edit: PartEdit) -> Result<()> {
    if edit.ranges.is_empty() {
        return Ok(());
    }

    let mut body = splice_out(&part.body, edit.ranges);
    if let Some(pruned) = prune_timing(&body, &edit.shape_ids) {
        body = pruned;
    }
    let orphaned = unreferenced(&body, &edit.relationships);

    container.put(name, part.with_body(body).into_bytes());
    prune_relationships(container, name, &orphaned)?;
    Ok(())
}
