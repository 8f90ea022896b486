//! Limpieza de referencias tras eliminar formas: relaciones huérfanas en
//! `_rels/*.rels` y animaciones de PowerPoint que apuntan a formas borradas.

use log::{debug, warn};
use roxmltree::Node;
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;

use crate::container::Container;
use crate::error::Result;

use super::constants::{PACKAGE_REL_NS, PML_NS, REL_NS, VML_OFFICE_NS};
use super::xml::{PartText, is_named, parse, splice_out};

/// Entradas de compilación que referencian una forma por `spid`.
const BUILD_ENTRIES: &[&str] = &["bldP", "bldDgm", "bldGraphic", "bldOleChart"];
/// Contenedores que pueden desaparecer cuando se vacían.
const COLLAPSIBLE: &[&str] = &["par", "bldLst", "timing"];

/// Identificadores de relación usados dentro de un subárbol.
pub(crate) fn relationship_ids<'a>(node: Node<'a, '_>) -> impl Iterator<Item = &'a str> {
    node.descendants()
        .filter(Node::is_element)
        .flat_map(|n| n.attributes())
        .filter(|attr| match attr.namespace() {
            Some(ns) if REL_NS.contains(&ns) => true,
            Some(ns) if VML_OFFICE_NS.contains(&ns) => attr.name() == "relid",
            _ => false,
        })
        .map(|attr| attr.value())
}

/// De `candidates`, los que ya no aparecen en ninguna parte del texto dado.
pub(crate) fn unreferenced(body: &str, candidates: &BTreeSet<String>) -> BTreeSet<String> {
    if candidates.is_empty() {
        return BTreeSet::new();
    }
    let Ok(doc) = parse(body) else {
        // Sin árbol no se puede demostrar que la relación sobra
        return BTreeSet::new();
    };
    let still_used: HashSet<&str> = relationship_ids(doc.root()).collect();
    candidates
        .iter()
        .filter(|id| !still_used.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Ruta de relaciones de una parte: `word/header1.xml` → `word/_rels/header1.xml.rels`.
pub(crate) fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Elimina del `.rels` de la parte las relaciones indicadas. Las partes de
/// destino se conservan: una parte huérfana sigue siendo un paquete válido.
pub(crate) fn prune_relationships(
    container: &mut Container,
    part: &str,
    ids: &BTreeSet<String>,
) -> Result<usize> {
    let rels = rels_path(part);
    if ids.is_empty() || !container.contains(&rels) {
        return Ok(0);
    }

    let Some(text) = PartText::from_bytes(container.get(&rels)?) else {
        warn!("{rels}: no es UTF-8, se conservan las relaciones");
        return Ok(0);
    };
    let doc = match parse(&text.body) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("{rels}: XML ilegible ({e}), se conservan las relaciones");
            return Ok(0);
        }
    };

    let ranges: Vec<Range<usize>> = doc
        .descendants()
        .filter(|n| is_named(*n, PACKAGE_REL_NS, "Relationship"))
        .filter(|n| n.attribute("Id").is_some_and(|id| ids.contains(id)))
        .map(|n| n.range())
        .collect();
    let removed = ranges.len();
    if removed == 0 {
        return Ok(0);
    }

    debug!("{rels}: {removed} relaciones huérfanas eliminadas");
    let body = splice_out(&text.body, ranges);
    drop(doc);
    container.put(&rels, text.with_body(body).into_bytes());
    Ok(removed)
}

/// Quita de `p:timing` las animaciones y entradas de compilación que apuntan a
/// formas eliminadas. Devuelve `None` si no hay nada que cambiar.
pub(crate) fn prune_timing(body: &str, removed_shapes: &HashSet<String>) -> Option<String> {
    if removed_shapes.is_empty() {
        return None;
    }
    let doc = parse(body).ok()?;
    let timing = doc
        .descendants()
        .find(|n| is_named(*n, PML_NS, "timing"))?;

    let targets_removed = |n: &Node<'_, '_>| {
        n.attribute("spid")
            .is_some_and(|spid| removed_shapes.contains(spid))
    };

    let mut units: Vec<Range<usize>> = Vec::new();

    for target in timing
        .descendants()
        .filter(|n| is_named(*n, PML_NS, "spTgt") && targets_removed(n))
    {
        let Some(effect) = target
            .ancestors()
            .skip(1)
            .find(|n| is_named(*n, PML_NS, "par"))
        else {
            continue;
        };
        push_unit(&mut units, effect);
    }

    for entry in timing.descendants().filter(|n| {
        BUILD_ENTRIES
            .iter()
            .any(|local| is_named(*n, PML_NS, local))
            && targets_removed(n)
    }) {
        push_unit(&mut units, entry);
    }

    if units.is_empty() {
        return None;
    }
    debug!("p:timing: {} referencias a formas eliminadas", units.len());
    Some(splice_out(body, units))
}

fn is_removed(units: &[Range<usize>], node: Node<'_, '_>) -> bool {
    let range = node.range();
    units
        .iter()
        .any(|unit| unit.start <= range.start && range.end <= unit.end)
}

/// Registra `node` como unidad de borrado; si su contenedor quedaría vacío,
/// sube hasta el ancestro colapsable más cercano.
fn push_unit(units: &mut Vec<Range<usize>>, node: Node<'_, '_>) {
    if is_removed(units, node) {
        return;
    }

    let mut unit = node;
    while let Some(parent) = unit.parent_element() {
        if is_named(unit, PML_NS, "timing") {
            break;
        }
        let emptied = parent
            .children()
            .filter(Node::is_element)
            .all(|sibling| sibling == unit || is_removed(units, sibling));
        if !emptied {
            break;
        }
        let Some(collapsed) = parent.ancestors().find(|n| {
            COLLAPSIBLE
                .iter()
                .any(|local| is_named(*n, PML_NS, local))
        }) else {
            break;
        };
        unit = collapsed;
    }

    units.push(unit.range());
}
