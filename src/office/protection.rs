//! Eliminación de las etiquetas de protección de edición.
//!
//! Solo se busca la presencia de la etiqueta: el hash de contraseña nunca se
//! inspecciona, porque la aplicación lectora tampoco lo valida para abrir.

use log::{debug, warn};

use crate::container::Container;
use crate::error::Result;
use crate::report::{DocumentKind, ProtectionHit};

use super::constants::{ElementSpec, PROTECTION_RULES};
use super::xml::{PartText, element_matches, parse, splice_out};

/// Recorre la tabla de protección del formato y elimina cada etiqueta hallada.
pub(crate) fn strip_protection(
    container: &mut Container,
    kind: DocumentKind,
    preview: bool,
) -> Result<Vec<ProtectionHit>> {
    let names = container.part_names();
    let mut hits = Vec::new();

    for rule in PROTECTION_RULES.iter().filter(|rule| rule.kind == kind) {
        for name in names.iter().filter(|name| rule.part.matches(name)) {
            hits.extend(strip_part(container, name, rule.elements, preview)?);
        }
    }

    Ok(hits)
}

fn strip_part(
    container: &mut Container,
    name: &str,
    elements: &[ElementSpec],
    preview: bool,
) -> Result<Vec<ProtectionHit>> {
    let Some(part) = PartText::from_bytes(container.get(name)?) else {
        warn!("{name}: la parte no es UTF-8, se omite la limpieza de protección");
        return Ok(Vec::new());
    };

    let doc = match parse(&part.body) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("{name}: XML ilegible ({e}), se omite la limpieza de protección");
            return Ok(Vec::new());
        }
    };

    let mut hits = Vec::new();
    let mut ranges = Vec::new();
    for spec in elements {
        let matched: Vec<_> = doc
            .descendants()
            .filter(|node| element_matches(*node, spec))
            .map(|node| node.range())
            .collect();
        if matched.is_empty() {
            continue;
        }
        debug!("{name}: {} x {}", matched.len(), spec.local_name);
        hits.push(ProtectionHit {
            part: name.to_string(),
            element: spec.local_name.to_string(),
            count: matched.len(),
        });
        ranges.extend(matched);
    }

    if preview || ranges.is_empty() {
        return Ok(hits);
    }

    let body = splice_out(&part.body, ranges);
    drop(doc);
    container.put(name, part.with_body(body).into_bytes());

    Ok(hits)
}
