use roxmltree::{Document, Node};
use std::ops::Range;

use super::constants::ElementSpec;

const BOM: char = '\u{feff}';

/// Texto de una parte XML. La marca BOM se conserva aparte para que los
/// rangos de bytes del árbol coincidan con `body`.
pub(crate) struct PartText {
    bom: bool,
    pub(crate) body: String,
}

impl PartText {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let text = String::from_utf8(bytes).ok()?;
        match text.strip_prefix(BOM) {
            Some(body) => Some(Self {
                bom: true,
                body: body.to_string(),
            }),
            None => Some(Self {
                bom: false,
                body: text,
            }),
        }
    }

    pub(crate) fn with_body(&self, body: String) -> Self {
        Self {
            bom: self.bom,
            body,
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        if self.bom {
            let mut text = String::with_capacity(self.body.len() + BOM.len_utf8());
            text.push(BOM);
            text.push_str(&self.body);
            text.into_bytes()
        } else {
            self.body.into_bytes()
        }
    }
}

pub(crate) fn parse(text: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse(text)
}

/// Comprueba si un elemento coincide con la especificación de búsqueda.
pub(crate) fn element_matches(node: Node<'_, '_>, spec: &ElementSpec) -> bool {
    is_named(node, spec.namespaces, spec.local_name)
}

pub(crate) fn is_named(node: Node<'_, '_>, namespaces: &[&str], local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node
            .tag_name()
            .namespace()
            .is_some_and(|ns| namespaces.contains(&ns))
}

pub(crate) fn child<'a, 'input>(
    node: Node<'a, 'input>,
    namespaces: &[&str],
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| is_named(*n, namespaces, local_name))
}

pub(crate) fn descendant<'a, 'input>(
    node: Node<'a, 'input>,
    namespaces: &[&str],
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    node.descendants()
        .skip(1)
        .find(|n| is_named(*n, namespaces, local_name))
}

/// Atributo calificado con cualquiera de los espacios de nombres dados.
pub(crate) fn ns_attribute<'a>(
    node: Node<'a, '_>,
    namespaces: &[&str],
    local_name: &str,
) -> Option<&'a str> {
    node.attributes()
        .find(|attr| {
            attr.name() == local_name
                && attr.namespace().is_some_and(|ns| namespaces.contains(&ns))
        })
        .map(|attr| attr.value())
}

/// Concatena el texto de los elementos `local_name` descendientes.
pub(crate) fn text_content(node: Node<'_, '_>, namespaces: &[&str], local_name: &str) -> String {
    let mut content = String::new();
    for text_node in node
        .descendants()
        .filter(|n| is_named(*n, namespaces, local_name))
    {
        for piece in text_node
            .children()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
        {
            content.push_str(piece);
        }
    }
    content
}

/// Ancestro más cercano con el nombre dado (sin incluir el propio nodo).
pub(crate) fn ancestor<'a, 'input>(
    node: Node<'a, 'input>,
    namespaces: &[&str],
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    node.ancestors()
        .skip(1)
        .find(|n| is_named(*n, namespaces, local_name))
}

/// Elimina los rangos indicados. Los rangos contenidos en otro se descartan,
/// de modo que nunca se corta más que el subárbol exterior.
pub(crate) fn splice_out(text: &str, mut ranges: Vec<Range<usize>>) -> String {
    ranges.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in ranges {
        if range.start < cursor {
            continue;
        }
        output.push_str(&text[cursor..range.start]);
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::office::constants::WML_NS;

    const SETTINGS: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        r#"<w:zoom w:percent="100"/><w:documentProtection w:edit="readOnly" w:enforcement="1"/>"#,
        r#"<w:defaultTabStop w:val="420"/></w:settings>"#
    );

    #[test]
    fn splice_removes_only_the_matched_element() {
        let doc = parse(SETTINGS).unwrap();
        let ranges: Vec<_> = doc
            .descendants()
            .filter(|n| is_named(*n, WML_NS, "documentProtection"))
            .map(|n| n.range())
            .collect();
        let output = splice_out(SETTINGS, ranges);
        assert_eq!(
            output,
            SETTINGS.replace(
                r#"<w:documentProtection w:edit="readOnly" w:enforcement="1"/>"#,
                ""
            )
        );
    }

    #[test]
    fn nested_ranges_collapse_into_outer() {
        let text = "0123456789";
        assert_eq!(splice_out(text, vec![2..8, 3..5, 8..9]), "019");
    }

    #[test]
    fn bom_survives_round_trip() {
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(b"<a/>");
        let part = PartText::from_bytes(bytes.clone()).unwrap();
        assert_eq!(part.body, "<a/>");
        assert_eq!(part.into_bytes(), bytes);
    }

    #[test]
    fn prefix_is_irrelevant_namespace_is_not() {
        let xml = r#"<x:root xmlns:x="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:o="urn:otro"><o:documentProtection/></x:root>"#;
        let doc = parse(xml).unwrap();
        assert!(is_named(doc.root_element(), WML_NS, "root"));
        assert!(
            !doc.descendants()
                .any(|n| is_named(n, WML_NS, "documentProtection"))
        );
    }
}
