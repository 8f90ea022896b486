//! Tablas estáticas: espacios de nombres, etiquetas de protección y superficies
//! donde viven las marcas de agua de cada formato Office.

use crate::report::DocumentKind;

pub const WML_NS: &[&str] = &[
    "http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    "http://purl.oclc.org/ooxml/wordprocessingml/main",
];
pub const SML_NS: &[&str] = &[
    "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
    "http://purl.oclc.org/ooxml/spreadsheetml/main",
];
pub const PML_NS: &[&str] = &[
    "http://schemas.openxmlformats.org/presentationml/2006/main",
    "http://purl.oclc.org/ooxml/presentationml/main",
];
pub const DML_NS: &[&str] = &[
    "http://schemas.openxmlformats.org/drawingml/2006/main",
    "http://purl.oclc.org/ooxml/drawingml/main",
];
pub const REL_NS: &[&str] = &[
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
    "http://purl.oclc.org/ooxml/officeDocument/relationships",
];
pub const PACKAGE_REL_NS: &[&str] = &["http://schemas.openxmlformats.org/package/2006/relationships"];
pub const VML_NS: &[&str] = &["urn:schemas-microsoft-com:vml"];
pub const VML_OFFICE_NS: &[&str] = &["urn:schemas-microsoft-com:office:office"];
pub const MC_NS: &[&str] = &["http://schemas.openxmlformats.org/markup-compatibility/2006"];
pub const WPS_NS: &[&str] = &["http://schemas.microsoft.com/office/word/2010/wordprocessingShape"];
pub const WP_NS: &[&str] = &[
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
    "http://purl.oclc.org/ooxml/drawingml/wordprocessingDrawing",
];

/// Identificador del tipo de forma VML de texto artístico (WordArt).
pub const VML_ART_TEXT_TYPE: &str = "#_x0000_t136";
/// Nombres canónicos con los que Word crea sus marcas de agua.
pub const WATERMARK_OBJECT_NAMES: &[&str] = &["PowerPlusWaterMarkObject", "WordPictureWatermark"];

/// Elemento identificado por nombre local y espacio de nombres.
#[derive(Clone, Copy, Debug)]
pub struct ElementSpec {
    pub namespaces: &'static [&'static str],
    pub local_name: &'static str,
}

const fn spec(namespaces: &'static [&'static str], local_name: &'static str) -> ElementSpec {
    ElementSpec {
        namespaces,
        local_name,
    }
}

/// Patrón de ruta de parte dentro del contenedor.
#[derive(Clone, Copy, Debug)]
pub enum PartPattern {
    Exact(&'static str),
    /// `prefix` + número + `suffix`, p. ej. `xl/worksheets/sheet3.xml`.
    Numbered {
        prefix: &'static str,
        suffix: &'static str,
    },
}

impl PartPattern {
    pub fn matches(&self, name: &str) -> bool {
        match *self {
            PartPattern::Exact(path) => name == path,
            PartPattern::Numbered { prefix, suffix } => name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .is_some_and(|number| {
                    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
                }),
        }
    }

    /// Número de la parte, usado para ordenar diapositivas y hojas.
    pub fn ordinal(&self, name: &str) -> Option<u32> {
        match *self {
            PartPattern::Exact(_) => None,
            PartPattern::Numbered { prefix, suffix } => name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .and_then(|number| number.parse().ok()),
        }
    }
}

pub struct ProtectionRule {
    pub kind: DocumentKind,
    pub part: PartPattern,
    pub elements: &'static [ElementSpec],
}

pub const PROTECTION_RULES: &[ProtectionRule] = &[
    ProtectionRule {
        kind: DocumentKind::Word,
        part: PartPattern::Exact("word/settings.xml"),
        elements: &[
            spec(WML_NS, "documentProtection"),
            spec(WML_NS, "writeProtection"),
        ],
    },
    ProtectionRule {
        kind: DocumentKind::Excel,
        part: PartPattern::Exact("xl/workbook.xml"),
        elements: &[
            spec(SML_NS, "workbookProtection"),
            spec(SML_NS, "fileSharing"),
        ],
    },
    ProtectionRule {
        kind: DocumentKind::Excel,
        part: PartPattern::Numbered {
            prefix: "xl/worksheets/sheet",
            suffix: ".xml",
        },
        elements: &[spec(SML_NS, "sheetProtection")],
    },
    ProtectionRule {
        kind: DocumentKind::Excel,
        part: PartPattern::Numbered {
            prefix: "xl/chartsheets/sheet",
            suffix: ".xml",
        },
        elements: &[spec(SML_NS, "sheetProtection")],
    },
    // Las diapositivas no llevan elemento de protección propio: basta con la
    // presentación
    ProtectionRule {
        kind: DocumentKind::PowerPoint,
        part: PartPattern::Exact("ppt/presentation.xml"),
        elements: &[spec(PML_NS, "modifyVerifier")],
    },
];

/// Partes donde se buscan formas con aspecto de marca de agua.
pub struct ShapeSurface {
    pub kind: DocumentKind,
    pub part: PartPattern,
}

pub const SHAPE_SURFACES: &[ShapeSurface] = &[
    ShapeSurface {
        kind: DocumentKind::Word,
        part: PartPattern::Numbered {
            prefix: "word/header",
            suffix: ".xml",
        },
    },
    ShapeSurface {
        kind: DocumentKind::PowerPoint,
        part: PartPattern::Numbered {
            prefix: "ppt/slides/slide",
            suffix: ".xml",
        },
    },
];

/// Fondo global del documento, eliminado siempre que se quitan marcas de agua.
pub struct BackgroundRule {
    pub kind: DocumentKind,
    pub part: PartPattern,
    pub element: ElementSpec,
}

pub const BACKGROUND_RULES: &[BackgroundRule] = &[
    BackgroundRule {
        kind: DocumentKind::Word,
        part: PartPattern::Exact("word/document.xml"),
        element: spec(WML_NS, "background"),
    },
    BackgroundRule {
        kind: DocumentKind::Excel,
        part: PartPattern::Numbered {
            prefix: "xl/worksheets/sheet",
            suffix: ".xml",
        },
        element: spec(SML_NS, "picture"),
    },
];

/// Parte principal que identifica cada tipo de documento.
pub const MAIN_PARTS: &[(&str, DocumentKind)] = &[
    ("word/document.xml", DocumentKind::Word),
    ("xl/workbook.xml", DocumentKind::Excel),
    ("ppt/presentation.xml", DocumentKind::PowerPoint),
];

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
