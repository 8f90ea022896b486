//! Detector de marcas de agua en flujos de contenido: evalúa cada operador de
//! texto contra la matriz vigente y planifica los recortes del flujo.

use log::debug;
use std::collections::HashMap;
use std::ops::Range;

use crate::config::{DetectionRules, fold_angle};
use crate::report::TextRunCandidate;

use super::cmap::{FontDecoder, fallback_decode};
use super::lexer::{Instruction, Operand, is_regular};
use super::state::ContentState;

/// Modo de renderizado invisible.
const INVISIBLE: i64 = 3;

/// Reemplazo de un rango de bytes del flujo descomprimido.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Edit {
    pub(crate) span: Range<usize>,
    pub(crate) replacement: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct StreamScan {
    pub(crate) candidates: Vec<TextRunCandidate>,
    pub(crate) edits: Vec<Edit>,
    pub(crate) shows: usize,
}

/// Página y objeto del flujo que se está recorriendo.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StreamLocation {
    pub(crate) page: u32,
    pub(crate) stream: (u32, u16),
}

#[derive(Clone, Copy, Debug)]
enum BlockOp {
    Position(usize),
    Show {
        index: usize,
        candidate: bool,
        render_mode: i64,
    },
}

fn is_show(operator: &str) -> bool {
    matches!(operator, "Tj" | "TJ" | "'" | "\"")
}

fn starts_line(operator: &str) -> bool {
    matches!(operator, "'" | "\"")
}

/// Bytes mostrados por un operador de texto.
fn shown_bytes(instruction: &Instruction) -> Vec<u8> {
    match instruction.operator.as_str() {
        "TJ" => match instruction.operands.first() {
            Some(Operand::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Operand::String(bytes) => Some(bytes.as_slice()),
                    _ => None,
                })
                .flatten()
                .copied()
                .collect(),
            _ => Vec::new(),
        },
        _ => match instruction.operands.last() {
            Some(Operand::String(bytes)) => bytes.clone(),
            _ => Vec::new(),
        },
    }
}

/// Recorre un flujo actualizando `state` y devuelve candidatos y recortes.
/// El estado continúa en el siguiente flujo de la misma página.
pub(crate) fn scan_stream(
    content: &[u8],
    instructions: &[Instruction],
    state: &mut ContentState,
    fonts: &HashMap<Vec<u8>, FontDecoder>,
    rules: &DetectionRules,
    location: StreamLocation,
) -> StreamScan {
    let mut scan = StreamScan::default();
    let mut block: Vec<BlockOp> = Vec::new();

    for (index, instruction) in instructions.iter().enumerate() {
        let operator = instruction.operator.as_str();
        let render_mode = state.graphics.render_mode;
        let in_text = state.in_text();
        state.apply(instruction);

        match operator {
            "BT" => {
                // BT sin ET previo: se cierra el objeto abierto sin descartar nada
                if in_text {
                    plan_block(content, &block, instructions, true, &mut scan.edits);
                }
                block.clear();
            }
            "ET" if in_text => {
                plan_block(content, &block, instructions, false, &mut scan.edits);
                block.clear();
            }
            "Tm" | "Td" | "TD" | "T*" if in_text => block.push(BlockOp::Position(index)),
            _ if is_show(operator) && in_text => {
                scan.shows += 1;
                let candidate = evaluate_show(instruction, state, fonts, rules, location);
                let is_candidate = candidate.is_some();
                scan.candidates.extend(candidate);
                block.push(BlockOp::Show {
                    index,
                    candidate: is_candidate,
                    render_mode,
                });
            }
            _ => {}
        }
    }

    if state.in_text() {
        // El objeto de texto sigue en el próximo flujo: nada de lo pendiente
        // se considera prescindible
        plan_block(content, &block, instructions, true, &mut scan.edits);
    }

    scan
}

fn evaluate_show(
    instruction: &Instruction,
    state: &ContentState,
    fonts: &HashMap<Vec<u8>, FontDecoder>,
    rules: &DetectionRules,
    location: StreamLocation,
) -> Option<TextRunCandidate> {
    if state.graphics.render_mode == INVISIBLE {
        return None;
    }
    let matrix = state.text_rendering_matrix()?;
    let angle = fold_angle(matrix.angle());

    let rotated = rules.angle_in_range(angle);
    if rules.criteria.rotation && !rotated {
        return None;
    }
    if rules.detect_color && !state.graphics.fill.is_grayscale_like() {
        return None;
    }

    let bytes = shown_bytes(instruction);
    let text = match state.graphics.font.as_ref().and_then(|font| fonts.get(font)) {
        Some(decoder) => decoder.decode(&bytes),
        None => fallback_decode(&bytes, false),
    };

    let keyword = rules.matching_keyword(&text).map(str::to_string);
    if rules.keywords.is_empty() {
        // Sin rotación ni palabras clave no hay nada que distinga la marca
        if !rules.criteria.rotation {
            return None;
        }
    } else if keyword.is_none() {
        return None;
    }

    debug!(
        "página {}: '{}' a {:.1}° en {:?}",
        location.page, text, angle, instruction.span
    );
    Some(TextRunCandidate {
        page: location.page,
        stream: location.stream,
        operator: instruction.operator.clone(),
        text,
        angle,
        matrix: matrix.to_array(),
        span: (instruction.span.start, instruction.span.end),
        keyword,
    })
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.4}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Pasada hacia atrás sobre un objeto de texto. `needed`: algún texto
/// conservado posterior depende de la matriz de línea actual. `advance_needed`:
/// depende además del avance de los glifos anteriores en la misma línea.
fn plan_block(
    content: &[u8],
    block: &[BlockOp],
    instructions: &[Instruction],
    open_end: bool,
    edits: &mut Vec<Edit>,
) {
    let mut needed = open_end;
    let mut advance_needed = open_end;
    let mut next_show_removed = false;

    for op in block.iter().rev() {
        match *op {
            BlockOp::Show {
                index,
                candidate: false,
                ..
            } => {
                needed = true;
                advance_needed = !starts_line(&instructions[index].operator);
                next_show_removed = false;
            }
            BlockOp::Show {
                index,
                candidate: true,
                render_mode,
            } => {
                let instruction = &instructions[index];
                let line_start = starts_line(&instruction.operator);

                if advance_needed {
                    // El texto siguiente se apoya en su avance: solo se oculta
                    let mut replacement = format!("{INVISIBLE} Tr ").into_bytes();
                    replacement.extend_from_slice(&content[instruction.span.clone()]);
                    replacement.extend_from_slice(format!(" {render_mode} Tr").as_bytes());
                    edits.push(Edit {
                        span: instruction.span.clone(),
                        replacement,
                    });
                    needed = true;
                    advance_needed = !line_start;
                    next_show_removed = false;
                    continue;
                }

                let mut leftover = Vec::new();
                if instruction.operator == "\"" {
                    let spacing: Option<Vec<f64>> = instruction
                        .operands
                        .iter()
                        .take(2)
                        .map(Operand::as_number)
                        .collect();
                    if let Some([word, character]) = spacing.as_deref() {
                        leftover.push(format!(
                            "{} Tw {} Tc",
                            format_number(*word),
                            format_number(*character)
                        ));
                    }
                }
                if line_start && needed {
                    leftover.push("T*".to_string());
                }
                edits.push(Edit {
                    span: instruction.span.clone(),
                    replacement: leftover.join(" ").into_bytes(),
                });
                if line_start {
                    advance_needed = false;
                }
                next_show_removed = true;
            }
            BlockOp::Position(index) => {
                let instruction = &instructions[index];
                if !needed && next_show_removed {
                    let replacement = match (instruction.operator.as_str(), instruction.numbers()) {
                        ("TD", Some(values)) if values.len() == 2 => {
                            format!("{} TL", format_number(-values[1])).into_bytes()
                        }
                        _ => Vec::new(),
                    };
                    edits.push(Edit {
                        span: instruction.span.clone(),
                        replacement,
                    });
                }
                if instruction.operator == "Tm" {
                    needed = false;
                }
                advance_needed = false;
            }
        }
    }
}

/// Aplica los recortes en orden. Si al quitar bytes quedarían dos tokens
/// regulares pegados, se intercala un espacio.
pub(crate) fn apply_edits(content: &[u8], mut edits: Vec<Edit>) -> Vec<u8> {
    edits.sort_by_key(|edit| edit.span.start);
    let mut output = Vec::with_capacity(content.len());
    let mut cursor = 0;

    for edit in edits {
        if edit.span.start < cursor || edit.span.end > content.len() {
            continue;
        }
        output.extend_from_slice(&content[cursor..edit.span.start]);
        let before = output.last().copied().is_some_and(is_regular);
        let after = content.get(edit.span.end).copied().is_some_and(is_regular);

        if edit.replacement.is_empty() {
            if before && after {
                output.push(b' ');
            }
        } else {
            if before {
                output.push(b' ');
            }
            output.extend_from_slice(&edit.replacement);
            if after {
                output.push(b' ');
            }
        }
        cursor = edit.span.end;
    }

    output.extend_from_slice(&content[cursor..]);
    output
}
