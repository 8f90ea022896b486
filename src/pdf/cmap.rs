//! Decodificación de texto mostrado: CMaps `ToUnicode` y respaldos simples.

use std::collections::HashMap;

use super::lexer::{Operand, tokenize};

#[derive(Clone, Debug, Default)]
pub(crate) struct ToUnicode {
    /// Longitudes de código en bytes, de mayor a menor.
    code_lengths: Vec<usize>,
    map: HashMap<Vec<u8>, String>,
}

impl ToUnicode {
    /// Interpreta un CMap. Las secciones que no se entienden se ignoran.
    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let instructions = tokenize(data).ok()?;
        let mut cmap = ToUnicode::default();

        for instruction in instructions {
            let strings: Vec<&Operand> = instruction.operands.iter().collect();
            match instruction.operator.as_str() {
                "endcodespacerange" => {
                    for pair in strings.chunks_exact(2) {
                        match pair[0] {
                            Operand::String(low) if !low.is_empty() => {
                                cmap.code_lengths.push(low.len())
                            }
                            _ => {}
                        }
                    }
                }
                "endbfchar" => {
                    for pair in strings.chunks_exact(2) {
                        match (pair[0], pair[1]) {
                            (Operand::String(code), Operand::String(target)) if !code.is_empty() => {
                                cmap.map.insert(code.clone(), utf16_be(target));
                            }
                            _ => {}
                        }
                    }
                }
                "endbfrange" => {
                    for triple in strings.chunks_exact(3) {
                        cmap.insert_range(triple[0], triple[1], triple[2]);
                    }
                }
                _ => {}
            }
        }

        if cmap.map.is_empty() {
            return None;
        }
        cmap.code_lengths.sort_unstable_by(|a, b| b.cmp(a));
        cmap.code_lengths.dedup();
        if cmap.code_lengths.is_empty() {
            cmap.code_lengths = cmap.map.keys().map(Vec::len).collect();
            cmap.code_lengths.sort_unstable_by(|a, b| b.cmp(a));
            cmap.code_lengths.dedup();
        }
        Some(cmap)
    }

    fn insert_range(&mut self, low: &Operand, high: &Operand, target: &Operand) {
        let (Operand::String(low), Operand::String(high)) = (low, high) else {
            return;
        };
        let (Some(start), Some(end)) = (code_value(low), code_value(high)) else {
            return;
        };
        if end < start || end - start > 0xFFFF {
            return;
        }
        let width = low.len();

        for (offset, code) in (start..=end).enumerate() {
            let key = code_bytes(code, width);
            let value = match target {
                Operand::String(base) => {
                    let mut units: Vec<u16> = base
                        .chunks(2)
                        .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
                        .collect();
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add(offset as u16);
                    }
                    String::from_utf16_lossy(&units)
                }
                Operand::Array(targets) => match targets.get(offset) {
                    Some(Operand::String(bytes)) => utf16_be(bytes),
                    _ => continue,
                },
                _ => return,
            };
            self.map.insert(key, value);
        }
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> String {
        let mut text = String::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let matched = self.code_lengths.iter().find_map(|length| {
                let code = bytes.get(pos..pos + length)?;
                self.map.get(code).map(|value| (value, *length))
            });
            match matched {
                Some((value, length)) => {
                    text.push_str(value);
                    pos += length.max(1);
                }
                None => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    pos += self.code_lengths.last().copied().unwrap_or(1).max(1);
                }
            }
        }
        text
    }
}

fn code_value(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0_u32, |acc, byte| acc << 8 | u32::from(*byte)))
}

fn code_bytes(code: u32, width: usize) -> Vec<u8> {
    let bytes = code.to_be_bytes();
    bytes[4 - width.min(4)..].to_vec()
}

fn utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Cómo decodificar las cadenas de una fuente concreta.
#[derive(Clone, Debug, Default)]
pub(crate) struct FontDecoder {
    pub(crate) to_unicode: Option<ToUnicode>,
    /// Fuente compuesta (Type0): códigos de dos bytes.
    pub(crate) composite: bool,
}

impl FontDecoder {
    pub(crate) fn decode(&self, bytes: &[u8]) -> String {
        if let Some(cmap) = &self.to_unicode {
            return cmap.decode(bytes);
        }
        fallback_decode(bytes, self.composite)
    }
}

/// Sin CMap: UTF-16BE si hay BOM o la fuente es compuesta, Latin-1 si no.
pub(crate) fn fallback_decode(bytes: &[u8], composite: bool) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16_be(rest);
    }
    if composite && bytes.len() % 2 == 0 {
        return utf16_be(bytes);
    }
    bytes.iter().map(|byte| char::from(*byte)).collect()
}
