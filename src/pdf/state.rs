//! Máquina de estados del flujo de contenido: CTM con pila `q`/`Q`, matrices de
//! texto dentro de `BT … ET`, color de relleno y parámetros de texto.

use super::lexer::{Instruction, Operand};

/// Matriz afín `[a b c d e f]` en la convención de PDF (vectores fila).
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Matrix {
    pub(crate) a: f64,
    pub(crate) b: f64,
    pub(crate) c: f64,
    pub(crate) d: f64,
    pub(crate) e: f64,
    pub(crate) f: f64,
}

impl Matrix {
    pub(crate) const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub(crate) fn from_slice(values: &[f64]) -> Option<Self> {
        match *values {
            [a, b, c, d, e, f] => Some(Matrix { a, b, c, d, e, f }),
            _ => None,
        }
    }

    fn translation(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    /// `self × other`: primero se aplica `self`, luego `other`.
    pub(crate) fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Ángulo de la línea base en grados, `atan2(b, a)`, en `(-180, 180]`.
    pub(crate) fn angle(&self) -> f64 {
        self.b.atan2(self.a).to_degrees()
    }

    pub(crate) fn to_array(self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

/// Umbral de dispersión entre canales para considerar un color acromático.
const GRAY_SPREAD: f64 = 0.08;
/// Por debajo de esta luminosidad el color es texto negro normal.
const GRAY_MIN_LIGHTNESS: f64 = 0.25;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FillColor {
    Gray(f64),
    Rgb(f64, f64, f64),
    Cmyk(f64, f64, f64, f64),
    /// Patrones, espacios con nombre o valores que no se pueden interpretar.
    Unknown,
}

impl FillColor {
    fn from_components(values: &[f64]) -> Self {
        match *values {
            [gray] => FillColor::Gray(gray),
            [r, g, b] => FillColor::Rgb(r, g, b),
            [c, m, y, k] => FillColor::Cmyk(c, m, y, k),
            _ => FillColor::Unknown,
        }
    }

    fn to_rgb(&self) -> Option<(f64, f64, f64)> {
        match *self {
            FillColor::Gray(gray) => Some((gray, gray, gray)),
            FillColor::Rgb(r, g, b) => Some((r, g, b)),
            FillColor::Cmyk(c, m, y, k) => Some((
                (1.0 - c) * (1.0 - k),
                (1.0 - m) * (1.0 - k),
                (1.0 - y) * (1.0 - k),
            )),
            FillColor::Unknown => None,
        }
    }

    /// Gris claro o medio: sin tinte apreciable y lejos del negro.
    pub(crate) fn is_grayscale_like(&self) -> bool {
        let Some((r, g, b)) = self.to_rgb() else {
            return false;
        };
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        max - min <= GRAY_SPREAD && (max + min) / 2.0 >= GRAY_MIN_LIGHTNESS
    }
}

/// Estado gráfico guardado y restaurado por `q`/`Q`.
#[derive(Clone, Debug)]
pub(crate) struct GraphicsState {
    pub(crate) ctm: Matrix,
    pub(crate) fill: FillColor,
    fill_components: usize,
    pub(crate) font: Option<Vec<u8>>,
    pub(crate) leading: f64,
    pub(crate) render_mode: i64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: FillColor::Gray(0.0),
            fill_components: 1,
            font: None,
            leading: 0.0,
            render_mode: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TextObject {
    pub(crate) matrix: Matrix,
    pub(crate) line_matrix: Matrix,
}

impl TextObject {
    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.matrix = self.line_matrix;
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ContentState {
    pub(crate) graphics: GraphicsState,
    stack: Vec<GraphicsState>,
    pub(crate) text: Option<TextObject>,
}

impl ContentState {
    pub(crate) fn in_text(&self) -> bool {
        self.text.is_some()
    }

    /// Matriz efectiva `Tm × CTM` para la ejecución que está por dibujarse.
    pub(crate) fn text_rendering_matrix(&self) -> Option<Matrix> {
        self.text
            .map(|text| text.matrix.then(&self.graphics.ctm))
    }

    /// Actualiza el estado con una instrucción. Los operadores de dibujo de
    /// texto `'` y `"` aplican aquí su salto de línea previo.
    pub(crate) fn apply(&mut self, instruction: &Instruction) {
        let operands = &instruction.operands;
        let numbers = instruction.numbers();
        let numbers = numbers.as_deref();

        match instruction.operator.as_str() {
            "q" => self.stack.push(self.graphics.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.graphics = saved;
                }
            }
            "cm" => {
                if let Some(matrix) = numbers.and_then(Matrix::from_slice) {
                    self.graphics.ctm = matrix.then(&self.graphics.ctm);
                }
            }
            "BT" => {
                self.text = Some(TextObject {
                    matrix: Matrix::IDENTITY,
                    line_matrix: Matrix::IDENTITY,
                });
            }
            "ET" => self.text = None,
            "Tf" => {
                if let Some(font) = operands.first().and_then(Operand::as_name) {
                    self.graphics.font = Some(font.to_vec());
                }
            }
            "TL" => {
                if let Some([leading]) = numbers {
                    self.graphics.leading = *leading;
                }
            }
            "Tr" => {
                if let Some([mode]) = numbers {
                    self.graphics.render_mode = *mode as i64;
                }
            }
            "Tm" => {
                if let (Some(text), Some(matrix)) =
                    (self.text.as_mut(), numbers.and_then(Matrix::from_slice))
                {
                    text.matrix = matrix;
                    text.line_matrix = matrix;
                }
            }
            "Td" => {
                if let (Some(text), Some([tx, ty])) = (self.text.as_mut(), numbers) {
                    text.move_line(*tx, *ty);
                }
            }
            "TD" => {
                if let (Some(text), Some([tx, ty])) = (self.text.as_mut(), numbers) {
                    self.graphics.leading = -ty;
                    text.move_line(*tx, *ty);
                }
            }
            "T*" | "'" | "\"" => {
                let leading = self.graphics.leading;
                if let Some(text) = self.text.as_mut() {
                    text.move_line(0.0, -leading);
                }
            }
            "g" => self.set_fill(numbers, 1),
            "rg" => self.set_fill(numbers, 3),
            "k" => self.set_fill(numbers, 4),
            "cs" => {
                let components = match operands.first().and_then(Operand::as_name) {
                    Some(b"DeviceGray" | b"CalGray" | b"G") => 1,
                    Some(b"DeviceRGB" | b"CalRGB" | b"RGB") => 3,
                    Some(b"DeviceCMYK" | b"CMYK") => 4,
                    _ => 0,
                };
                self.graphics.fill_components = components;
                self.graphics.fill = match components {
                    1 => FillColor::Gray(0.0),
                    3 => FillColor::Rgb(0.0, 0.0, 0.0),
                    4 => FillColor::Cmyk(0.0, 0.0, 0.0, 1.0),
                    _ => FillColor::Unknown,
                };
            }
            "sc" | "scn" => {
                let components = self.graphics.fill_components;
                self.graphics.fill = match numbers {
                    Some(values) if components != 0 && values.len() == components => {
                        FillColor::from_components(values)
                    }
                    _ => FillColor::Unknown,
                };
            }
            _ => {}
        }
    }

    fn set_fill(&mut self, numbers: Option<&[f64]>, components: usize) {
        self.graphics.fill_components = components;
        self.graphics.fill = match numbers {
            Some(values) if values.len() == components => FillColor::from_components(values),
            _ => FillColor::Unknown,
        };
    }
}
