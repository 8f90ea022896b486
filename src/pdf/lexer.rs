//! Tokenizador de flujos de contenido PDF que conserva el rango de bytes de
//! cada instrucción, de modo que se pueda recortar el flujo original sin
//! volver a serializarlo.

use std::fmt;
use std::ops::Range;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Operand {
    Number(f64),
    Name(Vec<u8>),
    String(Vec<u8>),
    Array(Vec<Operand>),
    Dictionary(Vec<Operand>),
    Boolean(bool),
    Null,
}

impl Operand {
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn as_name(&self) -> Option<&[u8]> {
        match self {
            Operand::Name(name) => Some(name),
            _ => None,
        }
    }
}

/// Operador con sus operandos. `span` va del primer operando al final del
/// operador; las imágenes en línea (`BI … ID … EI`) son una sola instrucción.
#[derive(Clone, Debug)]
pub(crate) struct Instruction {
    pub(crate) operator: String,
    pub(crate) operands: Vec<Operand>,
    pub(crate) span: Range<usize>,
}

impl Instruction {
    pub(crate) fn numbers(&self) -> Option<Vec<f64>> {
        self.operands.iter().map(Operand::as_number).collect()
    }
}

#[derive(Debug)]
pub(crate) struct LexError {
    pub(crate) offset: usize,
    pub(crate) message: &'static str,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} en el byte {}", self.message, self.offset)
    }
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub(crate) fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

enum Token {
    Operand(Operand),
    Keyword(String),
    ArrayEnd,
    DictEnd,
}

struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

pub(crate) fn tokenize(data: &[u8]) -> Result<Vec<Instruction>, LexError> {
    let mut lexer = Lexer { data, pos: 0 };
    let mut instructions = Vec::new();
    let mut operands = Vec::new();
    let mut start = None;

    loop {
        lexer.skip_insignificant();
        if lexer.pos >= data.len() {
            break;
        }
        let token_start = lexer.pos;
        match lexer.next_token()? {
            Token::Operand(operand) => {
                start.get_or_insert(token_start);
                operands.push(operand);
            }
            Token::Keyword(keyword) => {
                let span_start = start.take().unwrap_or(token_start);
                if keyword == "BI" {
                    lexer.skip_inline_image(token_start)?;
                }
                instructions.push(Instruction {
                    operator: keyword,
                    operands: std::mem::take(&mut operands),
                    span: span_start..lexer.pos,
                });
            }
            Token::ArrayEnd | Token::DictEnd => {
                return Err(lexer.error(token_start, "cierre sin apertura"));
            }
        }
    }

    // Operandos sueltos al final no forman instrucción; se ignoran
    Ok(instructions)
}

impl Lexer<'_> {
    fn error(&self, offset: usize, message: &'static str) -> LexError {
        LexError { offset, message }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_insignificant(&mut self) {
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) || byte == b'{' || byte == b'}' {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(byte) = self.peek() {
                    if byte == b'\n' || byte == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let byte = self.data[start];
        match byte {
            b'(' => self.literal_string().map(|s| Token::Operand(Operand::String(s))),
            b'<' if self.data.get(start + 1) == Some(&b'<') => {
                self.pos += 2;
                self.collection(Token::is_dict_end)
                    .map(|items| Token::Operand(Operand::Dictionary(items)))
            }
            b'<' => self.hex_string().map(|s| Token::Operand(Operand::String(s))),
            b'>' if self.data.get(start + 1) == Some(&b'>') => {
                self.pos += 2;
                Ok(Token::DictEnd)
            }
            b'[' => {
                self.pos += 1;
                self.collection(Token::is_array_end)
                    .map(|items| Token::Operand(Operand::Array(items)))
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b'/' => Ok(Token::Operand(Operand::Name(self.name()))),
            b')' | b'>' => Err(self.error(start, "delimitador inesperado")),
            _ => Ok(self.regular()),
        }
    }

    fn collection(&mut self, is_end: fn(&Token) -> bool) -> Result<Vec<Operand>, LexError> {
        let open = self.pos;
        let mut items = Vec::new();
        loop {
            self.skip_insignificant();
            if self.pos >= self.data.len() {
                return Err(self.error(open, "colección sin cerrar"));
            }
            let token_start = self.pos;
            let token = self.next_token()?;
            if is_end(&token) {
                return Ok(items);
            }
            match token {
                Token::Operand(operand) => items.push(operand),
                // Los operadores dentro de arreglos solo aparecen en CMaps
                Token::Keyword(_) => {}
                Token::ArrayEnd | Token::DictEnd => {
                    return Err(self.error(token_start, "cierre desparejado"));
                }
            }
        }
    }

    fn regular(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        let raw = &self.data[start..self.pos];
        match raw {
            b"true" => return Token::Operand(Operand::Boolean(true)),
            b"false" => return Token::Operand(Operand::Boolean(false)),
            b"null" => return Token::Operand(Operand::Null),
            _ => {}
        }
        if let Some(number) = parse_number(raw) {
            return Token::Operand(Operand::Number(number));
        }
        Token::Keyword(String::from_utf8_lossy(raw).into_owned())
    }

    fn name(&mut self) -> Vec<u8> {
        self.pos += 1;
        let mut name = Vec::new();
        while let Some(byte) = self.peek().filter(|b| is_regular(*b)) {
            self.pos += 1;
            if byte == b'#' {
                let hex = self.data.get(self.pos..self.pos + 2);
                if let Some(value) = hex.and_then(|digits| {
                    std::str::from_utf8(digits)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                }) {
                    name.push(value);
                    self.pos += 2;
                    continue;
                }
            }
            name.push(byte);
        }
        name
    }

    fn literal_string(&mut self) -> Result<Vec<u8>, LexError> {
        let open = self.pos;
        self.pos += 1;
        let mut depth = 1;
        let mut out = Vec::new();

        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'\\' => {
                    let Some(escaped) = self.peek() else {
                        break;
                    };
                    self.pos += 1;
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(digit @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(digit - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xff) as u8);
                        }
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(byte);
                }
                _ => out.push(byte),
            }
        }

        Err(self.error(open, "cadena sin cerrar"))
    }

    fn hex_string(&mut self) -> Result<Vec<u8>, LexError> {
        let open = self.pos;
        self.pos += 1;
        let mut digits = Vec::new();

        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'>' => {
                    if digits.len() % 2 == 1 {
                        digits.push(0);
                    }
                    return Ok(digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect());
                }
                _ if is_whitespace(byte) => {}
                _ => match (byte as char).to_digit(16) {
                    Some(value) => digits.push(value as u8),
                    None => return Err(self.error(self.pos - 1, "dígito hexadecimal inválido")),
                },
            }
        }

        Err(self.error(open, "cadena hexadecimal sin cerrar"))
    }

    /// Salta el diccionario y los datos binarios de una imagen en línea hasta `EI`.
    fn skip_inline_image(&mut self, begin: usize) -> Result<(), LexError> {
        loop {
            self.skip_insignificant();
            if self.pos >= self.data.len() {
                return Err(self.error(begin, "imagen en línea sin ID"));
            }
            match self.next_token()? {
                Token::Keyword(keyword) if keyword == "ID" => break,
                _ => {}
            }
        }
        // Un único espacio separa ID de los datos
        self.pos += 1;

        let data = self.data;
        let mut cursor = self.pos;
        while cursor + 2 <= data.len() {
            let preceded = cursor == 0 || is_whitespace(data[cursor - 1]);
            let followed = data.get(cursor + 2).is_none_or(|byte| is_whitespace(*byte));
            if preceded && followed && &data[cursor..cursor + 2] == b"EI" {
                self.pos = cursor + 2;
                return Ok(());
            }
            cursor += 1;
        }
        Err(self.error(begin, "imagen en línea sin EI"))
    }
}

impl Token {
    fn is_array_end(&self) -> bool {
        matches!(self, Token::ArrayEnd)
    }

    fn is_dict_end(&self) -> bool {
        matches!(self, Token::DictEnd)
    }
}

fn parse_number(raw: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(raw).ok()?;
    let first = text.bytes().next()?;
    if !(first.is_ascii_digit() || matches!(first, b'+' | b'-' | b'.')) {
        return None;
    }
    if !text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.'))
    {
        return None;
    }
    // `--5` o `5.` aparecen en productores descuidados
    text.trim_start_matches(['+', '-'])
        .parse::<f64>()
        .ok()
        .map(|value| if text.starts_with('-') { -value } else { value })
}
