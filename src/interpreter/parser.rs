use super::ast::{Expr, ScriptSource};
use crate::runtime::error::{ScriptError, ScriptResult};

/// Parse script text into its top-level forms.
pub fn parse_script(source: &str) -> ScriptResult<ScriptSource> {
    let mut parser = Parser::new(source);
    let mut forms = Vec::new();
    while parser.skip_ws() {
        if parser.eof() {
            break;
        }
        forms.push(parser.parse_expr()?);
    }
    Ok(ScriptSource::new(source, forms))
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
            line: 1,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            if ch == b'\n' {
                self.line += 1;
            }
            self.index += 1;
        }
    }

    fn skip_ws(&mut self) -> bool {
        let mut advanced = false;
        loop {
            while let Some(ch) = self.current() {
                if ch.is_ascii_whitespace() {
                    advanced = true;
                    self.advance();
                } else {
                    break;
                }
            }
            // `;` and `--` both start a comment that runs to the end of the line.
            if self.current() == Some(b';') || self.starts_comment_dashes() {
                advanced = true;
                while let Some(ch) = self.current() {
                    self.advance();
                    if ch == b'\n' {
                        break;
                    }
                }
                continue;
            }
            break;
        }
        advanced || !self.eof()
    }

    fn starts_comment_dashes(&self) -> bool {
        self.current() == Some(b'-')
            && self.peek_char() == Some(b'-')
            && !self
                .bytes
                .get(self.index + 2)
                .is_some_and(|next| is_symbol_char(*next) && !next.is_ascii_whitespace())
    }

    fn parse_expr(&mut self) -> ScriptResult<Expr> {
        self.skip_ws();
        let Some(ch) = self.current() else {
            return Err(self.error("unexpected end of input"));
        };
        match ch {
            b'(' => self.parse_list(),
            b')' => Err(self.error("unexpected ')'")),
            b'"' => self.parse_string(),
            b':' => self.parse_keyword(),
            b'-' | b'+' | b'0'..=b'9' => self.parse_number_or_symbol(),
            _ => self.parse_symbol_or_bool(),
        }
    }

    fn parse_list(&mut self) -> ScriptResult<Expr> {
        let line = self.line;
        // consume '('
        self.advance();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eof() {
                return Err(ScriptError::Syntax {
                    message: "unterminated list".into(),
                    line: Some(line),
                });
            }
            if self.current() == Some(b')') {
                self.advance();
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::List { items, line })
    }

    fn parse_string(&mut self) -> ScriptResult<Expr> {
        let start_line = self.line;
        // consume opening quote
        self.advance();
        let start = self.index;
        let mut buf = String::new();
        let mut run_start = start;
        while let Some(ch) = self.current() {
            match ch {
                b'"' => {
                    buf.push_str(&self.src[run_start..self.index]);
                    self.advance();
                    return Ok(Expr::String(buf));
                }
                b'\\' => {
                    buf.push_str(&self.src[run_start..self.index]);
                    self.advance();
                    let escaped = self
                        .current()
                        .ok_or_else(|| self.error("incomplete escape"))?;
                    self.advance();
                    let value = match escaped {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        other => {
                            return Err(self.error(&format!("unknown escape: \\{}", other as char)));
                        }
                    };
                    buf.push(value);
                    run_start = self.index;
                }
                _ => self.advance(),
            }
        }
        Err(ScriptError::Syntax {
            message: "unterminated string literal".into(),
            line: Some(start_line),
        })
    }

    fn parse_keyword(&mut self) -> ScriptResult<Expr> {
        self.advance(); // consume ':'
        let start = self.index;
        while let Some(ch) = self.current() {
            if is_symbol_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.index {
            return Err(self.error("empty keyword"));
        }
        let text = &self.src[start..self.index];
        Ok(Expr::Keyword(text.to_string()))
    }

    fn parse_number_or_symbol(&mut self) -> ScriptResult<Expr> {
        let start = self.index;
        if self.current() == Some(b'-') || self.current() == Some(b'+') {
            self.advance();
        }
        let mut has_digit = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                has_digit = true;
                self.advance();
            } else {
                break;
            }
        }

        let mut is_float = false;
        if has_digit && self.current() == Some(b'.') {
            if let Some(next) = self.peek_char() {
                if next.is_ascii_digit() {
                    is_float = true;
                    self.advance();
                    while let Some(ch) = self.current() {
                        if ch.is_ascii_digit() {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        // `1abc` or a lone `-` is a symbol.
        if !has_digit || self.current().is_some_and(|ch| is_symbol_char(ch)) {
            self.index = start;
            return self.parse_symbol_or_bool();
        }

        let text = &self.src[start..self.index];
        if is_float {
            text.parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| self.error("invalid float literal"))
        } else {
            text.parse::<i64>()
                .map(Expr::Integer)
                .map_err(|_| self.error("invalid integer literal"))
        }
    }

    fn parse_symbol_or_bool(&mut self) -> ScriptResult<Expr> {
        let start = self.index;
        while let Some(ch) = self.current() {
            if is_symbol_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.index {
            return Err(self.error("unexpected character"));
        }
        let text = &self.src[start..self.index];
        if text.eq_ignore_ascii_case("true") {
            Ok(Expr::Boolean(true))
        } else if text.eq_ignore_ascii_case("false") {
            Ok(Expr::Boolean(false))
        } else {
            Ok(Expr::Symbol(text.to_string()))
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::Syntax {
            message: message.to_string(),
            line: Some(self.line),
        }
    }
}

fn is_symbol_char(ch: u8) -> bool {
    match ch {
        b'(' | b')' | b'"' | b';' => false,
        c if c.is_ascii_whitespace() => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(expr: &Expr) -> (&[Expr], usize) {
        match expr {
            Expr::List { items, line } => (items, *line),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn parses_handlers_with_lines() {
        let src = "; greeting\n(on mouseUp\n  (put \"hi\" into x)\n  (beep 2))";
        let script = parse_script(src).expect("parse");
        assert_eq!(script.forms.len(), 1);
        let (handler, line) = items(&script.forms[0]);
        assert_eq!(line, 2);
        assert!(handler[0].is_symbol("ON"));
        assert_eq!(items(&handler[2]).1, 3);
        assert_eq!(items(&handler[3]).1, 4);
        assert_eq!(items(&handler[3]).0[1], Expr::Integer(2));
    }

    #[test]
    fn operators_are_symbols() {
        let script = parse_script("(& a b) (- 3) (<> x -2.5) (+ 1a 2)").expect("parse");
        let heads: Vec<_> = script
            .forms
            .iter()
            .map(|form| items(form).0[0].clone())
            .collect();
        assert_eq!(heads[0], Expr::Symbol("&".into()));
        assert_eq!(heads[1], Expr::Symbol("-".into()));
        assert_eq!(items(&script.forms[2]).0[2], Expr::Float(-2.5));
        assert_eq!(items(&script.forms[3]).0[1], Expr::Symbol("1a".into()));
    }

    #[test]
    fn strings_keep_unicode_and_escapes() {
        let script = parse_script("(put \"école \\\"x\\\"\" -- trailing comment\n)").expect("parse");
        assert_eq!(items(&script.forms[0]).0[1], Expr::String("école \"x\"".into()));
    }

    #[test]
    fn reports_the_line_of_unterminated_lists() {
        let err = parse_script("(on a)\n\n(on b\n (put 1)").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Syntax {
                message: "unterminated list".into(),
                line: Some(3)
            }
        );
    }
}
