//! Tokenizer shared by the Thrift and protobuf parsers.

use crate::error::GenError;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier, possibly dotted (`inc.Type`, `zanzibar.http.method`)
    Ident(String),
    Str(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

const PUNCT: &[char] = &['{', '}', '(', ')', '<', '>', '[', ']', ',', ';', '=', ':', '*'];

pub fn tokenize(path: &Path, src: &str) -> Result<Vec<Spanned>, GenError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    let err = |line: usize, message: String| GenError::IdlParse {
        path: path.to_path_buf(),
        line,
        message,
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = line;
                i += 2;
                loop {
                    match chars.get(i).copied() {
                        None => return Err(err(start, "unterminated block comment".into())),
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => {
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = line;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i).copied() {
                        None => return Err(err(start, "unterminated string literal".into())),
                        Some(ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .copied()
                                .ok_or_else(|| err(line, "dangling escape".into()))?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                            i += 2;
                        }
                        Some('\n') => return Err(err(start, "newline in string literal".into())),
                        Some(ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Spanned {
                    token: Token::Str(value),
                    line: start,
                });
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_')
                {
                    i += 1;
                }
                tokens.push(Spanned {
                    token: Token::Number(chars[start..i].iter().collect()),
                    line,
                });
            }
            c if c.is_alphabetic()
                || c == '_'
                || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_alphabetic())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Spanned {
                    token: Token::Ident(chars[start..i].iter().collect()),
                    line,
                });
            }
            c if PUNCT.contains(&c) => {
                tokens.push(Spanned {
                    token: Token::Punct(c),
                    line,
                });
                i += 1;
            }
            other => return Err(err(line, format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

/// Recursive-descent helper over a token slice.
pub struct Cursor<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    path: &'a Path,
}

impl<'a> Cursor<'a> {
    pub fn new(path: &'a Path, tokens: &'a [Spanned]) -> Self {
        Self {
            tokens,
            pos: 0,
            path,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    pub fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    pub fn error(&self, message: impl Into<String>) -> GenError {
        GenError::IdlParse {
            path: self.path.to_path_buf(),
            line: self.line(),
            message: message.into(),
        }
    }

    pub fn next(&mut self) -> Result<&'a Token, GenError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|s| &s.token)
            .ok_or_else(|| self.error("unexpected end of file"))?;
        self.pos += 1;
        Ok(token)
    }

    pub fn is_punct(&self, c: char) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == c)
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(i)) if i == keyword)
    }

    pub fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_punct(&mut self, c: char) -> Result<(), GenError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{c}`, found {}", self.describe())))
        }
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), GenError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{keyword}`, found {}", self.describe())))
        }
    }

    pub fn expect_ident(&mut self) -> Result<String, GenError> {
        match self.peek() {
            Some(Token::Ident(i)) => {
                self.pos += 1;
                Ok(i.clone())
            }
            _ => Err(self.error(format!("expected identifier, found {}", self.describe()))),
        }
    }

    pub fn expect_str(&mut self) -> Result<String, GenError> {
        match self.peek() {
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(s.clone())
            }
            _ => Err(self.error(format!("expected string literal, found {}", self.describe()))),
        }
    }

    pub fn expect_int(&mut self) -> Result<i64, GenError> {
        match self.peek() {
            Some(Token::Number(n)) => {
                let parsed = parse_int(n).ok_or_else(|| self.error(format!("invalid integer {n}")))?;
                self.pos += 1;
                Ok(parsed)
            }
            _ => Err(self.error(format!("expected integer, found {}", self.describe()))),
        }
    }

    /// Skip optional list separators.
    pub fn eat_separator(&mut self) {
        while self.eat_punct(',') || self.eat_punct(';') {}
    }

    /// Skip one value: a literal, an identifier, or a balanced `[]`/`{}` group.
    pub fn skip_value(&mut self) -> Result<(), GenError> {
        match self.next()? {
            Token::Punct(open @ ('[' | '{')) => {
                let close = if *open == '[' { ']' } else { '}' };
                let mut depth = 1usize;
                while depth > 0 {
                    match self.next()? {
                        Token::Punct(p) if *p == *open => depth += 1,
                        Token::Punct(p) if *p == close => depth -= 1,
                        _ => {}
                    }
                }
                Ok(())
            }
            Token::Punct(p) => Err(self.error(format!("unexpected `{p}` in value"))),
            _ => Ok(()),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            None => "end of file".to_string(),
            Some(Token::Ident(i)) => format!("`{i}`"),
            Some(Token::Str(s)) => format!("\"{s}\""),
            Some(Token::Number(n)) => n.clone(),
            Some(Token::Punct(p)) => format!("`{p}`"),
        }
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(Path::new("t.thrift"), src)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_tokens_and_comments() {
        let tokens = kinds("include \"a.thrift\" // trailing\n# hash\n/* block\n */ i64 x = -0x10;");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("include".into()),
                Token::Str("a.thrift".into()),
                Token::Ident("i64".into()),
                Token::Ident("x".into()),
                Token::Punct('='),
                Token::Number("-0x10".into()),
                Token::Punct(';'),
            ]
        );
    }

    #[test]
    fn test_dotted_identifiers_and_lines() {
        let spanned = tokenize(Path::new("t"), "a\n(zanzibar.http.method = 'GET')").unwrap();
        assert_eq!(spanned[0].line, 1);
        assert_eq!(spanned[2].token, Token::Ident("zanzibar.http.method".into()));
        assert_eq!(spanned[2].line, 2);
        assert_eq!(spanned[4].token, Token::Str("GET".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize(Path::new("bad.thrift"), "const string x = \"oops").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-0x1F"), Some(-31));
        assert_eq!(parse_int("1.5"), None);
    }
}
