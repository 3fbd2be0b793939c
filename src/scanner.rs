use crate::token::{Token, TokenType};
use phf::phf_map;
use std::error::Error;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug)]
pub struct ScanError {
    pub line: i32,
    pub message: String,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error: {}", self.line, self.message.as_str())
    }
}

impl Error for ScanError {
    fn description(&self) -> &str {
        &self.message
    }
}

// Note: current becomes self.iter.peek()?.0
struct Scanner<'a> {
    source: &'a str,
    iter: Peekable<CharIndices<'a>>,
    start: usize,
    line: i32,
}

/// Scans the whole source in one forward pass. Diagnostics are collected
/// rather than printed so the caller decides where they go; scanning always
/// continues past a bad character or an unterminated string.
pub fn scan_tokens(source: &str) -> (Vec<Token>, Vec<ScanError>) {
    let mut scanner = Scanner {
        source,
        iter: source.char_indices().peekable(),
        start: 0,
        line: 1,
    };
    let mut tokens: Vec<Token> = Vec::new();
    let mut errors: Vec<ScanError> = Vec::new();

    while let Some((idx, _)) = scanner.iter.peek() {
        scanner.start = *idx;
        match scanner.scan_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => (),
            Err(e) => errors.push(e),
        }
    }
    tokens.push(Token::new(TokenType::EOF, "", scanner.line));
    (tokens, errors)
}

impl<'a> Scanner<'a> {
    fn scan_token(&mut self) -> Result<Option<Token>, ScanError> {
        let (_, c) = match self.iter.next() {
            Some(x) => x,
            None => return Ok(None),
        };
        match c {
            '(' => Ok(Some(self.token(TokenType::LeftParen))),
            ')' => Ok(Some(self.token(TokenType::RightParen))),
            '{' => Ok(Some(self.token(TokenType::LeftBrace))),
            '}' => Ok(Some(self.token(TokenType::RightBrace))),
            ',' => Ok(Some(self.token(TokenType::Comma))),
            '.' => Ok(Some(self.token(TokenType::Dot))),
            '-' => Ok(Some(self.token(TokenType::Minus))),
            '+' => Ok(Some(self.token(TokenType::Plus))),
            ';' => Ok(Some(self.token(TokenType::Semicolon))),
            '*' => Ok(Some(self.token(TokenType::Star))),
            '!' => {
                if self.next_if('=') {
                    Ok(Some(self.token(TokenType::BangEqual)))
                } else {
                    Ok(Some(self.token(TokenType::Bang)))
                }
            }
            '=' => {
                if self.next_if('=') {
                    Ok(Some(self.token(TokenType::EqualEqual)))
                } else {
                    Ok(Some(self.token(TokenType::Equal)))
                }
            }
            '<' => {
                if self.next_if('=') {
                    Ok(Some(self.token(TokenType::LessEqual)))
                } else {
                    Ok(Some(self.token(TokenType::Less)))
                }
            }
            '>' => {
                if self.next_if('=') {
                    Ok(Some(self.token(TokenType::GreaterEqual)))
                } else {
                    Ok(Some(self.token(TokenType::Greater)))
                }
            }
            '/' => {
                if self.next_if('/') {
                    // Line comment, runs to end of line.
                    while let Some((_, c)) = self.iter.peek() {
                        match c {
                            '\n' => {
                                break;
                            }
                            _ => {
                                self.iter.next();
                            }
                        }
                    }
                    Ok(None)
                } else {
                    Ok(Some(self.token(TokenType::Slash)))
                }
            }
            ' ' | '\r' | '\t' => Ok(None),
            '\n' => {
                self.line += 1;
                Ok(None)
            }
            '"' => Ok(Some(self.string()?)),
            '0'..='9' => Ok(Some(self.number()?)),
            'a'..='z' | 'A'..='Z' | '_' => Ok(Some(self.identifier())),
            _ => Err(ScanError {
                line: self.line,
                message: "Unexpected character.".to_string(),
            }),
        }
    }
    fn current(&mut self) -> usize {
        match self.iter.peek() {
            None => self.source.len(),
            Some((idx, _)) => *idx,
        }
    }
    fn token(&mut self, token_type: TokenType) -> Token {
        let current = self.current();
        Token::new(token_type, &self.source[self.start..current], self.line)
    }
    fn next_if(&mut self, expected: char) -> bool {
        if let Some((_, c)) = self.iter.peek() {
            if *c == expected {
                self.iter.next();
                return true;
            }
        }
        false
    }
    fn string(&mut self) -> Result<Token, ScanError> {
        while let Some((_, c)) = self.iter.peek() {
            match c {
                '"' => {
                    break;
                }
                '\n' => {
                    self.line += 1;
                    self.iter.next();
                }
                _ => {
                    self.iter.next();
                }
            }
        }
        // Consume the closing quote; hitting end-of-input instead means the
        // string never terminated.
        if self.iter.next().is_none() {
            return Err(ScanError {
                line: self.line,
                message: "Unterminated string.".to_string(),
            });
        }
        let current = self.current();
        let value = self.source[self.start + 1..current - 1].to_string();
        Ok(self.token(TokenType::String(value)))
    }
    fn digits(&mut self) {
        while let Some((_, c)) = self.iter.peek() {
            match c {
                '0'..='9' => {
                    self.iter.next();
                }
                _ => {
                    break;
                }
            }
        }
    }
    fn number(&mut self) -> Result<Token, ScanError> {
        self.digits();

        // A fractional part needs a digit after the '.'; a trailing bare dot
        // is left for the next token.
        if let Some((_, '.')) = self.iter.peek() {
            let mut lookahead = self.iter.clone();
            lookahead.next();
            if let Some((_, '0'..='9')) = lookahead.peek() {
                self.iter.next();
                self.digits();
            }
        }

        let current = self.current();
        let value = self.source[self.start..current]
            .parse()
            .map_err(|_| ScanError {
                line: self.line,
                message: "Invalid number.".to_string(),
            })?;
        Ok(self.token(TokenType::Number(value)))
    }
    fn identifier(&mut self) -> Token {
        while let Some((_, c)) = self.iter.peek() {
            match c {
                '0'..='9' | 'a'..='z' | 'A'..='Z' | '_' => {
                    self.iter.next();
                }
                _ => {
                    break;
                }
            }
        }
        let current = self.current();
        match KEYWORDS.get(&self.source[self.start..current]) {
            None => {
                let name = self.source[self.start..current].to_string();
                self.token(TokenType::Identifier(name))
            }
            Some(x) => self.token(x.clone()),
        }
    }
}

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "class" => TokenType::Class,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "fun" => TokenType::Fun,
    "if" => TokenType::If,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};

#[cfg(test)]
mod scanner_tests {
    use crate::scanner;
    use crate::token::TokenType;

    #[test]
    fn basic_scanner_test() {
        let (tokens, errors) = scanner::scan_tokens("x = 2;");
        assert!(errors.is_empty());
        assert_eq!(tokens.len(), 5);
        assert_eq!(
            tokens[0].tokentype,
            TokenType::Identifier("x".to_string())
        );
        assert_eq!(tokens[0].lexeme, "x");
        assert_eq!(tokens[1].tokentype, TokenType::Equal);
        assert_eq!(tokens[2].tokentype, TokenType::Number(2.0));
        assert_eq!(tokens[3].tokentype, TokenType::Semicolon);
        assert_eq!(tokens[4].tokentype, TokenType::EOF);
    }

    #[test]
    fn two_character_operators() {
        let (tokens, errors) = scanner::scan_tokens("<= == != < ! =");
        assert!(errors.is_empty());
        let types: Vec<&TokenType> = tokens.iter().map(|t| &t.tokentype).collect();
        assert_eq!(
            types,
            vec![
                &TokenType::LessEqual,
                &TokenType::EqualEqual,
                &TokenType::BangEqual,
                &TokenType::Less,
                &TokenType::Bang,
                &TokenType::Equal,
                &TokenType::EOF,
            ]
        );
    }

    #[test]
    fn number_with_trailing_dot_is_two_tokens() {
        let (tokens, errors) = scanner::scan_tokens("123.");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].tokentype, TokenType::Number(123.0));
        assert_eq!(tokens[1].tokentype, TokenType::Dot);
    }

    #[test]
    fn fractional_number() {
        let (tokens, errors) = scanner::scan_tokens("123.25");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].tokentype, TokenType::Number(123.25));
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn string_literal_drops_quotes() {
        let (tokens, errors) = scanner::scan_tokens("\"hi there\"");
        assert!(errors.is_empty());
        assert_eq!(
            tokens[0].tokentype,
            TokenType::String("hi there".to_string())
        );
        assert_eq!(tokens[0].lexeme, "\"hi there\"");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (tokens, errors) = scanner::scan_tokens("\"oops");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unterminated string.");
        // EOF sentinel is still appended.
        assert_eq!(tokens.last().unwrap().tokentype, TokenType::EOF);
    }

    #[test]
    fn unexpected_character_does_not_stop_the_scan() {
        let (tokens, errors) = scanner::scan_tokens("@ # 1");
        assert_eq!(errors.len(), 2);
        assert_eq!(tokens[0].tokentype, TokenType::Number(1.0));
        assert_eq!(tokens[1].tokentype, TokenType::EOF);
    }

    #[test]
    fn keywords_and_identifiers() {
        let (tokens, errors) = scanner::scan_tokens("while whileish");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].tokentype, TokenType::While);
        assert_eq!(
            tokens[1].tokentype,
            TokenType::Identifier("whileish".to_string())
        );
    }

    #[test]
    fn comments_and_newlines() {
        let (tokens, errors) = scanner::scan_tokens("// nothing here\nvar");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].tokentype, TokenType::Var);
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn newline_inside_string_counts_lines() {
        let (tokens, errors) = scanner::scan_tokens("\"a\nb\" x");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].tokentype, TokenType::String("a\nb".to_string()));
        assert_eq!(tokens[1].line, 2);
    }
}
