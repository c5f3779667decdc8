//! Parser for the case language.

use super::ast::*;
use super::lexer::{parse_value, Lexer, Token, TokenKind};
use crate::error::{MagError, Result};

/// Directives the parser accepts.
const DIRECTIVES: &[&str] = &[
    "solver", "runner", "table", "waveform", "material", "report", "scan", "export",
];

/// Directives that may appear at most once.
const SINGLETONS: &[&str] = &["solver", "runner", "scan"];

/// Parser for case files.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    /// Create a new parser, reading the first token.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            peeked: None,
        })
    }

    /// Parse the entire case description.
    pub fn parse(&mut self) -> Result<CaseAst> {
        let mut ast = CaseAst::new();

        while self.current.kind != TokenKind::Eof {
            if self.current.kind == TokenKind::Newline {
                self.advance()?;
                continue;
            }

            let line = self.current.line;
            match self.current.kind {
                TokenKind::Directive => {
                    let keyword = self.current.text.trim_start_matches('.').to_lowercase();
                    if !DIRECTIVES.contains(&keyword.as_str()) {
                        return Err(MagError::parse(line, format!("unknown directive: {}", self.current.text)));
                    }
                    if SINGLETONS.contains(&keyword.as_str()) && ast.directive(&keyword).is_some() {
                        return Err(MagError::parse(line, format!("duplicate .{} directive", keyword)));
                    }
                    self.advance()?;
                    let stmt = self.parse_statement(keyword, line)?;
                    ast.directives.push(stmt);
                }
                TokenKind::Identifier => {
                    let keyword = self.current.text.to_lowercase();
                    self.advance()?;
                    match keyword.as_str() {
                        "region" => {
                            let stmt = self.parse_statement(keyword, line)?;
                            ast.regions.push(stmt);
                        }
                        "coil" => {
                            let stmt = self.parse_statement(keyword, line)?;
                            ast.coils.push(stmt);
                        }
                        _ => {
                            return Err(MagError::parse(line, format!("unknown statement: {}", keyword)));
                        }
                    }
                }
                _ => {
                    return Err(MagError::parse(
                        line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }

            if self.current.kind == TokenKind::Newline {
                self.advance()?;
            }
        }

        Ok(ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = match self.peeked.take() {
            Some(tok) => tok,
            None => self.lexer.next_token()?,
        };
        Ok(())
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        match &self.peeked {
            Some(tok) => Ok(tok),
            None => Err(MagError::parse(self.current.line, "unexpected end of input")),
        }
    }

    /// Parse arguments up to the end of the line.
    fn parse_statement(&mut self, keyword: String, line: usize) -> Result<Statement> {
        let mut stmt = Statement::new(keyword, line);
        let mut has_list = false;

        loop {
            let kind = self.current.kind;
            match kind {
                TokenKind::Newline | TokenKind::Eof => break,
                TokenKind::OpenParen => {
                    if has_list {
                        return Err(MagError::parse(self.current.line, "only one list allowed per line"));
                    }
                    has_list = true;
                    stmt.list = self.parse_list()?;
                }
                TokenKind::Identifier if self.peek()?.kind == TokenKind::Equals => {
                    let key = self.current.text.to_lowercase();
                    self.advance()?;
                    self.advance()?;
                    let value = self.parse_value_token()?;
                    if stmt.params.insert(key.clone(), value).is_some() {
                        return Err(MagError::parse(line, format!("duplicate parameter '{}'", key)));
                    }
                }
                TokenKind::Number | TokenKind::Identifier | TokenKind::String => {
                    let value = self.parse_value_token()?;
                    stmt.args.push(value);
                }
                _ => {
                    return Err(MagError::parse(
                        self.current.line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }
        }

        Ok(stmt)
    }

    /// Parse `( value ... )`. The list may span several lines.
    fn parse_list(&mut self) -> Result<Vec<Value>> {
        let open_line = self.current.line;
        self.advance()?;

        let mut values = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::CloseParen => {
                    self.advance()?;
                    return Ok(values);
                }
                TokenKind::Newline => self.advance()?,
                TokenKind::Eof => return Err(MagError::parse(open_line, "unclosed '('")),
                TokenKind::Number | TokenKind::Identifier | TokenKind::String => {
                    values.push(self.parse_value_token()?);
                }
                _ => {
                    return Err(MagError::parse(
                        self.current.line,
                        format!("unexpected token in list: {:?}", self.current.text),
                    ));
                }
            }
        }
    }

    fn parse_value_token(&mut self) -> Result<Value> {
        let tok = self.current.clone();
        let value = match tok.kind {
            TokenKind::Number => Value::Number(
                parse_value(&tok.text)
                    .ok_or_else(|| MagError::parse(tok.line, format!("invalid number: {}", tok.text)))?,
            ),
            TokenKind::Identifier => Value::Ident(tok.text),
            TokenKind::String => Value::Str(tok.text),
            _ => {
                return Err(MagError::parse(
                    tok.line,
                    format!("expected a value, got {:?}", tok.text),
                ))
            }
        };
        self.advance()?;
        Ok(value)
    }
}
