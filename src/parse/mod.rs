use logos::{Lexer, Logos, Span};
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

pub(crate) mod lex;
#[cfg(test)]
mod tests;

use self::lex::Token;
use crate::ast::{self, Doc, DocLine};

#[derive(Error, Debug, Diagnostic, PartialEq)]
pub(crate) enum ParseError {
    #[error("invalid token")]
    InvalidToken {
        #[label("found here")]
        span: SourceSpan,
    },
    #[error("integer is out of range")]
    IntegerOutOfRange {
        #[label("defined here")]
        span: SourceSpan,
    },
    #[error("invalid string escape")]
    InvalidStringEscape {
        #[label("defined here")]
        span: SourceSpan,
    },
    #[error("expected {expected}, but found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: Token,
        #[label("found here")]
        span: SourceSpan,
    },
    #[error("unexpected end of file{}", .expected.as_ref().map(|e| format!(", expected {}", e)).unwrap_or_default())]
    UnexpectedEof { expected: Option<String> },
}

pub(crate) fn parse(source: &str) -> Result<ast::File, Vec<ParseError>> {
    let mut parser = Parser::new(source);
    match parser.parse_file() {
        Ok(file) if parser.lexer.extras.errors.is_empty() => Ok(file),
        _ => Err(parser.lexer.extras.errors),
    }
}

struct Parser<'a> {
    lexer: Lexer<'a, Token>,
    peek: Option<(Token, Span)>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Parser {
            lexer: Token::lexer(source),
            peek: None,
        }
    }

    fn parse_file(&mut self) -> Result<ast::File, ()> {
        let doc = self.skip_trivia();
        let package = self.parse_package(doc)?;

        let mut imports = Vec::new();
        let mut decls = Vec::new();

        loop {
            let doc = self.skip_trivia();
            match self.peek() {
                Some((Token::Import, _)) => {
                    if self.parse_imports(&mut imports).is_err() {
                        self.skip_until(&[Token::Import, Token::Type, Token::Const]);
                    }
                }
                Some((Token::Type, _)) => match self.parse_type_decl(doc) {
                    Ok(decl) => decls.push(decl),
                    Err(()) => self.skip_until(&[Token::Import, Token::Type, Token::Const]),
                },
                Some((Token::Const, _)) => match self.parse_const_decl() {
                    Ok(decl) => decls.push(decl),
                    Err(()) => self.skip_until(&[Token::Import, Token::Type, Token::Const]),
                },
                None => break,
                _ => {
                    let _: Result<(), ()> = self.unexpected_token("'import', 'type' or 'const'");
                    self.skip_until(&[Token::Import, Token::Type, Token::Const]);
                }
            }
        }

        Ok(ast::File {
            package,
            imports,
            decls,
        })
    }

    fn parse_package(&mut self, doc: Doc) -> Result<ast::Package, ()> {
        let start = match self.peek() {
            Some((Token::Package, span)) => {
                self.bump();
                span
            }
            _ => return self.unexpected_token("'package'"),
        };
        let name = self.parse_ident()?;
        let span = start.start..name.span.end;
        self.expect_terminator()?;
        Ok(ast::Package { name, doc, span })
    }

    fn parse_imports(&mut self, imports: &mut Vec<ast::Import>) -> Result<(), ()> {
        self.expect_eq(Token::Import)?;

        if self.bump_if_eq(Token::LeftParen) {
            loop {
                self.skip_trivia();
                match self.peek() {
                    Some((Token::RightParen, _)) => {
                        self.bump();
                        break;
                    }
                    Some(_) => imports.push(self.parse_import_spec()?),
                    None => return self.unexpected_token("an import or ')'"),
                }
            }
        } else {
            imports.push(self.parse_import_spec()?);
        }
        self.expect_terminator()
    }

    fn parse_import_spec(&mut self) -> Result<ast::Import, ()> {
        let (alias, blank, start) = match self.peek() {
            Some((Token::Ident(name), span)) => {
                self.bump();
                if name == "_" {
                    (None, true, Some(span))
                } else {
                    (Some(ast::Ident::new(name, span.clone())), false, Some(span))
                }
            }
            _ => (None, false, None),
        };

        let (path, path_span) = match self.peek() {
            Some((Token::StringLiteral(value), span)) => {
                self.bump();
                (value, span)
            }
            _ => return self.unexpected_token("a quoted import path"),
        };

        let span = match start {
            Some(start) => start.start..path_span.end,
            None => path_span.clone(),
        };

        Ok(ast::Import {
            alias,
            blank,
            path,
            path_span,
            span,
        })
    }

    fn parse_type_decl(&mut self, doc: Doc) -> Result<ast::Decl, ()> {
        let start = match self.peek() {
            Some((Token::Type, span)) => {
                self.bump();
                span
            }
            _ => return self.unexpected_token("'type'"),
        };
        let name = self.parse_ident()?;

        match self.peek() {
            Some((Token::Struct, _)) => {
                self.bump();
                let (fields, end) = self.parse_struct_body()?;
                Ok(ast::Decl::Struct(ast::Struct {
                    name,
                    fields,
                    doc,
                    span: start.start..end,
                }))
            }
            Some((Token::Interface, _)) => {
                self.bump();
                let (methods, end) = self.parse_interface_body()?;
                Ok(ast::Decl::Interface(ast::Interface {
                    name,
                    methods,
                    doc,
                    span: start.start..end,
                }))
            }
            Some((Token::Ident(_), _)) => {
                let base = self.parse_ident()?;
                let span = start.start..base.span.end;
                self.expect_terminator()?;
                Ok(ast::Decl::Alias(ast::Alias {
                    name,
                    base,
                    doc,
                    span,
                }))
            }
            _ => self.unexpected_token("'struct', 'interface' or a base type"),
        }
    }

    fn parse_struct_body(&mut self) -> Result<(Vec<ast::Field>, usize), ()> {
        self.expect_eq(Token::LeftBrace)?;

        let mut fields = Vec::new();
        loop {
            let doc = self.skip_trivia();
            match self.peek() {
                Some((Token::RightBrace, span)) => {
                    self.bump();
                    return Ok((fields, span.end));
                }
                Some((Token::Ident(_), _)) => fields.push(self.parse_field(doc)?),
                _ => return self.unexpected_token("a field or '}'"),
            }
        }
    }

    fn parse_field(&mut self, doc: Doc) -> Result<ast::Field, ()> {
        let name = self.parse_ident()?;
        let (ty, ty_span) = self.parse_ty()?;

        let tag = match self.peek() {
            Some((Token::Tag(raw), span)) => {
                self.bump();
                Some(ast::Tag { raw, span })
            }
            _ => None,
        };

        let end = tag
            .as_ref()
            .map(|t| t.span.end)
            .unwrap_or_else(|| ty_span.end);
        let span = name.span.start..end;
        self.expect_field_terminator()?;

        Ok(ast::Field {
            name,
            ty,
            ty_span,
            tag,
            doc,
            span,
        })
    }

    fn parse_interface_body(&mut self) -> Result<(Vec<ast::Method>, usize), ()> {
        self.expect_eq(Token::LeftBrace)?;

        let mut methods = Vec::new();
        loop {
            let doc = self.skip_trivia();
            match self.peek() {
                Some((Token::RightBrace, span)) => {
                    self.bump();
                    return Ok((methods, span.end));
                }
                Some((Token::Ident(_), _)) => methods.push(self.parse_method(doc)?),
                _ => return self.unexpected_token("a method or '}'"),
            }
        }
    }

    fn parse_method(&mut self, doc: Doc) -> Result<ast::Method, ()> {
        let name = self.parse_ident()?;
        self.expect_eq(Token::LeftParen)?;
        let (inputs, close) = self.parse_ty_list()?;

        let mut end = close.end;
        let outputs = match self.peek() {
            Some((Token::Newline | Token::Semicolon | Token::RightBrace, _)) | None => Vec::new(),
            Some((Token::LeftParen, _)) => {
                self.bump();
                let (outputs, close) = self.parse_ty_list()?;
                end = close.end;
                outputs
            }
            _ => {
                let (ty, span) = self.parse_ty()?;
                end = span.end;
                vec![(ty, span)]
            }
        };

        let span = name.span.start..end;
        self.expect_field_terminator()?;

        Ok(ast::Method {
            name,
            inputs,
            outputs,
            doc,
            span,
        })
    }

    /// Parses a comma-separated list of types up to a closing paren,
    /// returning the list and the span of the paren.
    fn parse_ty_list(&mut self) -> Result<(Vec<(ast::Ty, Span)>, Span), ()> {
        let mut types = Vec::new();
        loop {
            match self.peek() {
                Some((Token::RightParen, span)) => {
                    self.bump();
                    return Ok((types, span));
                }
                _ if types.is_empty() => types.push(self.parse_ty()?),
                Some((Token::Comma, _)) => {
                    self.bump();
                    types.push(self.parse_ty()?);
                }
                _ => return self.unexpected_token("',' or ')'"),
            }
        }
    }

    fn parse_const_decl(&mut self) -> Result<ast::Decl, ()> {
        let start = match self.peek() {
            Some((Token::Const, span)) => {
                self.bump();
                span
            }
            _ => return self.unexpected_token("'const'"),
        };

        let mut specs = Vec::new();
        let end;
        if self.bump_if_eq(Token::LeftParen) {
            loop {
                let doc = self.skip_trivia();
                match self.peek() {
                    Some((Token::RightParen, span)) => {
                        self.bump();
                        end = span.end;
                        break;
                    }
                    Some((Token::Ident(_), _)) => specs.push(self.parse_const_spec(doc)?),
                    _ => return self.unexpected_token("a constant or ')'"),
                }
            }
        } else {
            let spec = self.parse_const_spec(Doc::default())?;
            end = spec.span.end;
            specs.push(spec);
        }

        Ok(ast::Decl::Consts(ast::ConstBlock {
            specs,
            span: start.start..end,
        }))
    }

    fn parse_const_spec(&mut self, doc: Doc) -> Result<ast::ConstSpec, ()> {
        let name = self.parse_ident()?;

        let ty = match self.peek() {
            Some((Token::Ident(_), _)) => Some(self.parse_ident()?),
            _ => None,
        };

        let value = if self.bump_if_eq(Token::Equals) {
            match self.peek() {
                Some((Token::Iota, span)) => {
                    self.bump();
                    Some(ast::ConstValue::Iota(span))
                }
                Some((Token::IntLiteral(value), span)) => {
                    self.bump();
                    Some(ast::ConstValue::Int(ast::Int { value, span }))
                }
                _ => return self.unexpected_token("'iota' or an integer literal"),
            }
        } else {
            None
        };

        let end = match &value {
            Some(ast::ConstValue::Iota(span)) => span.end,
            Some(ast::ConstValue::Int(int)) => int.span.end,
            None => ty.as_ref().map(|t| t.span.end).unwrap_or(name.span.end),
        };
        let span = name.span.start..end;
        self.expect_field_terminator()?;

        Ok(ast::ConstSpec {
            name,
            ty,
            value,
            doc,
            span,
        })
    }

    fn parse_ty(&mut self) -> Result<(ast::Ty, Span), ()> {
        match self.peek() {
            Some((Token::LeftBracket, start)) => {
                self.bump();
                self.expect_eq(Token::RightBracket)?;
                let (elem, elem_span) = self.parse_ty()?;
                Ok((ast::Ty::List(Box::new(elem)), start.start..elem_span.end))
            }
            Some((Token::Map, start)) => {
                self.bump();
                self.expect_eq(Token::LeftBracket)?;
                let (key, _) = self.parse_ty()?;
                self.expect_eq(Token::RightBracket)?;
                let (value, value_span) = self.parse_ty()?;
                Ok((
                    ast::Ty::Map {
                        key: Box::new(key),
                        value: Box::new(value),
                    },
                    start.start..value_span.end,
                ))
            }
            Some((Token::Chan, start)) => {
                self.bump();
                let (elem, elem_span) = self.parse_ty()?;
                Ok((ast::Ty::Chan(Box::new(elem)), start.start..elem_span.end))
            }
            Some((Token::Ident(_), _)) => {
                let first = self.parse_ident()?;
                if self.bump_if_eq(Token::Dot) {
                    let name = self.parse_ident()?;
                    let span = first.span.start..name.span.end;
                    Ok((
                        ast::Ty::Named(ast::TypeName {
                            qualifier: Some(first),
                            name,
                        }),
                        span,
                    ))
                } else {
                    let span = first.span.clone();
                    Ok((
                        ast::Ty::Named(ast::TypeName {
                            qualifier: None,
                            name: first,
                        }),
                        span,
                    ))
                }
            }
            _ => self.unexpected_token("a type"),
        }
    }

    /// Skips newlines and comments, returning the comment block directly
    /// preceding the next token. A blank line detaches an earlier block.
    fn skip_trivia(&mut self) -> Doc {
        let mut lines = Vec::new();
        let mut after_comment = false;
        loop {
            match self.peek() {
                Some((Token::Comment(text), span)) => {
                    self.bump();
                    lines.push(DocLine { text, span });
                    after_comment = true;
                }
                Some((Token::Newline, _)) => {
                    self.bump();
                    if !after_comment {
                        lines.clear();
                    }
                    after_comment = false;
                }
                _ => break,
            }
        }
        Doc { lines }
    }

    fn expect_terminator(&mut self) -> Result<(), ()> {
        match self.peek() {
            Some((Token::Newline | Token::Semicolon, _)) => {
                self.bump();
                Ok(())
            }
            Some((Token::Comment(_), _)) | None => Ok(()),
            _ => self.unexpected_token("a newline or ';'"),
        }
    }

    /// Like [`expect_terminator`](Self::expect_terminator), but also accepts a
    /// closing brace or paren (left unconsumed) ending the surrounding block.
    fn expect_field_terminator(&mut self) -> Result<(), ()> {
        match self.peek() {
            Some((Token::Newline | Token::Semicolon, _)) => {
                self.bump();
                Ok(())
            }
            Some((Token::RightBrace | Token::RightParen | Token::Comment(_), _)) | None => Ok(()),
            _ => self.unexpected_token("a newline or ';'"),
        }
    }

    fn parse_ident(&mut self) -> Result<ast::Ident, ()> {
        self.expect(
            |tok, span| tok.into_ident().map(|value| ast::Ident::new(value, span)),
            "an identifier",
        )
    }

    fn expect_eq(&mut self, t: Token) -> Result<(), ()> {
        match self.peek() {
            Some((tok, _)) if tok == t => {
                self.bump();
                Ok(())
            }
            _ => self.unexpected_token(format!("'{}'", t)),
        }
    }

    fn expect<T>(
        &mut self,
        mut f: impl FnMut(Token, Span) -> Option<T>,
        expected: impl ToString,
    ) -> Result<T, ()> {
        if let Some((tok, span)) = self.peek() {
            if let Some(value) = f(tok, span) {
                self.bump();
                return Ok(value);
            }
        };

        self.unexpected_token(expected)
    }

    fn skip_until(&mut self, tokens: &[Token]) {
        while let Some((tok, _)) = self.peek() {
            if tokens.contains(&tok) {
                break;
            }
            self.bump();
        }
    }

    fn bump_if_eq(&mut self, t: Token) -> bool {
        match self.peek() {
            Some((tok, _)) if tok == t => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    fn bump(&mut self) -> (Token, Span) {
        self.peek
            .take()
            .expect("called bump without peek returning Some()")
    }

    fn peek(&mut self) -> Option<(Token, Span)> {
        if self.peek.is_none() {
            self.peek = self.next();
        }
        self.peek.clone()
    }

    fn next(&mut self) -> Option<(Token, Span)> {
        if self.peek.is_some() {
            self.peek.take()
        } else {
            match self.lexer.next() {
                Some(Token::Error) => {
                    self.add_error(ParseError::InvalidToken {
                        span: self.lexer.span().into(),
                    });
                    Some((Token::Error, self.lexer.span()))
                }
                Some(tok) => Some((tok, self.lexer.span())),
                None => None,
            }
        }
    }

    fn unexpected_token<T>(&mut self, expected: impl ToString) -> Result<T, ()> {
        match self.peek() {
            Some((Token::Error, _)) => Err(()),
            Some((found, span)) => {
                self.add_error(ParseError::UnexpectedToken {
                    expected: expected.to_string(),
                    found,
                    span: span.into(),
                });
                Err(())
            }
            None => {
                self.add_error(ParseError::UnexpectedEof {
                    expected: Some(expected.to_string()),
                });
                Err(())
            }
        }
    }

    fn add_error(&mut self, err: ParseError) {
        self.lexer.extras.errors.push(err);
    }
}
