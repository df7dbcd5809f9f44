use std::fmt;

use logos::{skip, Lexer, Logos};

use super::ParseError;

#[derive(Debug, Clone, Logos, PartialEq)]
#[logos(extras = TokenExtras)]
pub(crate) enum Token {
    #[regex("[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),
    #[regex("[0-9]+", int)]
    #[regex("0[xX][0-9A-Fa-f]+", hex_int)]
    IntLiteral(u64),
    #[regex(r#""(?:[^"\\\n]|\\.)*""#, string)]
    StringLiteral(String),
    #[regex("`[^`\n]*`", raw_tag)]
    Tag(String),
    #[token("package")]
    Package,
    #[token("import")]
    Import,
    #[token("type")]
    Type,
    #[token("struct")]
    Struct,
    #[token("interface")]
    Interface,
    #[token("const")]
    Const,
    #[token("map")]
    Map,
    #[token("chan")]
    Chan,
    #[token("iota")]
    Iota,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[regex("//[^\n]*", line_comment)]
    #[regex(r"/\*(?:[^*]|\*+[^*/])*\*+/", block_comment)]
    Comment(String),
    #[token("\n")]
    Newline,
    #[error]
    #[regex(r"[\t\v\f\r ]+", skip)]
    Error,
}

#[derive(Default)]
pub(crate) struct TokenExtras {
    pub errors: Vec<ParseError>,
}

impl Token {
    pub fn into_ident(self) -> Option<String> {
        match self {
            Token::Ident(value) => Some(value),
            _ => None,
        }
    }
}

fn int(lex: &mut Lexer<Token>) -> Option<u64> {
    match lex.slice().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            lex.extras.errors.push(ParseError::IntegerOutOfRange {
                span: lex.span().into(),
            });
            None
        }
    }
}

fn hex_int(lex: &mut Lexer<Token>) -> Option<u64> {
    match u64::from_str_radix(&lex.slice()[2..], 16) {
        Ok(value) => Some(value),
        Err(_) => {
            lex.extras.errors.push(ParseError::IntegerOutOfRange {
                span: lex.span().into(),
            });
            None
        }
    }
}

fn string(lex: &mut Lexer<Token>) -> Option<String> {
    let slice = &lex.slice()[1..lex.slice().len() - 1];
    let mut value = String::with_capacity(slice.len());
    let mut chars = slice.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                _ => {
                    lex.extras.errors.push(ParseError::InvalidStringEscape {
                        span: lex.span().into(),
                    });
                    return None;
                }
            }
        } else {
            value.push(ch);
        }
    }
    Some(value)
}

fn raw_tag(lex: &mut Lexer<Token>) -> String {
    lex.slice()[1..lex.slice().len() - 1].to_owned()
}

fn line_comment(lex: &mut Lexer<Token>) -> String {
    lex.slice()[2..].to_owned()
}

fn block_comment(lex: &mut Lexer<Token>) -> String {
    lex.slice()[2..lex.slice().len() - 2].to_owned()
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(value) => write!(f, "{}", value),
            Token::IntLiteral(value) => write!(f, "{}", value),
            Token::StringLiteral(value) => write!(f, "{:?}", value),
            Token::Tag(value) => write!(f, "`{}`", value),
            Token::Package => write!(f, "package"),
            Token::Import => write!(f, "import"),
            Token::Type => write!(f, "type"),
            Token::Struct => write!(f, "struct"),
            Token::Interface => write!(f, "interface"),
            Token::Const => write!(f, "const"),
            Token::Map => write!(f, "map"),
            Token::Chan => write!(f, "chan"),
            Token::Iota => write!(f, "iota"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Equals => write!(f, "="),
            Token::Colon => write!(f, ":"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Comment(_) => write!(f, "a comment"),
            Token::Newline => write!(f, "a newline"),
            Token::Error => write!(f, "an invalid token"),
        }
    }
}
