//! Lexer: turns the raw source into an ordered token stream ending in a
//! single `EndOfFile`.
//!
//! The driver owns position accounting (column resets on `\n`, line
//! increments) and token classification; nom recognisers carve out the
//! multi-character lexemes. Unary minus is never folded into a numeric
//! literal here, that is a parser concern.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, digit0, digit1},
    combinator::recognize,
    sequence::{pair, tuple},
    IResult,
};

use crate::error::{CompileError, CompileResult};
use crate::registry::CommandRegistry;
use crate::token::{Token, TokenKind};

const DIGRAPHS: [(&str, TokenKind); 4] = [
    ("==", TokenKind::EqualsEquals),
    ("!=", TokenKind::NotEquals),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
];

fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    match lexeme {
        "while" => Some(TokenKind::While),
        "for" => Some(TokenKind::For),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "return" => Some(TokenKind::Return),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

fn single_char_kind(c: char) -> Option<TokenKind> {
    match c {
        '+' => Some(TokenKind::Plus),
        '-' => Some(TokenKind::Minus),
        '*' => Some(TokenKind::Multiply),
        '/' => Some(TokenKind::Divide),
        '=' => Some(TokenKind::Equals),
        '<' => Some(TokenKind::Less),
        '>' => Some(TokenKind::Greater),
        '(' => Some(TokenKind::OpenParen),
        ')' => Some(TokenKind::CloseParen),
        '{' => Some(TokenKind::OpenBrace),
        '}' => Some(TokenKind::CloseBrace),
        '[' => Some(TokenKind::OpenBracket),
        ']' => Some(TokenKind::CloseBracket),
        ';' => Some(TokenKind::SemiColon),
        ',' => Some(TokenKind::Comma),
        '.' => Some(TokenKind::Dot),
        _ => None,
    }
}

/// `[A-Za-z][A-Za-z0-9_\-]*`
fn ident_lexeme(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alpha1,
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    ))(input)
}

/// `[0-9]+\.[0-9]*`, `\.[0-9]+` or `[0-9]+`.
fn number_lexeme(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((digit1, tag("."), digit0))),
        recognize(pair(tag("."), digit1)),
        recognize(digit1),
    ))(input)
}

/// `[A-Za-z0-9_]+` after the `@`.
fn annotation_name(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

struct Lexer<'a> {
    src: &'a str,
    registry: &'a CommandRegistry,
    pos: usize,
    line: usize,
    col: usize,
}

/// Lexes `source` into tokens. Pure function of its inputs; the registry
/// decides which identifiers become `CmdKey`.
pub fn lex(source: &str, registry: &CommandRegistry) -> CompileResult<Vec<Token>> {
    Lexer {
        src: source,
        registry,
        pos: 0,
        line: 1,
        col: 0,
    }
    .run()
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    /// Advances past `text`, keeping line/column in step.
    fn advance(&mut self, text: &str) {
        for c in text.chars() {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        let mut buf = [0u8; 4];
        self.advance(c.encode_utf8(&mut buf));
        Some(c)
    }

    fn fatal(&self, message: impl Into<String>) -> CompileError {
        CompileError::lex(message, self.line, self.col)
    }

    fn run(mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let (line, col) = (self.line, self.col);

            // Keywords, command roots and identifiers.
            if c.is_ascii_alphabetic() {
                let (_, lexeme) =
                    ident_lexeme(self.rest()).map_err(|_| self.fatal("Invalid identifier"))?;
                self.advance(lexeme);

                if let Some(kind) = keyword_kind(lexeme) {
                    tokens.push(Token::new(kind, line, col));
                } else if self.registry.is_valid_root(lexeme) {
                    tokens.push(Token::with_text(TokenKind::CmdKey, lexeme, line, col));
                } else {
                    tokens.push(Token::with_text(TokenKind::Ident, lexeme, line, col));
                }
                continue;
            }

            // Numbers. A lone '.' stays a Dot token.
            if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                let (_, lexeme) =
                    number_lexeme(self.rest()).map_err(|_| self.fatal("Invalid number"))?;
                self.advance(lexeme);

                let kind = if lexeme.contains('.') {
                    TokenKind::FloatLit
                } else {
                    TokenKind::IntLit
                };
                tokens.push(Token::with_text(kind, lexeme, line, col));
                continue;
            }

            // Strings, delimited by " or '.
            if c == '"' || c == '\'' {
                let text = self.lex_string(c)?;
                tokens.push(Token::with_text(TokenKind::StringLit, text, line, col));
                continue;
            }

            // Annotations.
            if c == '@' {
                self.advance_char();
                let (_, name) = annotation_name(self.rest())
                    .map_err(|_| self.fatal("Empty annotation name"))?;
                if name.is_empty() {
                    return Err(self.fatal("Empty annotation name"));
                }
                self.advance(name);
                tokens.push(Token::with_text(TokenKind::Annotation, name, line, col));
                continue;
            }

            // '#' is a line comment only at column 0.
            if c == '#' && self.col == 0 {
                self.skip_to_newline();
                continue;
            }

            if self.rest().starts_with("//") {
                self.skip_to_newline();
                continue;
            }

            if self.rest().starts_with("/*") {
                self.advance("/*");
                match self.rest().find("*/") {
                    Some(end) => {
                        let inner = &self.rest()[..end + 2];
                        self.advance(inner);
                    }
                    None => return Err(self.fatal("Unterminated block comment")),
                }
                continue;
            }

            // Digraphs take precedence over single-character operators.
            if let Some(&(text, kind)) = DIGRAPHS.iter().find(|(d, _)| self.rest().starts_with(d)) {
                self.advance(text);
                tokens.push(Token::with_text(kind, text, line, col));
                continue;
            }

            if let Some(kind) = single_char_kind(c) {
                self.advance_char();
                tokens.push(Token::with_text(kind, c, line, col));
                continue;
            }

            if c.is_whitespace() {
                if c == '\n' {
                    tokens.push(Token::new(TokenKind::NewLine, line, col));
                }
                self.advance_char();
                continue;
            }

            return Err(self.fatal(format!("Unidentified value '{}'", c)));
        }

        tokens.push(Token::new(TokenKind::EndOfFile, self.line, self.col));
        Ok(tokens)
    }

    fn skip_to_newline(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn lex_string(&mut self, quote: char) -> CompileResult<String> {
        self.advance_char(); // opening quote
        let mut value = String::new();

        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => return Err(self.fatal("Unterminated string literal!")),
            };
            if c == quote {
                self.advance_char();
                return Ok(value);
            }
            self.advance_char();

            if c != '\\' {
                value.push(c);
                continue;
            }

            let esc = self
                .advance_char()
                .ok_or_else(|| self.fatal("Unterminated escape sequence in string"))?;
            match esc {
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                't' => value.push('\t'),
                '\\' => value.push('\\'),
                '\'' => value.push('\''),
                '"' => value.push('"'),
                _ => {
                    return Err(self.fatal(format!("Unknown escape sequence \\{}", esc)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CommandRegistry {
        let doc = json!({
            "children": {
                "say": { "required_level": 0 },
                "give": { "required_level": 2 }
            }
        });
        CommandRegistry::from_value(&doc).unwrap()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source, &registry())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn classifies_keywords_commands_and_idents() {
        assert_eq!(
            kinds("while say hello"),
            vec![
                TokenKind::While,
                TokenKind::CmdKey,
                TokenKind::Ident,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn digraphs_precede_single_chars() {
        assert_eq!(
            kinds("<= < == ="),
            vec![
                TokenKind::LessEqual,
                TokenKind::Less,
                TokenKind::EqualsEquals,
                TokenKind::Equals,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn minus_is_not_part_of_a_number() {
        let tokens = lex("-5", &registry()).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Minus);
        assert_eq!(tokens[1].kind, TokenKind::IntLit);
        assert_eq!(tokens[1].text.as_deref(), Some("5"));
    }

    #[test]
    fn float_forms() {
        let tokens = lex("1.5 .5 5. 5 .", &registry()).unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::IntLit,
                TokenKind::Dot,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let tokens = lex(r#""a\nb\t\"c\"""#, &registry()).unwrap();
        assert_eq!(tokens[0].text.as_deref(), Some("a\nb\t\"c\""));
    }

    #[test]
    fn single_quoted_string() {
        let tokens = lex(r"'hi there'", &registry()).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLit);
        assert_eq!(tokens[0].text.as_deref(), Some("hi there"));
    }

    #[test]
    fn unknown_escape_is_fatal() {
        assert!(lex(r#""a\qb""#, &registry()).is_err());
    }

    #[test]
    fn unterminated_string_is_fatal() {
        assert!(lex("\"abc", &registry()).is_err());
    }

    #[test]
    fn comments_produce_no_tokens() {
        assert_eq!(
            kinds("# leading\nx // tail\n/* block\nstill */ y"),
            vec![
                TokenKind::NewLine,
                TokenKind::Ident,
                TokenKind::NewLine,
                TokenKind::Ident,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn hash_mid_line_is_fatal() {
        assert!(lex("x #oops", &registry()).is_err());
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        assert!(lex("/* never closed", &registry()).is_err());
    }

    #[test]
    fn empty_annotation_is_fatal() {
        assert!(lex("@ name", &registry()).is_err());
    }

    #[test]
    fn annotation_and_positions() {
        let tokens = lex("@tick\nx = 1", &registry()).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Annotation);
        assert_eq!(tokens[0].text.as_deref(), Some("tick"));
        assert_eq!((tokens[0].line, tokens[0].col), (1, 0));
        // 'x' opens line 2.
        assert_eq!((tokens[2].line, tokens[2].col), (2, 0));
    }

    #[test]
    fn stray_character_is_fatal() {
        assert!(lex("x = $", &registry()).is_err());
    }

    #[test]
    fn relexing_canonical_source_preserves_kinds() {
        let source = "x = 10\nwhile (x < 3) { x = x + 1 ; say \"hi\" }";
        let first = lex(source, &registry()).unwrap();

        let canonical: String = first
            .iter()
            .filter(|t| t.kind != TokenKind::EndOfFile)
            .map(|t| match t.kind {
                TokenKind::NewLine => "\n".to_string(),
                TokenKind::StringLit => format!("\"{}\" ", t.text.as_deref().unwrap()),
                _ => format!("{} ", t.text_or_label()),
            })
            .collect();

        let second = lex(&canonical, &registry()).unwrap();
        let kinds_of = |tokens: &[Token]| -> Vec<TokenKind> {
            tokens.iter().map(|t| t.kind).collect()
        };
        assert_eq!(kinds_of(&first), kinds_of(&second));
    }
}
