/// Token kinds recognised by the lexer. The set is closed; the parser
/// matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    IntLit,
    FloatLit,
    StringLit,

    // Operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Equals,
    EqualsEquals,
    NotEquals,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Brackets
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,

    // Punctuation
    SemiColon,
    Comma,
    Dot,

    // Keywords
    While,
    For,
    If,
    Else,
    Return,
    True,
    False,

    // Dynamic
    Ident,
    CmdKey,
    Annotation,

    // Special
    NewLine,
    EndOfFile,
}

impl TokenKind {
    /// Human-readable label used in dumps and diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            TokenKind::IntLit => "Int",
            TokenKind::FloatLit => "Float",
            TokenKind::StringLit => "String",

            TokenKind::Plus => "PLUS (+)",
            TokenKind::Minus => "MINUS (-)",
            TokenKind::Multiply => "MULTIPLY (*)",
            TokenKind::Divide => "DIVIDE (/)",
            TokenKind::Equals => "EQUALS (=)",
            TokenKind::EqualsEquals => "EQUAL TO (==)",
            TokenKind::NotEquals => "NOT EQUAL TO (!=)",
            TokenKind::Less => "LESS (<)",
            TokenKind::Greater => "GREATER (>)",
            TokenKind::LessEqual => "LESS OR EQUAL (<=)",
            TokenKind::GreaterEqual => "GREATER OR EQUAL (>=)",

            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBrace => "{",
            TokenKind::CloseBrace => "}",
            TokenKind::OpenBracket => "[",
            TokenKind::CloseBracket => "]",

            TokenKind::SemiColon => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",

            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Return => "return",
            TokenKind::True => "true",
            TokenKind::False => "false",

            TokenKind::Ident => "IDENTIFIER",
            TokenKind::CmdKey => "COMMAND_KEY",
            TokenKind::Annotation => "ANNOTATION",

            TokenKind::NewLine => "NEW_LINE",
            TokenKind::EndOfFile => "END_OF_FILE",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TokenKind::Less
                | TokenKind::Greater
                | TokenKind::LessEqual
                | TokenKind::GreaterEqual
                | TokenKind::EqualsEquals
                | TokenKind::NotEquals
        )
    }
}

/// A single lexeme with its position in the source.
///
/// `text` is present for dynamic and literal kinds (and for operators,
/// whose text the generator reuses when building scoreboard opcodes);
/// keywords, `NewLine` and `EndOfFile` carry none.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Option<String>,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, col: usize) -> Self {
        Token {
            kind,
            text: None,
            line,
            col,
        }
    }

    pub fn with_text(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
        Token {
            kind,
            text: Some(text.into()),
            line,
            col,
        }
    }

    /// Token text, or the kind label for tokens that carry none.
    pub fn text_or_label(&self) -> &str {
        self.text.as_deref().unwrap_or_else(|| self.kind.label())
    }
}
