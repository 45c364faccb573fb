//! Recursive-descent parser: token stream to AST.
//!
//! The top level is an implicit scope holding all parsed statements. The
//! parser resolves nothing: variables, types and command arity are analyzer
//! concerns. The first syntactic mismatch is fatal.

use crate::ast::{Annotation, Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::token::{Token, TokenKind};

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pending_annotations: Vec<Annotation>,
}

/// Parses the token stream into the root scope node.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Node> {
    Parser {
        tokens,
        pos: 0,
        pending_annotations: Vec::new(),
    }
    .run()
}

impl Parser {
    fn run(mut self) -> CompileResult<Node> {
        let mut statements = Vec::new();

        loop {
            match self.peek().kind {
                // Empty lines and stray semicolons between statements.
                TokenKind::NewLine | TokenKind::SemiColon => {
                    self.advance();
                }
                TokenKind::EndOfFile => break,
                _ => statements.push(self.parse_statement()?),
            }
        }

        Ok(Node::new(NodeKind::Scope { statements }))
    }

    // ===== Statements =====

    fn parse_statement(&mut self) -> CompileResult<Node> {
        self.skip_newlines();

        while self.peek().kind == TokenKind::Annotation {
            let tok = self.advance();
            let name = tok
                .text
                .ok_or_else(|| CompileError::parse("Encountered annotation without a name", tok.line, tok.col))?;
            self.pending_annotations.push(Annotation { name });
            self.skip_newlines();
        }

        let tok = self.peek().clone();
        let mut node = match tok.kind {
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Equals => {
                self.parse_var_decl()?
            }
            TokenKind::CmdKey => self.parse_command()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::OpenBrace => self.parse_scope()?,
            _ => {
                return Err(CompileError::parse(
                    format!("Unknown statement type: {}", tok.kind.label()),
                    tok.line,
                    tok.col,
                ));
            }
        };

        if !self.pending_annotations.is_empty() {
            node.annotations = std::mem::take(&mut self.pending_annotations);
        }

        Ok(node)
    }

    fn parse_var_decl(&mut self) -> CompileResult<Node> {
        let name = self.advance(); // IDENT
        self.advance(); // '='

        if name.text.as_deref().unwrap_or("").is_empty() {
            return Err(CompileError::parse(
                "Encountered variable assignation without name",
                name.line,
                name.col,
            ));
        }

        let value = self.parse_expression()?;
        Ok(Node::new(NodeKind::VarDecl {
            name,
            value: Box::new(value),
        }))
    }

    /// A command is greedy: every expression up to the statement terminator
    /// becomes an argument.
    fn parse_command(&mut self) -> CompileResult<Node> {
        let keyword = self.advance(); // CMD_KEY
        let mut args = Vec::new();

        while !matches!(
            self.peek().kind,
            TokenKind::NewLine
                | TokenKind::SemiColon
                | TokenKind::CloseBrace
                | TokenKind::EndOfFile
        ) {
            args.push(self.parse_expression()?);
        }

        self.skip_newlines();
        Ok(Node::new(NodeKind::Command { keyword, args }))
    }

    fn parse_if(&mut self) -> CompileResult<Node> {
        self.advance(); // 'if'
        self.expect(TokenKind::OpenParen, "after 'if'")?;
        self.advance();

        let condition = self.parse_expression()?;

        self.expect(TokenKind::CloseParen, "after if condition")?;
        self.advance();

        let then_branch = self.parse_statement()?;

        let mut else_branch = None;
        if self.peek().kind == TokenKind::Else {
            self.advance();
            else_branch = Some(Box::new(self.parse_statement()?));
        }

        Ok(Node::new(NodeKind::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
            const_condition: None,
        }))
    }

    fn parse_while(&mut self) -> CompileResult<Node> {
        self.advance(); // 'while'
        self.expect(TokenKind::OpenParen, "after 'while'")?;
        self.advance();

        let condition = self.parse_expression()?;

        self.expect(TokenKind::CloseParen, "after while condition")?;
        self.advance();

        let body = self.parse_statement()?;

        Ok(Node::new(NodeKind::While {
            condition: Box::new(condition),
            body: Box::new(body),
            const_condition: None,
        }))
    }

    fn parse_scope(&mut self) -> CompileResult<Node> {
        let open = self.advance(); // '{'
        let mut statements = Vec::new();

        loop {
            self.skip_newlines();
            match self.peek().kind {
                TokenKind::CloseBrace => break,
                TokenKind::EndOfFile => {
                    return Err(CompileError::parse(
                        "Expected '}' at end of the scope",
                        open.line,
                        open.col,
                    ));
                }
                _ => statements.push(self.parse_statement()?),
            }
        }

        self.advance(); // '}'
        Ok(Node::new(NodeKind::Scope { statements }))
    }

    // ===== Expressions =====

    fn parse_expression(&mut self) -> CompileResult<Node> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> CompileResult<Node> {
        let mut left = self.parse_additive()?;

        while self.peek().kind.is_comparison() {
            let op = self.advance();
            let right = self.parse_additive()?;
            left = Node::binary_op(op, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> CompileResult<Node> {
        let mut left = self.parse_multiplicative()?;

        while matches!(self.peek().kind, TokenKind::Plus | TokenKind::Minus) {
            let op = self.advance();
            let right = self.parse_multiplicative()?;
            left = Node::binary_op(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Node> {
        let mut left = self.parse_primary()?;

        while matches!(self.peek().kind, TokenKind::Multiply | TokenKind::Divide) {
            let op = self.advance();
            let right = self.parse_primary()?;
            left = Node::binary_op(op, left, right);
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> CompileResult<Node> {
        let tok = self.advance();

        match tok.kind {
            TokenKind::IntLit
            | TokenKind::FloatLit
            | TokenKind::StringLit
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Ident => Ok(Node::expr(tok)),

            TokenKind::OpenParen => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::CloseParen, "in expression")?;
                self.advance();
                Ok(expr)
            }

            // Unary minus: (-x) desugars to (0 - x).
            TokenKind::Minus => {
                let right = self.parse_primary()?;
                let zero = Node::expr(Token::with_text(
                    TokenKind::IntLit,
                    "0",
                    tok.line,
                    tok.col,
                ));
                Ok(Node::binary_op(
                    Token::with_text(TokenKind::Minus, "-", tok.line, tok.col),
                    zero,
                    right,
                ))
            }

            _ => Err(CompileError::parse("Invalid expression", tok.line, tok.col)),
        }
    }

    // ===== Token access =====

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn skip_newlines(&mut self) {
        while matches!(
            self.peek().kind,
            TokenKind::NewLine | TokenKind::SemiColon
        ) {
            self.advance();
        }
    }

    fn expect(&self, kind: TokenKind, context: &str) -> CompileResult<()> {
        let tok = self.peek();
        if tok.kind != kind {
            return Err(CompileError::parse(
                format!("Expected '{}' {}", kind.label(), context),
                tok.line,
                tok.col,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::registry::CommandRegistry;
    use serde_json::json;

    fn parse_source(source: &str) -> CompileResult<Node> {
        let doc = json!({ "children": { "say": { "required_level": 0 } } });
        let registry = CommandRegistry::from_value(&doc).unwrap();
        parse(lex(source, &registry).unwrap())
    }

    fn root_statements(node: Node) -> Vec<Node> {
        match node.kind {
            NodeKind::Scope { statements } => statements,
            other => panic!("expected root scope, got {:?}", other),
        }
    }

    #[test]
    fn parses_var_decl_and_command() {
        let stmts = root_statements(parse_source("x = 10\nsay x").unwrap());
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0].kind, NodeKind::VarDecl { .. }));
        match &stmts[1].kind {
            NodeKind::Command { keyword, args } => {
                assert_eq!(keyword.text.as_deref(), Some("say"));
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let stmts = root_statements(parse_source("x = 1 + 2 * 3").unwrap());
        let value = match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => value,
            other => panic!("expected decl, got {:?}", other),
        };
        match &value.kind {
            NodeKind::BinaryOp { op, right, .. } => {
                assert_eq!(op.kind, TokenKind::Plus);
                assert!(matches!(right.kind, NodeKind::BinaryOp { .. }));
            }
            other => panic!("expected binary op, got {:?}", other),
        }
    }

    #[test]
    fn unary_minus_desugars_to_zero_minus() {
        let stmts = root_statements(parse_source("x = -5").unwrap());
        let value = match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => value,
            other => panic!("expected decl, got {:?}", other),
        };
        match &value.kind {
            NodeKind::BinaryOp { op, left, right } => {
                assert_eq!(op.kind, TokenKind::Minus);
                match (&left.kind, &right.kind) {
                    (NodeKind::Expr { token: l, .. }, NodeKind::Expr { token: r, .. }) => {
                        assert_eq!(l.text.as_deref(), Some("0"));
                        assert_eq!(r.text.as_deref(), Some("5"));
                    }
                    other => panic!("expected literal operands, got {:?}", other),
                }
            }
            other => panic!("expected binary op, got {:?}", other),
        }
    }

    #[test]
    fn annotations_attach_to_next_statement() {
        let stmts = root_statements(parse_source("@tick\n@load\nx = 1").unwrap());
        assert_eq!(stmts[0].annotations.len(), 2);
        assert_eq!(stmts[0].annotations[0].name, "tick");
        assert_eq!(stmts[0].annotations[1].name, "load");
    }

    #[test]
    fn dangling_annotation_is_an_error() {
        assert!(parse_source("x = 1\n@tick\n").is_err());
    }

    #[test]
    fn command_is_greedy_to_end_of_line() {
        let stmts = root_statements(parse_source("say 1 2 x \"s\"\nsay 3").unwrap());
        match &stmts[0].kind {
            NodeKind::Command { args, .. } => assert_eq!(args.len(), 4),
            other => panic!("expected command, got {:?}", other),
        }
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn command_stops_before_close_brace() {
        let stmts = root_statements(parse_source("{ say 1 }").unwrap());
        match &stmts[0].kind {
            NodeKind::Scope { statements } => {
                assert!(matches!(statements[0].kind, NodeKind::Command { .. }));
            }
            other => panic!("expected scope, got {:?}", other),
        }
    }

    #[test]
    fn if_else_chain() {
        let source = "if (x == 1) { say 1 } else if (x == 2) { say 2 } else { say 3 }";
        let stmts = root_statements(parse_source(source).unwrap());
        match &stmts[0].kind {
            NodeKind::If { else_branch, .. } => {
                let chained = else_branch.as_ref().expect("else branch");
                assert!(matches!(chained.kind, NodeKind::If { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn missing_paren_is_fatal() {
        assert!(parse_source("if x == 1 { say 1 }").is_err());
        assert!(parse_source("while (x { say 1 }").is_err());
    }

    #[test]
    fn unclosed_scope_is_fatal() {
        assert!(parse_source("{ x = 1\n").is_err());
    }

    #[test]
    fn stray_semicolons_are_skipped() {
        let stmts = root_statements(parse_source(";;\nx = 1;;\n;say x").unwrap());
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn unknown_statement_head_is_fatal() {
        assert!(parse_source("return 5").is_err());
        assert!(parse_source("for (x)").is_err());
    }
}
