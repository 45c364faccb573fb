//! Debug dump emitters: token listings and indented tree views.
//!
//! The tree dump prints richer annotations once a node has been analyzed:
//! a type tag, `[USED]`/`[UNUSED]` on declarations and `[CONST: v]` or
//! `[NON-CONST]` on value nodes and control-flow headers.

use crate::ast::{Node, NodeKind};
use crate::token::Token;
use crate::vars::VarTable;

/// One line per token: `<KIND> -> <text>`, or `<KIND>` for bare tokens.
pub fn token_dump(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match &token.text {
            Some(text) => {
                out.push_str(&format!("{} -> {}\n", token.kind.label(), text));
            }
            None => {
                out.push_str(token.kind.label());
                out.push('\n');
            }
        }
    }
    out
}

/// Indented human-readable tree view. Works on both parse and analyzer
/// output; analyzed nodes print their semantic annotations.
pub fn tree_dump(root: &Node, vars: &VarTable) -> String {
    let mut printer = TreePrinter {
        vars,
        out: String::new(),
        indent: 0,
    };
    printer.visit(root);
    printer.out
}

struct TreePrinter<'a> {
    vars: &'a VarTable,
    out: String,
    indent: usize,
}

impl<'a> TreePrinter<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn annotations(&mut self, node: &Node) {
        if node.annotations.is_empty() {
            return;
        }
        let mut line = String::new();
        for annotation in &node.annotations {
            line.push_str(&format!("@{}, ", annotation.name));
        }
        self.line(line.trim_end());
    }

    fn condition_tag(const_condition: Option<bool>) -> String {
        match const_condition {
            Some(value) => format!("[CONST: {}]", if value { 1 } else { 0 }),
            None => "[NON-CONST]".to_string(),
        }
    }

    fn visit(&mut self, node: &Node) {
        self.annotations(node);

        match &node.kind {
            NodeKind::Command { keyword, args } => {
                self.line(&format!("Command: {}", keyword.text_or_label()));
                self.indent += 1;
                for arg in args {
                    self.visit(arg);
                }
                self.indent -= 1;
                self.out.push('\n');
            }

            NodeKind::VarDecl { name, value } => {
                match node.info.filter(|_| node.analyzed) {
                    Some(id) => {
                        let info = self.vars.get(id);
                        let used = if info.is_used { "[USED]" } else { "[UNUSED]" };
                        let constness = if info.is_constant {
                            format!("[CONST: {}]", info.const_value)
                        } else {
                            "[NON-CONST]".to_string()
                        };
                        self.line(&format!(
                            "VarDecl: {}, Type: {}, {}, {}",
                            info.name,
                            info.data_type.label(),
                            used,
                            constness
                        ));
                    }
                    None => self.line(&format!("VarDecl: {}", name.text_or_label())),
                }

                self.indent += 1;
                self.visit(value);
                self.indent -= 1;
                self.out.push('\n');
            }

            NodeKind::Expr {
                token,
                force_dynamic,
            } => match node.info.filter(|_| node.analyzed) {
                Some(id) => {
                    let info = self.vars.get(id);
                    let constness = if info.is_constant && !*force_dynamic {
                        format!("[CONST: {}]", info.const_value)
                    } else {
                        "[NON-CONST]".to_string()
                    };
                    self.line(&format!(
                        "Expr: {} [{}], Type: {}, {}",
                        token.text_or_label(),
                        token.kind.label(),
                        info.data_type.label(),
                        constness
                    ));
                }
                None => {
                    self.line(&format!(
                        "Expr: {} [{}],",
                        token.text_or_label(),
                        token.kind.label()
                    ));
                }
            },

            NodeKind::BinaryOp { op, left, right } => {
                match node.info.filter(|_| node.analyzed) {
                    Some(id) => {
                        let info = self.vars.get(id);
                        let constness = if info.is_constant {
                            format!("[CONST: {}]", info.const_value)
                        } else {
                            "[NON-CONST]".to_string()
                        };
                        self.line(&format!(
                            "BinaryOp: {} [{}], Type: {}, {}",
                            op.text_or_label(),
                            op.kind.label(),
                            info.data_type.label(),
                            constness
                        ));
                    }
                    None => {
                        self.line(&format!(
                            "BinaryOp: {} [{}],",
                            op.text_or_label(),
                            op.kind.label()
                        ));
                    }
                }

                self.indent += 1;
                self.visit(left);
                self.visit(right);
                self.indent -= 1;
            }

            NodeKind::If {
                condition,
                then_branch,
                else_branch,
                const_condition,
            } => {
                self.line(&format!("IfStmt {}", Self::condition_tag(*const_condition)));

                self.indent += 1;
                self.visit(condition);
                self.visit(then_branch);
                self.indent -= 1;

                if let Some(else_branch) = else_branch {
                    self.line("else:");
                    self.indent += 1;
                    self.visit(else_branch);
                    self.indent -= 1;
                }
                self.out.push('\n');
            }

            NodeKind::While {
                condition,
                body,
                const_condition,
            } => {
                self.line(&format!(
                    "WhileLoop {}",
                    Self::condition_tag(*const_condition)
                ));

                self.indent += 1;
                self.visit(condition);
                self.visit(body);
                self.indent -= 1;
                self.out.push('\n');
            }

            NodeKind::Scope { statements } => {
                self.line("Scope {");
                self.indent += 1;
                for stmt in statements {
                    self.visit(stmt);
                }
                self.indent -= 1;
                self.line("}");
                self.out.push('\n');
            }
        }
    }
}
