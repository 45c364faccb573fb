//! Semantic analysis: annotates the tree in place.
//!
//! After a successful run every `Expr`, `BinaryOp` and `VarDecl` carries a
//! `VarId`, every node has `analyzed = true`, every identifier use has
//! resolved to a binding and flipped its `is_used`, and every `if`/`while`
//! knows whether its condition is a compile-time constant.

use crate::ast::{Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::options::Options;
use crate::scope::{ScopeArena, ScopeId};
use crate::token::TokenKind;
use crate::vars::{DataType, VarId, VarInfo, VarTable};

struct Analyzer<'a> {
    options: &'a Options,
    vars: VarTable,
    scopes: ScopeArena,
    current: ScopeId,
}

/// Analyzes the tree rooted at `root`, mutating it in place. Returns the
/// variable table the generator reads annotations from.
pub fn analyze(root: &mut Node, options: &Options) -> CompileResult<VarTable> {
    let scopes = ScopeArena::new();
    let current = scopes.root();
    let mut analyzer = Analyzer {
        options,
        vars: VarTable::new(),
        scopes,
        current,
    };

    // The root node is the implicit top-level scope; its statements run in
    // the arena's root rather than a pushed child.
    match &mut root.kind {
        NodeKind::Scope { statements } => {
            for stmt in statements {
                analyzer.analyze_node(stmt)?;
            }
        }
        _ => {
            return Err(CompileError::Semantic(
                "Expected top-level scope".to_string(),
            ))
        }
    }
    root.analyzed = true;

    Ok(analyzer.vars)
}

impl<'a> Analyzer<'a> {
    fn analyze_node(&mut self, node: &mut Node) -> CompileResult<Option<VarId>> {
        match &mut node.kind {
            NodeKind::Command { args, .. } => {
                for arg in args {
                    self.analyze_node(arg)?;
                }
            }
            NodeKind::VarDecl { .. } => {
                self.analyze_var_decl(node)?;
                return Ok(None);
            }
            NodeKind::Expr { .. } => return self.analyze_expr(node).map(Some),
            NodeKind::BinaryOp { .. } => return self.analyze_binary_op(node).map(Some),
            NodeKind::If { .. } => {
                self.analyze_if(node)?;
                return Ok(None);
            }
            NodeKind::While { .. } => {
                self.analyze_while(node)?;
                return Ok(None);
            }
            NodeKind::Scope { statements } => {
                let parent = self.current;
                self.current = self.scopes.push(parent);
                for stmt in statements {
                    self.analyze_node(stmt)?;
                }
                self.current = parent;
            }
        }

        node.analyzed = true;
        Ok(None)
    }

    fn analyze_var_decl(&mut self, node: &mut Node) -> CompileResult<()> {
        let (name, value) = match &mut node.kind {
            NodeKind::VarDecl { name, value } => (name.clone(), value),
            _ => unreachable!(),
        };

        let value_id = self.analyze_node(value)?.ok_or_else(|| {
            CompileError::Semantic("Declaration value produces no value".to_string())
        })?;

        let var_name = name.text.clone().unwrap_or_default();
        if var_name.is_empty() {
            return Err(CompileError::Semantic("Variable name is empty!".to_string()));
        }

        let value_info = self.vars.get(value_id);
        if value_info.data_type == DataType::Unknown {
            return Err(CompileError::Semantic(format!(
                "Could not infer type of variable {}",
                var_name
            )));
        }

        let mut info = VarInfo::unnamed(value_info.data_type);
        info.name = var_name.clone();
        info.is_initialized = true;
        info.is_constant = value_info.is_constant;
        if value_info.is_constant {
            info.const_value = value_info.const_value.clone();
        }

        // Redeclaration allocates a fresh record and rebinds the name, so
        // handles taken by earlier use sites keep the values they saw.
        let id = self.vars.alloc(info);
        let created = self.scopes.declare(self.current, &var_name, id);
        if !created {
            self.vars.get_mut(id).is_rebind = true;
        }

        node.info = Some(id);
        node.analyzed = true;
        Ok(())
    }

    fn analyze_expr(&mut self, node: &mut Node) -> CompileResult<VarId> {
        let (token, force_dynamic) = match &node.kind {
            NodeKind::Expr {
                token,
                force_dynamic,
            } => (token.clone(), *force_dynamic),
            _ => unreachable!(),
        };

        let id = match token.kind {
            TokenKind::Ident => {
                let name = token.text.as_deref().unwrap_or_default();
                let binding = self.scopes.lookup(self.current, name).ok_or_else(|| {
                    CompileError::Semantic(format!("Tried to use unassigned variable {}", name))
                })?;

                let info = self.vars.get_mut(binding);
                info.is_used = true;
                if force_dynamic {
                    // A dynamic use invalidates the binding's constness.
                    info.is_constant = false;
                    info.const_value.clear();
                }
                binding
            }

            TokenKind::IntLit => self.vars.alloc(VarInfo::constant(
                DataType::Int,
                token.text.clone().unwrap_or_default(),
            )),
            TokenKind::FloatLit => self.vars.alloc(VarInfo::constant(
                DataType::Float,
                token.text.clone().unwrap_or_default(),
            )),
            TokenKind::StringLit => self.vars.alloc(VarInfo::constant(
                DataType::String,
                token.text.clone().unwrap_or_default(),
            )),
            TokenKind::True => self.vars.alloc(VarInfo::constant(DataType::Bool, "1")),
            TokenKind::False => self.vars.alloc(VarInfo::constant(DataType::Bool, "0")),

            other => {
                return Err(CompileError::Semantic(format!(
                    "Got Expression node with unknown token type: {}",
                    other.label()
                )));
            }
        };

        node.info = Some(id);
        node.analyzed = true;
        Ok(id)
    }

    fn analyze_binary_op(&mut self, node: &mut Node) -> CompileResult<VarId> {
        let (op_kind, left_id, right_id) = match &mut node.kind {
            NodeKind::BinaryOp { op, left, right } => {
                let op_kind = op.kind;
                let left_id = self.analyze_node(left)?.ok_or_else(|| {
                    CompileError::Semantic("Failed to analyze binary operation".to_string())
                })?;
                let right_id = self.analyze_node(right)?.ok_or_else(|| {
                    CompileError::Semantic("Failed to analyze binary operation".to_string())
                })?;
                (op_kind, left_id, right_id)
            }
            _ => unreachable!(),
        };

        let left_info = self.vars.get(left_id);
        let right_info = self.vars.get(right_id);

        let data_type = infer_binary_op_type(op_kind, left_info.data_type, right_info.data_type);
        if data_type == DataType::Unknown {
            return Err(CompileError::Semantic(format!(
                "Not matching types in binary operation: {} and {}",
                left_info.data_type.label(),
                right_info.data_type.label()
            )));
        }

        let is_constant = left_info.is_constant && right_info.is_constant;
        let const_value = if is_constant && self.options.constant_folding {
            // Empty on an unfoldable pair (overflow, division by zero,
            // non-integer text): codegen then treats the node as dynamic.
            fold(op_kind, &left_info.const_value, &right_info.const_value).unwrap_or_default()
        } else {
            String::new()
        };

        let mut info = VarInfo::unnamed(data_type);
        info.is_constant = is_constant;
        info.const_value = const_value;

        let id = self.vars.alloc(info);
        node.info = Some(id);
        node.analyzed = true;
        Ok(id)
    }

    fn analyze_if(&mut self, node: &mut Node) -> CompileResult<()> {
        let verdict = match &mut node.kind {
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let cond_id = self.analyze_node(condition)?.ok_or_else(|| {
                    CompileError::Semantic("If condition produces no value".to_string())
                })?;
                self.analyze_node(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.analyze_node(else_branch)?;
                }
                self.const_condition(cond_id)
            }
            _ => unreachable!(),
        };

        if let NodeKind::If {
            const_condition, ..
        } = &mut node.kind
        {
            *const_condition = verdict;
        }
        node.analyzed = true;
        Ok(())
    }

    fn analyze_while(&mut self, node: &mut Node) -> CompileResult<()> {
        let verdict = match &mut node.kind {
            NodeKind::While {
                condition, body, ..
            } => {
                // Inside a loop even a variable bound to a literal must be
                // treated as mutable: a prior iteration may have assigned
                // it. Force-flag every identifier before analysis so both
                // the condition and the body see dynamic values.
                invalidate_identifiers(condition);
                invalidate_identifiers(body);

                let cond_id = self.analyze_node(condition)?.ok_or_else(|| {
                    CompileError::Semantic("While condition produces no value".to_string())
                })?;
                self.analyze_node(body)?;
                self.const_condition(cond_id)
            }
            _ => unreachable!(),
        };

        if let NodeKind::While {
            const_condition, ..
        } = &mut node.kind
        {
            *const_condition = verdict;
        }
        node.analyzed = true;
        Ok(())
    }

    /// Constant verdict for an `if`/`while` condition. Only meaningful when
    /// folding is on; a non-integer constant stays dynamic.
    fn const_condition(&self, cond_id: VarId) -> Option<bool> {
        if !self.options.constant_folding {
            return None;
        }
        let info = self.vars.get(cond_id);
        if !info.is_constant {
            return None;
        }
        info.const_value
            .parse::<i64>()
            .ok()
            .map(|value| value != 0)
    }
}

/// Marks every identifier reference in the subtree as force-dynamic.
fn invalidate_identifiers(node: &mut Node) {
    match &mut node.kind {
        NodeKind::Expr {
            token,
            force_dynamic,
        } => {
            if token.kind == TokenKind::Ident {
                *force_dynamic = true;
            }
        }
        NodeKind::Command { args, .. } => {
            for arg in args {
                invalidate_identifiers(arg);
            }
        }
        NodeKind::VarDecl { value, .. } => invalidate_identifiers(value),
        NodeKind::BinaryOp { left, right, .. } => {
            invalidate_identifiers(left);
            invalidate_identifiers(right);
        }
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            invalidate_identifiers(condition);
            invalidate_identifiers(then_branch);
            if let Some(else_branch) = else_branch {
                invalidate_identifiers(else_branch);
            }
        }
        NodeKind::While {
            condition, body, ..
        } => {
            invalidate_identifiers(condition);
            invalidate_identifiers(body);
        }
        NodeKind::Scope { statements } => {
            for stmt in statements {
                invalidate_identifiers(stmt);
            }
        }
    }
}

fn infer_binary_op_type(op: TokenKind, left: DataType, right: DataType) -> DataType {
    match op {
        TokenKind::Plus | TokenKind::Minus | TokenKind::Multiply | TokenKind::Divide => {
            if left == DataType::Int && right == DataType::Int {
                DataType::Int
            } else {
                DataType::Unknown
            }
        }
        op if op.is_comparison() => DataType::Bool,
        _ => DataType::Unknown,
    }
}

/// Evaluates a constant integer operation. `None` means "detected constant
/// but not foldable" (parse failure, overflow, division by zero).
fn fold(op: TokenKind, left: &str, right: &str) -> Option<String> {
    let a: i64 = left.parse().ok()?;
    let b: i64 = right.parse().ok()?;

    let bool01 = |v: bool| if v { "1".to_string() } else { "0".to_string() };
    match op {
        TokenKind::Plus => a.checked_add(b).map(|v| v.to_string()),
        TokenKind::Minus => a.checked_sub(b).map(|v| v.to_string()),
        TokenKind::Multiply => a.checked_mul(b).map(|v| v.to_string()),
        TokenKind::Divide => {
            if b == 0 {
                None
            } else {
                a.checked_div(b).map(|v| v.to_string())
            }
        }
        TokenKind::EqualsEquals => Some(bool01(a == b)),
        TokenKind::NotEquals => Some(bool01(a != b)),
        TokenKind::Less => Some(bool01(a < b)),
        TokenKind::Greater => Some(bool01(a > b)),
        TokenKind::LessEqual => Some(bool01(a <= b)),
        TokenKind::GreaterEqual => Some(bool01(a >= b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::registry::CommandRegistry;
    use serde_json::json;

    fn build(source: &str) -> Node {
        let doc = json!({ "children": { "say": { "required_level": 0 } } });
        let registry = CommandRegistry::from_value(&doc).unwrap();
        parse(lex(source, &registry).unwrap()).unwrap()
    }

    fn analyzed(source: &str, options: &Options) -> (Node, VarTable) {
        let mut root = build(source);
        let vars = analyze(&mut root, options).unwrap();
        (root, vars)
    }

    fn assert_fully_annotated(node: &Node, vars: &VarTable) {
        assert!(node.analyzed, "unanalyzed node: {:?}", node.kind);
        match &node.kind {
            NodeKind::Expr { .. } | NodeKind::BinaryOp { .. } | NodeKind::VarDecl { .. } => {
                let id = node.info.expect("value node without VarInfo");
                let _ = vars.get(id);
            }
            _ => {}
        }
        match &node.kind {
            NodeKind::Command { args, .. } => {
                args.iter().for_each(|a| assert_fully_annotated(a, vars))
            }
            NodeKind::VarDecl { value, .. } => assert_fully_annotated(value, vars),
            NodeKind::BinaryOp { left, right, .. } => {
                assert_fully_annotated(left, vars);
                assert_fully_annotated(right, vars);
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                assert_fully_annotated(condition, vars);
                assert_fully_annotated(then_branch, vars);
                if let Some(e) = else_branch {
                    assert_fully_annotated(e, vars);
                }
            }
            NodeKind::While { condition, body, .. } => {
                assert_fully_annotated(condition, vars);
                assert_fully_annotated(body, vars);
            }
            NodeKind::Scope { statements } => statements
                .iter()
                .for_each(|s| assert_fully_annotated(s, vars)),
            NodeKind::Expr { .. } => {}
        }
    }

    fn decl_info<'v>(node: &Node, vars: &'v VarTable, index: usize) -> &'v VarInfo {
        match &node.kind {
            NodeKind::Scope { statements } => vars.get(statements[index].info.unwrap()),
            _ => panic!("expected root scope"),
        }
    }

    #[test]
    fn annotates_every_node() {
        let source =
            "x = 1\ny = x + 2\nif (y > 1) { say y } else { say \"no\" }\nwhile (y < 5) { y = y + 1 }";
        let (root, vars) = analyzed(source, &Options::default());
        assert_fully_annotated(&root, &vars);
    }

    #[test]
    fn literal_types_and_const_values() {
        let source = "a = 1\nb = 1.5\nc = \"hi\"\nd = true\ne = false";
        let (root, vars) = analyzed(source, &Options::default());
        let expect = [
            (DataType::Int, "1"),
            (DataType::Float, "1.5"),
            (DataType::String, "hi"),
            (DataType::Bool, "1"),
            (DataType::Bool, "0"),
        ];
        for (i, (ty, value)) in expect.iter().enumerate() {
            let info = decl_info(&root, &vars, i);
            assert_eq!(info.data_type, *ty);
            assert!(info.is_constant);
            assert_eq!(info.const_value, *value);
        }
    }

    #[test]
    fn folding_evaluates_constant_arithmetic() {
        let (root, vars) = analyzed("x = 1 + 2 * 3", &Options::default());
        let info = decl_info(&root, &vars, 0);
        assert!(info.is_constant);
        assert_eq!(info.const_value, "7");
    }

    #[test]
    fn folding_evaluates_comparisons() {
        let (root, vars) = analyzed("x = 1 < 2", &Options::default());
        let info = decl_info(&root, &vars, 0);
        assert_eq!(info.data_type, DataType::Bool);
        assert_eq!(info.const_value, "1");
    }

    #[test]
    fn unary_minus_on_literal_is_constant() {
        let (root, vars) = analyzed("x = -5", &Options::default());
        let info = decl_info(&root, &vars, 0);
        assert!(info.is_constant);
        assert_eq!(info.const_value, "-5");
    }

    #[test]
    fn disabled_folding_marks_but_does_not_evaluate() {
        let opts = Options {
            constant_folding: false,
            ..Options::default()
        };
        let (root, vars) = analyzed("x = 1 + 2", &opts);
        let info = decl_info(&root, &vars, 0);
        assert!(info.is_constant);
        assert_eq!(info.const_value, "");
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let (root, vars) = analyzed("x = 1 / 0", &Options::default());
        let info = decl_info(&root, &vars, 0);
        assert!(info.is_constant);
        assert_eq!(info.const_value, "");
    }

    #[test]
    fn use_flips_is_used_on_binding() {
        let (root, vars) = analyzed("x = 1\nsay x", &Options::default());
        assert!(decl_info(&root, &vars, 0).is_used);
    }

    #[test]
    fn unused_binding_stays_unused() {
        let (root, vars) = analyzed("x = 1", &Options::default());
        assert!(!decl_info(&root, &vars, 0).is_used);
    }

    #[test]
    fn undefined_variable_is_fatal() {
        let mut root = build("say x");
        assert!(analyze(&mut root, &Options::default()).is_err());
    }

    #[test]
    fn arithmetic_type_mismatch_is_fatal() {
        for source in ["x = 1 + \"a\"", "x = 1.5 + 1", "x = true + 1"] {
            let mut root = build(source);
            assert!(
                analyze(&mut root, &Options::default()).is_err(),
                "{}",
                source
            );
        }
    }

    #[test]
    fn comparisons_yield_bool() {
        let (root, vars) = analyzed("x = 1\ny = x == 2", &Options::default());
        assert_eq!(decl_info(&root, &vars, 1).data_type, DataType::Bool);
    }

    #[test]
    fn redeclaration_keeps_earlier_handles_intact() {
        let (root, vars) = analyzed("x = 1\nsay x\nx = 2", &Options::default());
        let (first, second) = match &root.kind {
            NodeKind::Scope { statements } => {
                (statements[0].info.unwrap(), statements[2].info.unwrap())
            }
            _ => panic!("expected root scope"),
        };
        assert_ne!(first, second);
        assert_eq!(vars.get(first).const_value, "1");
        assert_eq!(vars.get(second).const_value, "2");
        assert!(vars.get(first).is_used);
        assert!(!vars.get(second).is_used);
    }

    #[test]
    fn loop_uses_are_forced_dynamic_and_invalidate_bindings() {
        let (root, vars) = analyzed("i = 0\nwhile (i < 10) { i = i + 1 }", &Options::default());
        let statements = match &root.kind {
            NodeKind::Scope { statements } => statements,
            _ => panic!("expected root scope"),
        };

        // The binding of the initial declaration lost its constness.
        assert!(!vars.get(statements[0].info.unwrap()).is_constant);

        match &statements[1].kind {
            NodeKind::While {
                condition,
                const_condition,
                ..
            } => {
                assert_eq!(*const_condition, None);
                match &condition.kind {
                    NodeKind::BinaryOp { left, .. } => match &left.kind {
                        NodeKind::Expr { force_dynamic, .. } => assert!(force_dynamic),
                        other => panic!("expected identifier, got {:?}", other),
                    },
                    other => panic!("expected comparison, got {:?}", other),
                }
            }
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn constant_conditions_are_detected() {
        let (root, _) = analyzed(
            "if (true) { say \"y\" }\nwhile (false) { say \"n\" }",
            &Options::default(),
        );
        let statements = match &root.kind {
            NodeKind::Scope { statements } => statements,
            _ => panic!("expected root scope"),
        };
        match &statements[0].kind {
            NodeKind::If {
                const_condition, ..
            } => assert_eq!(*const_condition, Some(true)),
            other => panic!("expected if, got {:?}", other),
        }
        match &statements[1].kind {
            NodeKind::While {
                const_condition, ..
            } => assert_eq!(*const_condition, Some(false)),
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn conditions_stay_dynamic_without_folding() {
        let opts = Options {
            constant_folding: false,
            ..Options::default()
        };
        let (root, _) = analyzed("while (false) { say \"n\" }", &opts);
        match &root.kind {
            NodeKind::Scope { statements } => match &statements[0].kind {
                NodeKind::While {
                    const_condition, ..
                } => assert_eq!(*const_condition, None),
                other => panic!("expected while, got {:?}", other),
            },
            _ => panic!("expected root scope"),
        }
    }

    #[test]
    fn inner_scope_declarations_resolve_and_scope() {
        // Inner redeclaration of an outer name rebinds the outer slot; a
        // brand-new name stays local to the block.
        let (_, _) = analyzed("x = 1\n{ x = 2\n j = x }\nsay x", &Options::default());
        let mut root = build("{ j = 1 }\nsay j");
        assert!(analyze(&mut root, &Options::default()).is_err());
    }
}
