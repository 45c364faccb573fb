//! Code generation: lowers the annotated tree to datapack function files.
//!
//! Every scope entry opens a buffered function file named `scope_K.func`;
//! branch and loop bodies become separately callable functions so they can
//! be dispatched by reference. Arithmetic and comparisons lower to
//! scoreboard operations, staged through `%N` temporaries in the enclosing
//! scope's objective. The root file is prepended with the objective
//! preamble when the root scope exits.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::ast::{Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::options::Options;
use crate::output;
use crate::token::{Token, TokenKind};
use crate::vars::{VarStorage, VarTable};

/// A value staged in a scoreboard slot.
#[derive(Debug, Clone)]
struct Score {
    holder: String,
    objective: String,
}

struct EmitScope {
    name: String,
    path: PathBuf,
    output: String,
}

struct Generator<'a> {
    out_dir: PathBuf,
    options: &'a Options,
    vars: &'a mut VarTable,
    scopes: Vec<EmitScope>,
    scopes_total: usize,
    temp_count: usize,
    /// Objective of the scope where each named variable was first declared.
    var_objectives: HashMap<String, String>,
    /// Every objective referenced anywhere, for the preamble.
    objectives: BTreeSet<String>,
}

/// Generates function files for the analyzed tree into `out_dir`.
pub fn generate(
    root: &Node,
    out_dir: &Path,
    options: &Options,
    vars: &mut VarTable,
) -> CompileResult<()> {
    output::prepare_dir(out_dir)?;

    let mut generator = Generator {
        out_dir: out_dir.to_path_buf(),
        options,
        vars,
        scopes: Vec::new(),
        scopes_total: 0,
        temp_count: 0,
        var_objectives: HashMap::new(),
        objectives: BTreeSet::new(),
    };

    generator.enter_scope();
    match &root.kind {
        NodeKind::Scope { statements } => {
            for stmt in statements {
                generator.gen_statement(stmt)?;
            }
        }
        _ => {
            return Err(CompileError::Codegen(
                "Expected top-level scope".to_string(),
            ))
        }
    }
    generator.exit_scope()
}

impl<'a> Generator<'a> {
    // ===== Scope and buffer management =====

    fn enter_scope(&mut self) {
        let name = format!("scope_{}", self.scopes_total);
        self.scopes_total += 1;
        let path = self.out_dir.join(format!("{}.func", name));
        self.scopes.push(EmitScope {
            name,
            path,
            output: String::new(),
        });
    }

    /// Writes the buffered scope to disk. The root scope exits last and
    /// carries the preamble declaring every referenced objective.
    fn exit_scope(&mut self) -> CompileResult<()> {
        let is_root = self.scopes.len() == 1;
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CompileError::Codegen("Scope stack underflow".to_string()))?;

        let contents = if is_root {
            let mut header = String::new();
            for objective in &self.objectives {
                header.push_str(&format!("scoreboard objectives add {} dummy\n", objective));
            }
            header + &scope.output
        } else {
            scope.output
        };

        output::write_text(&scope.path, &contents)
    }

    fn current_scope(&self) -> &EmitScope {
        self.scopes.last().expect("emission outside any scope")
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        let scope = self.scopes.last_mut().expect("emission outside any scope");
        scope.output.push_str(line.as_ref());
        scope.output.push('\n');
    }

    fn current_objective(&self) -> String {
        format!(
            "{}_sb_{}",
            self.options.dp_prefix,
            self.current_scope().name
        )
    }

    /// Current scope's objective, recorded for the preamble.
    fn scoped_objective(&mut self) -> String {
        let objective = self.current_objective();
        self.objectives.insert(objective.clone());
        objective
    }

    /// Objective a named variable lives in: the scope of its first
    /// declaration, so redeclarations keep writing the same slot.
    fn objective_for_var(&mut self, name: &str) -> String {
        let objective = match self.var_objectives.get(name) {
            Some(objective) => objective.clone(),
            None => {
                let objective = self.current_objective();
                self.var_objectives
                    .insert(name.to_string(), objective.clone());
                objective
            }
        };
        self.objectives.insert(objective.clone());
        objective
    }

    fn alloc_temp(&mut self) -> String {
        let temp = format!("%{}", self.temp_count);
        self.temp_count += 1;
        temp
    }

    fn func_ref(&self, scope_name: &str) -> String {
        format!(
            "{}:{}{}",
            self.options.dp_prefix, self.options.dp_path, scope_name
        )
    }

    fn warn(&self, message: &str) {
        if !self.options.silent {
            println!("Warning: {}", message);
        }
    }

    // ===== Constant views =====

    /// Textual constant value of a node, when codegen may inline it.
    /// Literals always inline; identifier bindings only when folding is on
    /// and the use is not forced dynamic; folded binary ops carry their
    /// value, unfolded ones an empty string (treated as dynamic).
    fn const_text(&self, node: &Node) -> Option<String> {
        let info = self.vars.get(node.info?);
        match &node.kind {
            NodeKind::Expr {
                token,
                force_dynamic,
            } => {
                if token.kind == TokenKind::Ident
                    && (*force_dynamic || !self.options.constant_folding)
                {
                    return None;
                }
                (info.is_constant && !info.const_value.is_empty())
                    .then(|| info.const_value.clone())
            }
            NodeKind::BinaryOp { .. } => (info.is_constant && !info.const_value.is_empty())
                .then(|| info.const_value.clone()),
            _ => None,
        }
    }

    // ===== Statements =====

    fn gen_statement(&mut self, node: &Node) -> CompileResult<()> {
        match &node.kind {
            NodeKind::Command { keyword, args } => self.gen_command(keyword, args),
            NodeKind::VarDecl { name, value } => self.gen_var_decl(node, name, value),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
                const_condition,
            } => self.gen_if(condition, then_branch, else_branch.as_deref(), *const_condition),
            NodeKind::While {
                condition,
                body,
                const_condition,
            } => self.gen_while(condition, body, *const_condition),
            NodeKind::Scope { statements } => {
                self.enter_scope();
                for stmt in statements {
                    self.gen_statement(stmt)?;
                }
                self.exit_scope()
            }
            NodeKind::Expr { .. } | NodeKind::BinaryOp { .. } => Err(CompileError::Codegen(
                "Expression is not a statement".to_string(),
            )),
        }
    }

    fn gen_var_decl(&mut self, node: &Node, name: &Token, value: &Node) -> CompileResult<()> {
        let id = node.info.ok_or_else(|| {
            CompileError::Codegen("Declaration reached the generator without analysis".to_string())
        })?;

        {
            let info = self.vars.get(id);
            if self.options.remove_unused_vars && !info.is_used && !info.is_rebind {
                return Ok(());
            }
            if self.options.constant_folding && info.is_constant && !info.const_value.is_empty() {
                // Every use site inlines the literal.
                return Ok(());
            }
        }

        let var_name = name.text.clone().unwrap_or_default();
        let objective = self.objective_for_var(&var_name);

        if let Some(value_text) = self.const_text(value) {
            self.emit(format!(
                "scoreboard players set {} {} {}",
                var_name, objective, value_text
            ));
        } else {
            let value_score = self.gen_expr(value)?;
            self.emit(format!(
                "scoreboard players operation {} {} = {} {}",
                var_name, objective, value_score.holder, value_score.objective
            ));
        }

        let info = self.vars.get_mut(id);
        info.storage_type = VarStorage::Scoreboard;
        info.storage_ident = objective;
        info.storage_path = var_name;
        Ok(())
    }

    /// Only `say` lowers: its arguments become a `tellraw` component array.
    fn gen_command(&mut self, keyword: &Token, args: &[Node]) -> CompileResult<()> {
        let key = keyword.text.as_deref().unwrap_or_default();
        if key != "say" {
            return Err(CompileError::Codegen(format!(
                "Unsupported command keyword '{}'",
                key
            )));
        }

        let mut components = Vec::new();
        for arg in args {
            if let NodeKind::Expr { token, .. } = &arg.kind {
                if token.kind == TokenKind::StringLit {
                    let text = token.text.clone().unwrap_or_default();
                    components.push(json!({ "text": text }).to_string());
                    continue;
                }
            }

            if let Some(value) = self.const_text(arg) {
                components.push(json!({ "text": value }).to_string());
                continue;
            }

            let score = self.gen_expr(arg)?;
            components.push(
                json!({ "score": { "name": score.holder, "objective": score.objective } })
                    .to_string(),
            );
        }

        let list: String = components.iter().map(|c| format!("{},", c)).collect();
        self.emit(format!("tellraw @a [{}]", list));
        Ok(())
    }

    // ===== Control flow =====

    /// Branch and loop bodies that are brace scopes flatten into the
    /// function file being built instead of opening another one.
    fn gen_branch_body(&mut self, body: &Node) -> CompileResult<()> {
        match &body.kind {
            NodeKind::Scope { statements } => {
                for stmt in statements {
                    self.gen_statement(stmt)?;
                }
                Ok(())
            }
            _ => self.gen_statement(body),
        }
    }

    fn gen_if(
        &mut self,
        condition: &Node,
        then_branch: &Node,
        else_branch: Option<&Node>,
        const_condition: Option<bool>,
    ) -> CompileResult<()> {
        match const_condition {
            Some(true) => self.gen_branch_body(then_branch),
            Some(false) => match else_branch {
                Some(else_branch) => self.gen_branch_body(else_branch),
                None => Ok(()),
            },
            None => match else_branch {
                None => self.gen_dynamic_if(condition, then_branch),
                Some(else_branch) => self.gen_dynamic_if_else(condition, then_branch, else_branch),
            },
        }
    }

    fn gen_dynamic_if(&mut self, condition: &Node, then_branch: &Node) -> CompileResult<()> {
        self.enter_scope();
        let then_name = self.current_scope().name.clone();
        self.emit("# Then Body");
        self.gen_branch_body(then_branch)?;
        self.exit_scope()?;

        self.emit("# Check condition to enter the 'then' function");
        let cond = self.to_score(condition)?;
        let then_ref = self.func_ref(&then_name);
        self.emit(format!(
            "execute if score {} {} matches 1 run function {}",
            cond.holder, cond.objective, then_ref
        ));
        Ok(())
    }

    /// The `then` function re-checks the condition and returns 1 exactly
    /// when it was false at entry; the caller chains the `else` function
    /// off that success value in a single dispatch.
    fn gen_dynamic_if_else(
        &mut self,
        condition: &Node,
        then_branch: &Node,
        else_branch: &Node,
    ) -> CompileResult<()> {
        self.enter_scope();
        let then_name = self.current_scope().name.clone();
        let cond = self.to_score(condition)?;
        self.emit("# Then Body");
        self.emit(format!(
            "execute unless score {} {} matches 1 run return 1",
            cond.holder, cond.objective
        ));
        self.gen_branch_body(then_branch)?;
        self.exit_scope()?;

        self.enter_scope();
        let else_name = self.current_scope().name.clone();
        self.emit("# Else Body");
        self.gen_branch_body(else_branch)?;
        self.exit_scope()?;

        self.emit("# Check condition 'if'");
        let then_ref = self.func_ref(&then_name);
        let else_ref = self.func_ref(&else_name);
        self.emit(format!(
            "execute if function {} run function {}",
            then_ref, else_ref
        ));
        Ok(())
    }

    fn gen_while(
        &mut self,
        condition: &Node,
        body: &Node,
        const_condition: Option<bool>,
    ) -> CompileResult<()> {
        match const_condition {
            // The loop is dead: nothing reaches it.
            Some(false) => Ok(()),

            Some(true) => {
                self.enter_scope();
                let name = self.current_scope().name.clone();
                self.emit("# Loop Body");
                self.gen_branch_body(body)?;
                let self_ref = self.func_ref(&name);
                self.emit(format!("function {}", self_ref));
                self.exit_scope()?;

                let entry_ref = self.func_ref(&name);
                self.emit(format!("function {}", entry_ref));
                Ok(())
            }

            None => {
                self.enter_scope();
                let name = self.current_scope().name.clone();
                self.emit("# Loop Body");
                self.gen_branch_body(body)?;

                self.emit("# Recheck condition at the end of the loop");
                let recheck = self.to_score(condition)?;
                let self_ref = self.func_ref(&name);
                self.emit(format!(
                    "execute if score {} {} matches 1 run function {}",
                    recheck.holder, recheck.objective, self_ref
                ));
                self.exit_scope()?;

                self.emit("# Check condition to enter the loop");
                let entry = self.to_score(condition)?;
                let entry_ref = self.func_ref(&name);
                self.emit(format!(
                    "execute if score {} {} matches 1 run function {}",
                    entry.holder, entry.objective, entry_ref
                ));
                Ok(())
            }
        }
    }

    // ===== Expressions =====

    /// Stages a constant into a fresh temporary.
    fn stage_constant(&mut self, value: &str) -> Score {
        let objective = self.scoped_objective();
        let temp = self.alloc_temp();
        self.emit(format!(
            "scoreboard players set {} {} {}",
            temp, objective, value
        ));
        Score {
            holder: temp,
            objective,
        }
    }

    /// A score slot holding the node's value, staging constants as needed.
    fn to_score(&mut self, node: &Node) -> CompileResult<Score> {
        match self.const_text(node) {
            Some(value) => Ok(self.stage_constant(&value)),
            None => self.gen_expr(node),
        }
    }

    /// Emits the dynamic evaluation of a value-producing node.
    fn gen_expr(&mut self, node: &Node) -> CompileResult<Score> {
        match &node.kind {
            NodeKind::Expr { token, .. } => match token.kind {
                TokenKind::Ident => {
                    let name = token.text.clone().unwrap_or_default();
                    let objective = self.objective_for_var(&name);
                    Ok(Score {
                        holder: name,
                        objective,
                    })
                }
                _ => {
                    let id = node.info.ok_or_else(|| {
                        CompileError::Codegen(
                            "Expression reached the generator without analysis".to_string(),
                        )
                    })?;
                    let value = self.vars.get(id).const_value.clone();
                    Ok(self.stage_constant(&value))
                }
            },
            NodeKind::BinaryOp { op, left, right } => self.gen_binary_op(op, left, right),
            _ => Err(CompileError::Codegen(
                "Cannot generate a value from this statement".to_string(),
            )),
        }
    }

    fn gen_binary_op(&mut self, op: &Token, left: &Node, right: &Node) -> CompileResult<Score> {
        if op.kind.is_comparison() {
            return self.gen_comparison(op, left, right);
        }

        match op.kind {
            TokenKind::Plus | TokenKind::Minus => {
                let opcode = if op.kind == TokenKind::Plus {
                    "add"
                } else {
                    "remove"
                };
                let left_const = self.const_text(left);
                let right_const = self.const_text(right);

                match (left_const, right_const) {
                    // Unreachable when folding is enabled; the analyzer
                    // fuses these.
                    (Some(l), Some(r)) => {
                        self.warn(&format!(
                            "arithmetic on two constants ({} {} {}) reached the generator",
                            l,
                            op.text_or_label(),
                            r
                        ));
                        let objective = self.scoped_objective();
                        let temp = self.alloc_temp();
                        self.emit(format!(
                            "scoreboard players set {} {} {}",
                            temp, objective, l
                        ));
                        self.emit(format!(
                            "scoreboard players {} {} {} {}",
                            opcode, temp, objective, r
                        ));
                        Ok(Score {
                            holder: temp,
                            objective,
                        })
                    }

                    (None, Some(r)) => {
                        let left_score = self.gen_expr(left)?;
                        let objective = self.scoped_objective();
                        let temp = self.alloc_temp();
                        self.emit(format!(
                            "scoreboard players operation {} {} = {} {}",
                            temp, objective, left_score.holder, left_score.objective
                        ));
                        self.emit(format!(
                            "scoreboard players {} {} {} {}",
                            opcode, temp, objective, r
                        ));
                        Ok(Score {
                            holder: temp,
                            objective,
                        })
                    }

                    // Addition commutes, so load the dynamic side first.
                    (Some(l), None) if op.kind == TokenKind::Plus => {
                        let right_score = self.gen_expr(right)?;
                        let objective = self.scoped_objective();
                        let temp = self.alloc_temp();
                        self.emit(format!(
                            "scoreboard players operation {} {} = {} {}",
                            temp, objective, right_score.holder, right_score.objective
                        ));
                        self.emit(format!(
                            "scoreboard players add {} {} {}",
                            temp, objective, l
                        ));
                        Ok(Score {
                            holder: temp,
                            objective,
                        })
                    }

                    // Subtraction does not: set the constant, subtract the
                    // dynamic side.
                    (Some(l), None) => {
                        let right_score = self.gen_expr(right)?;
                        let objective = self.scoped_objective();
                        let temp = self.alloc_temp();
                        self.emit(format!(
                            "scoreboard players set {} {} {}",
                            temp, objective, l
                        ));
                        self.emit(format!(
                            "scoreboard players operation {} {} -= {} {}",
                            temp, objective, right_score.holder, right_score.objective
                        ));
                        Ok(Score {
                            holder: temp,
                            objective,
                        })
                    }

                    (None, None) => self.gen_operation(op, left, right),
                }
            }

            TokenKind::Multiply | TokenKind::Divide => self.gen_operation(op, left, right),

            _ => Err(CompileError::Codegen(
                "Unknown token type in binary operator".to_string(),
            )),
        }
    }

    /// Generic `scoreboard players operation` lowering.
    fn gen_operation(&mut self, op: &Token, left: &Node, right: &Node) -> CompileResult<Score> {
        let left_score = self.to_score(left)?;
        let right_score = self.to_score(right)?;

        let opcode = match op.kind {
            TokenKind::Plus => "+=",
            TokenKind::Minus => "-=",
            TokenKind::Multiply => "*=",
            TokenKind::Divide => "/=",
            _ => {
                return Err(CompileError::Codegen(
                    "Unknown token type in binary operator".to_string(),
                ))
            }
        };

        let objective = self.scoped_objective();
        let temp = self.alloc_temp();
        self.emit(format!(
            "scoreboard players operation {} {} = {} {}",
            temp, objective, left_score.holder, left_score.objective
        ));
        self.emit(format!(
            "scoreboard players operation {} {} {} {} {}",
            temp, objective, opcode, right_score.holder, right_score.objective
        ));
        Ok(Score {
            holder: temp,
            objective,
        })
    }

    fn gen_comparison(&mut self, op: &Token, left: &Node, right: &Node) -> CompileResult<Score> {
        let right_const = self
            .const_text(right)
            .and_then(|v| v.parse::<i64>().ok());
        if let Some(n) = right_const {
            if let Some(range) = match_range(op.kind, n) {
                let left_score = self.to_score(left)?;
                return Ok(self.emit_match(op.kind, &left_score, &range));
            }
        }

        let left_const = self.const_text(left).and_then(|v| v.parse::<i64>().ok());
        if let Some(n) = left_const {
            if let Some(range) = match_range(flip_comparison(op.kind), n) {
                let right_score = self.to_score(right)?;
                return Ok(self.emit_match(op.kind, &right_score, &range));
            }
        }

        // Both sides dynamic (or constants the range form cannot express):
        // the general score-to-score predicate.
        let left_score = self.to_score(left)?;
        let right_score = self.to_score(right)?;
        let objective = self.scoped_objective();
        let temp = self.alloc_temp();

        match op.kind {
            TokenKind::NotEquals => {
                self.emit(format!(
                    "execute store success score {} {} run execute unless score {} {} = {} {}",
                    temp,
                    objective,
                    left_score.holder,
                    left_score.objective,
                    right_score.holder,
                    right_score.objective
                ));
            }
            _ => {
                let comparator = match op.kind {
                    TokenKind::EqualsEquals => "=",
                    TokenKind::Less => "<",
                    TokenKind::Greater => ">",
                    TokenKind::LessEqual => "<=",
                    TokenKind::GreaterEqual => ">=",
                    _ => {
                        return Err(CompileError::Codegen(
                            "Unknown token type in comparison".to_string(),
                        ))
                    }
                };
                self.emit(format!(
                    "execute store success score {} {} run execute if score {} {} {} {} {}",
                    temp,
                    objective,
                    left_score.holder,
                    left_score.objective,
                    comparator,
                    right_score.holder,
                    right_score.objective
                ));
            }
        }

        Ok(Score {
            holder: temp,
            objective,
        })
    }

    /// Range-match form of a comparison against a constant.
    fn emit_match(&mut self, op: TokenKind, score: &Score, range: &str) -> Score {
        let check = if op == TokenKind::NotEquals {
            "unless"
        } else {
            "if"
        };
        let objective = self.scoped_objective();
        let temp = self.alloc_temp();
        self.emit(format!(
            "execute store success score {} {} run execute {} score {} {} matches {}",
            temp, objective, check, score.holder, score.objective, range
        ));
        Score {
            holder: temp,
            objective,
        }
    }
}

/// Range expression for `<dynamic> OP <constant n>`. `None` when the bound
/// would overflow; the caller falls back to the general form.
fn match_range(op: TokenKind, n: i64) -> Option<String> {
    match op {
        TokenKind::EqualsEquals | TokenKind::NotEquals => Some(n.to_string()),
        TokenKind::Greater => n.checked_add(1).map(|b| format!("{}..", b)),
        TokenKind::GreaterEqual => Some(format!("{}..", n)),
        TokenKind::Less => n.checked_sub(1).map(|b| format!("..{}", b)),
        TokenKind::LessEqual => Some(format!("..{}", n)),
        _ => None,
    }
}

/// `n OP x` reads as `x FLIP(OP) n` once the constant moves right.
fn flip_comparison(op: TokenKind) -> TokenKind {
    match op {
        TokenKind::Less => TokenKind::Greater,
        TokenKind::Greater => TokenKind::Less,
        TokenKind::LessEqual => TokenKind::GreaterEqual,
        TokenKind::GreaterEqual => TokenKind::LessEqual,
        other => other,
    }
}
