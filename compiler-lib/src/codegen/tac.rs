//! The three-address generator: one instance per method body.
//!
//! Expressions are flattened into temporaries (`$_t_0`, `$_t_1`, …) and
//! control flow is linearized into labels and `goto`s. The generator also
//! tracks local variable types (to tell locals from fields during chain
//! lowering), the loop label stack for `break`/`continue`, and every class
//! type referenced by the emitted code so the surrounding translation unit
//! can pull in the matching headers.

use super::{c_type, field_c_type, CodegenError, CodegenResult};
use crate::{
    ast::{AstKind, AstNode, Class, CodeBlock, NodeKind, Project},
    lexer::Operator,
    strtab::{StringTable, Symbol},
    symtab::ClassTables,
};
use std::collections::{BTreeSet, HashMap};

/// Negates a lowered boolean condition, short-circuiting the literals.
pub(super) fn not_condition(condition: &str) -> String {
    match condition {
        "true" => "false".to_string(),
        "false" => "true".to_string(),
        _ => format!("!({})", condition),
    }
}

pub struct TacGenerator<'f, 'g> {
    temp_count: usize,
    label_count: usize,
    pub(super) project: &'g Project<'f>,
    pub(super) tables: &'g ClassTables<'f>,
    pub(super) class: &'g Class<'f>,
    strtab: &'g StringTable<'f>,
    code: String,
    types_used: &'g mut BTreeSet<Symbol<'f>>,
    depth: i32,
    block_freeze: bool,
    locals: Vec<HashMap<Symbol<'f>, Symbol<'f>>>,
    /// `(continue target, break target)` per enclosing loop.
    label_stack: Vec<(String, String)>,
}

impl<'f, 'g> TacGenerator<'f, 'g> {
    pub fn new(
        project: &'g Project<'f>,
        tables: &'g ClassTables<'f>,
        class: &'g Class<'f>,
        strtab: &'g StringTable<'f>,
        types_used: &'g mut BTreeSet<Symbol<'f>>,
    ) -> Self {
        TacGenerator {
            temp_count: 0,
            label_count: 0,
            project,
            tables,
            class,
            strtab,
            code: String::new(),
            types_used,
            depth: -1,
            block_freeze: false,
            locals: Vec::new(),
            label_stack: Vec::new(),
        }
    }

    pub fn into_code(self) -> String {
        self.code
    }

    pub(super) fn intern_lexeme(&self, lexeme: &'f str) -> Symbol<'f> {
        self.strtab.intern(lexeme)
    }

    pub(super) fn new_temp(&mut self) -> String {
        let name = format!("$_t_{}", self.temp_count);
        self.temp_count += 1;
        name
    }

    fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.label_count);
        self.label_count += 1;
        label
    }

    /// Opens a scope block. The method-level block stays brace-less; nested
    /// blocks emit `{`.
    pub fn open_block(&mut self) {
        if self.block_freeze {
            return;
        }
        if self.depth >= 1 {
            self.emit("{");
        }
        self.depth += 1;
        self.locals.push(HashMap::new());
    }

    pub fn close_block(&mut self) {
        if self.block_freeze {
            return;
        }
        self.depth -= 1;
        if self.depth >= 1 {
            self.emit("}");
        }
        self.locals.pop();
    }

    /// Controls block creation while a `for` initializer is generated: its
    /// declarations live in the loop's surrounding block, not a nested one.
    fn freeze(&mut self, freeze: bool) {
        self.block_freeze = freeze;
    }

    fn push_label(&mut self, start: String, end: String) {
        self.label_stack.push((start, end));
    }

    fn pop_label(&mut self) {
        self.label_stack.pop();
    }

    fn break_now(&mut self) -> CodegenResult<()> {
        let target = match self.label_stack.last() {
            Some((_, end)) => end.clone(),
            None => return Err(CodegenError::BreakOutsideLoop),
        };
        self.emit(&format!("goto {}", target));
        Ok(())
    }

    fn continue_now(&mut self) -> CodegenResult<()> {
        let target = match self.label_stack.last() {
            Some((start, _)) => start.clone(),
            None => return Err(CodegenError::ContinueOutsideLoop),
        };
        self.emit(&format!("goto {}", target));
        Ok(())
    }

    /// Emits one line at the current indentation. Single-character lines are
    /// the block braces, which take no trailing `;`.
    pub(super) fn emit(&mut self, line: &str) {
        let indent = "\t".repeat(self.depth.max(0) as usize);
        let terminator = if line.len() > 1 { ";\n" } else { "\n" };
        self.code.push_str(&indent);
        self.code.push_str(line);
        self.code.push_str(terminator);
    }

    fn emit_label(&mut self, label: &str) {
        let indent = "\t".repeat(self.depth.max(0) as usize);
        self.code.push_str(&indent);
        self.code.push_str(label);
        self.code.push_str(":;\n");
    }

    fn new_line(&mut self) {
        self.code.push('\n');
    }

    /// Registers a local in the method-level frame and records its type for
    /// header dependency tracking.
    pub fn add_variable(&mut self, name: Symbol<'f>, ty: Symbol<'f>) {
        self.locals
            .first_mut()
            .expect("a block is open while variables are declared")
            .insert(name, ty);
        self.types_used.insert(ty);
    }

    pub(super) fn record_new_object(&mut self, ty: Symbol<'f>) {
        self.types_used.insert(ty);
    }

    /// Looks a name up in the local frames; `None` means "not a local",
    /// i.e. the name must be a field (or unresolvable).
    pub(super) fn lookup(&self, name: Symbol<'f>) -> Option<Symbol<'f>> {
        for frame in &self.locals {
            if let Some(ty) = frame.get(&name) {
                return Some(*ty);
            }
        }
        None
    }

    /// Counts the inheritance hops from the current class to the class
    /// declaring `name`; 1 means the current class itself. Returns the
    /// field's declared type alongside, or `(0, None)` when no class in the
    /// chain declares the field.
    pub(super) fn lookup_class_nested_count(
        &self,
        name: Symbol<'f>,
    ) -> (usize, Option<Symbol<'f>>) {
        let mut class = self.class;
        let mut hops = 1;
        loop {
            if let Some(field) = class.field(name) {
                return (hops, Some(field.type_lexeme));
            }
            match class.extends.and_then(|extends| self.project.class(extends)) {
                Some(parent) => {
                    class = parent;
                    hops += 1;
                }
                None => return (0, None),
            }
        }
    }

    // ------------------------------------------------------------------
    // statement and expression lowering

    /// Lowers a block: scope, statements, and a blank separator line after
    /// everything but declarations and assignments.
    pub fn gen_block(&mut self, block: &CodeBlock<'f>) -> CodegenResult<String> {
        self.open_block();
        let count = block.statements.len();
        for (index, statement) in block.statements.iter().enumerate() {
            self.gen_node(statement)?;

            if index != count - 1
                && statement.ast_kind() != AstKind::LocalVariableDecl
                && statement.ast_kind() != AstKind::Assignment
            {
                self.new_line();
            }
        }
        self.close_block();
        Ok(String::new())
    }

    /// Lowers one node; for expressions the returned string names the C
    /// expression holding the value (usually a fresh temporary).
    pub fn gen_node(&mut self, node: &AstNode<'f>) -> CodegenResult<String> {
        match &node.kind {
            NodeKind::Block(block) => self.gen_block(block),

            NodeKind::NumberLiteral(literal) => Ok(lower_number_literal(literal)),
            NodeKind::BooleanLiteral(value) => {
                Ok(if *value { "true" } else { "false" }.to_string())
            }

            NodeKind::BinaryExpression { op, left, right } => {
                let left = self.gen_node(left)?;
                let right = self.gen_node(right)?;
                let result = self.new_temp();
                let ty = c_type(node.ty.resolved());
                if *op == Operator::TripleRightChevron {
                    self.emit(&format!(
                        "{}{} = (int) ((unsigned int) ({}) >> {})",
                        ty, result, left, right
                    ));
                } else {
                    self.emit(&format!("{}{} = {} {} {}", ty, result, left, op, right));
                }
                Ok(result)
            }

            NodeKind::NotExpression { op, operand } => {
                let operand = self.gen_node(operand)?;
                let result = self.new_temp();
                self.emit(&format!(
                    "{}{} = {}{}",
                    c_type(node.ty.resolved()),
                    result,
                    op,
                    operand
                ));
                Ok(result)
            }

            NodeKind::CastExpression { operand, .. } => {
                let operand = self.gen_node(operand)?;
                let result = self.new_temp();
                let ty = c_type(node.ty.resolved());
                self.emit(&format!(
                    "{}{} = ({}) {}",
                    ty,
                    result,
                    ty.trim_end(),
                    operand
                ));
                Ok(result)
            }

            NodeKind::Assignment {
                reference,
                op,
                expression,
            } => {
                let value = self.gen_node(expression)?;
                let target = self.gen_chain(reference)?;
                self.emit(&format!("{} {} {}", target, op, value));
                Ok(value)
            }

            NodeKind::ReturnStatement { operand } => {
                match operand {
                    Some(operand) => {
                        let value = self.gen_node(operand)?;
                        self.emit(&format!("return {}", value));
                    }
                    None => self.emit("return"),
                }
                Ok(String::new())
            }

            NodeKind::Reference(chain) => self.gen_chain(chain),

            NodeKind::LocalVariableDecl(field) => {
                self.emit(&format!("{}{}", field_c_type(field), field.name));
                self.add_variable(field.name, field.type_lexeme);
                Ok(String::new())
            }

            NodeKind::IfStatement {
                condition,
                body,
                else_body,
            } => {
                let condition = self.gen_node(condition)?;

                let then_label = self.new_label("if_then");
                let end_label = self.new_label("if_end");
                let else_label = else_body.as_ref().map(|_| self.new_label("if_else"));

                let target = else_label.as_deref().unwrap_or(&end_label).to_string();
                self.emit(&format!("if ({}) goto {}", not_condition(&condition), target));

                self.emit_label(&then_label);
                self.gen_block(body)?;
                self.emit(&format!("goto {}", end_label));

                if let (Some(else_label), Some(else_body)) = (else_label, else_body) {
                    self.emit_label(&else_label);
                    self.gen_node(else_body)?;
                }

                self.emit_label(&end_label);
                Ok(String::new())
            }

            NodeKind::WhileStatement {
                condition,
                body,
                is_do_while,
            } => {
                let start_label = self.new_label("while_start");
                let end_label = self.new_label("while_end");
                self.push_label(start_label.clone(), end_label.clone());
                self.emit_label(&start_label);

                if *is_do_while {
                    self.gen_block(body)?;
                    let condition = self.gen_node(condition)?;
                    self.emit(&format!(
                        "if ({}) goto {}",
                        not_condition(&condition),
                        end_label
                    ));
                } else {
                    let condition = self.gen_node(condition)?;
                    self.emit(&format!(
                        "if ({}) goto {}",
                        not_condition(&condition),
                        end_label
                    ));
                    self.gen_block(body)?;
                }

                self.emit(&format!("goto {}", start_label));
                self.emit_label(&end_label);
                self.pop_label();
                Ok(String::new())
            }

            NodeKind::ForStatement {
                init,
                condition,
                update,
                body,
            } => {
                self.open_block();
                self.freeze(true);
                if let Some(init) = init {
                    self.gen_block(init)?;
                }
                self.freeze(false);

                let start_label = self.new_label("for_start");
                let body_label = self.new_label("for_body");
                let update_label = self.new_label("for_update");
                let end_label = self.new_label("for_end");
                self.push_label(update_label.clone(), end_label.clone());

                self.emit_label(&start_label);
                if let Some(condition) = condition {
                    let condition = self.gen_node(condition)?;
                    self.emit(&format!(
                        "if ({}) goto {}",
                        not_condition(&condition),
                        end_label
                    ));
                }
                self.emit_label(&body_label);
                if let Some(body) = body {
                    self.gen_block(body)?;
                }
                self.emit_label(&update_label);
                if let Some(update) = update {
                    self.gen_block(update)?;
                }
                self.emit(&format!("goto {}", start_label));
                self.emit_label(&end_label);
                self.pop_label();
                self.close_block();
                Ok(String::new())
            }

            NodeKind::BreakStatement => {
                self.break_now()?;
                Ok(String::new())
            }
            NodeKind::ContinueStatement => {
                self.continue_now()?;
                Ok(String::new())
            }

            // Reached only through reference chains, which lower these
            // payloads themselves.
            NodeKind::NewObject { .. } | NodeKind::MethodCall { .. } | NodeKind::ArrayCall { .. } => {
                Ok(String::new())
            }
        }
    }
}

/// Literals reach C mostly verbatim: `_` separators are stripped and binary
/// literals are rewritten to decimal, which C99 lacks.
fn lower_number_literal(literal: &str) -> String {
    let cleaned: String = literal.chars().filter(|c| *c != '_').collect();
    if cleaned.starts_with("0b") || cleaned.starts_with("0B") {
        if let Ok(value) = i64::from_str_radix(&cleaned[2..], 2) {
            return value.to_string();
        }
    }
    cleaned
}
