//! Two-phase semantic analysis.
//!
//! Phase 1 orders classes topologically along `extends`, registers the
//! built-in `System` and `int[]` tables, and builds one class-scope symbol
//! table per class, chained to its superclass table.
//!
//! Phase 2 walks every method body, resolves each name to a declaring scope
//! and attaches a resolved type to every AST node. All errors are fatal.

use crate::{
    ast::{AstKind, AstNode, CodeBlock, NodeKind, Project, ReferenceChain},
    lexer::Operator,
    strtab::{StringTable, Symbol},
    symtab::{ClassTables, SymbolDef, SymbolTable},
};
use failure::Fail;
use log::debug;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    rc::Rc,
};

#[derive(Debug, Fail)]
pub enum SemanticError {
    #[fail(display = "Class '{}' not found", name)]
    ClassNotFound { name: String },
    #[fail(display = "Cyclic inheritance detected")]
    CyclicInheritance,
    #[fail(display = "Class '{}' is already declared.", name)]
    ClassAlreadyDeclared { name: String },
    #[fail(display = "Symbol '{}' is already declared in this scope.", name)]
    RedeclaredSymbol { name: String },
    #[fail(display = "Undefined reference: '{}'", name)]
    UndefinedReference { name: String },
    #[fail(display = "Undefined member '{}'", name)]
    UndefinedMember { name: String },
    #[fail(display = "Type '{}' has no members. Cannot access '{}'", ty, member)]
    NoMembers { ty: String, member: String },
    #[fail(display = "Empty reference")]
    EmptyReference,
    #[fail(display = "Failed to get current class symbol table")]
    NoEnclosingClass,
    #[fail(display = "Type mismatch in BinaryExpression: '{}' and '{}'", left, right)]
    BinaryOperandMismatch { left: String, right: String },
    #[fail(display = "Arithmetic operators require 'int', found '{}'", found)]
    ArithmeticRequiresInt { found: String },
    #[fail(display = "Logical operators require 'boolean', found '{}'", found)]
    LogicalRequiresBoolean { found: String },
    #[fail(
        display = "Relational operators require 'int', found '{}' and '{}'",
        left, right
    )]
    RelationalRequiresInt { left: String, right: String },
    #[fail(
        display = "Type error in NotExpression: logical negation (!) requires a 'boolean' operand, but found '{}'",
        found
    )]
    NotRequiresBoolean { found: String },
    #[fail(
        display = "Type error in NotExpression: bitwise not (~) requires an 'int' operand, but found '{}'",
        found
    )]
    BitwiseNotRequiresInt { found: String },
    #[fail(display = "Undefined type in CastExpression: '{}'", name)]
    UndefinedCastType { name: String },
    #[fail(display = "Cannot cast '{}' to unrelated type '{}'", from, to)]
    MeaninglessCast { from: String, to: String },
    #[fail(
        display = "Return type expression expected to be '{}' but got '{}'",
        expected, found
    )]
    ReturnExpressionMismatch { expected: String, found: String },
    #[fail(
        display = "Type mismatch in return: Cannot return value of type '{}' to variable/field of type '{}'",
        found, expected
    )]
    ReturnTypeMismatch { expected: String, found: String },
    #[fail(display = "You can not set length of array '{}'", array)]
    AssignToArrayLength { array: String },
    #[fail(
        display = "Invalid compound assignment: '{}' requires 'int', but found '{}'",
        op, found
    )]
    CompoundRequiresInt { op: String, found: String },
    #[fail(
        display = "Invalid compound assignment: Cannot apply '{}' with incompatible right-hand side type '{}'",
        op, found
    )]
    CompoundRhsMismatch { op: String, found: String },
    #[fail(
        display = "Invalid compound assignment: '{}' requires 'int' or 'boolean', but found '{}'",
        op, found
    )]
    BitCompoundRequiresIntOrBoolean { op: String, found: String },
    #[fail(
        display = "Invalid compound assignment: '{}' requires matching types, found '{}' and '{}'",
        op, left, right
    )]
    BitCompoundMismatch {
        op: String,
        left: String,
        right: String,
    },
    #[fail(display = "Type mismatch in assignment: Cannot assign value of type void")]
    AssignVoid,
    #[fail(
        display = "Type mismatch in assignment: Cannot assign value of type '{}' to variable/field of type '{}'",
        from, to
    )]
    AssignTypeMismatch { from: String, to: String },
    #[fail(display = "Array size must be type of 'int' but got '{}'", found)]
    ArraySizeNotInt { found: String },
    #[fail(display = "Undefined class type in NewObject: '{}'", name)]
    UndefinedClassInNew { name: String },
    #[fail(display = "Invalid type in variable declaration: '{}'", name)]
    InvalidDeclarationType { name: String },
    #[fail(
        display = "Type error: Object of type '{}' is not a valid class or does not exist.",
        ty
    )]
    InvalidCallerType { ty: String },
    #[fail(display = "Undefined method: '{}' in type '{}'.", name, ty)]
    UndefinedMethod { name: String, ty: String },
    #[fail(display = "'{}' is not a method.", name)]
    NotAMethod { name: String },
    #[fail(
        display = "Argument mismatch in method call to '{}': expected {} arguments, but got {}.",
        name, expected, got
    )]
    ArgumentCountMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[fail(
        display = "Type mismatch for argument {} in method call to '{}': expected '{}', but got '{}'.",
        index, name, expected, got
    )]
    ArgumentTypeMismatch {
        index: usize,
        name: String,
        expected: String,
        got: String,
    },
    #[fail(display = "Undefined array: '{}'", name)]
    UndefinedArray { name: String },
    #[fail(display = "'{}' is not an array.", name)]
    NotAnArray { name: String },
    #[fail(
        display = "Type mismatch for array index '{}': expected 'int', but got '{}'.",
        name, found
    )]
    ArrayIndexNotInt { name: String, found: String },
    #[fail(
        display = "Condition in '{}' statement must be of type 'boolean', but got '{}'.",
        statement, found
    )]
    ConditionNotBoolean { statement: String, found: String },
    #[fail(
        display = "The condition in a for-loop must evaluate to 'boolean', found '{}'.",
        found
    )]
    ForConditionNotBoolean { found: String },
    #[fail(display = "Unreachable statement")]
    UnreachableStatement,
}

pub type SemanticResult<T> = Result<T, SemanticError>;

/// Computes the order on classes such that every class appears after its
/// `extends` target, using Kahn's algorithm. Fails when an extends target is
/// missing or when the relation is cyclic.
pub fn topological_sort<'f>(project: &Project<'f>) -> SemanticResult<Vec<Symbol<'f>>> {
    let mut adjacency: BTreeMap<Symbol<'f>, BTreeSet<Symbol<'f>>> = BTreeMap::new();
    let mut in_degree: BTreeMap<Symbol<'f>, usize> = BTreeMap::new();

    for class in project.classes() {
        adjacency.entry(class.name).or_default();
        in_degree.entry(class.name).or_insert(0);
    }

    for class in project.classes() {
        if let Some(extends) = class.extends {
            if !project.contains_class(extends) {
                return Err(SemanticError::ClassNotFound {
                    name: extends.to_string(),
                });
            }
            adjacency.entry(extends).or_default().insert(class.name);
            *in_degree.entry(class.name).or_insert(0) += 1;
        }
    }

    let mut zero_in_degree: VecDeque<Symbol<'f>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut sorted = Vec::new();
    while let Some(current) = zero_in_degree.pop_front() {
        sorted.push(current);

        if let Some(dependents) = adjacency.get(&current) {
            for dependent in dependents {
                let degree = in_degree
                    .get_mut(dependent)
                    .expect("every class has an in-degree entry");
                *degree -= 1;
                if *degree == 0 {
                    zero_in_degree.push_back(*dependent);
                }
            }
        }
    }

    if sorted.len() != project.classes().len() {
        return Err(SemanticError::CyclicInheritance);
    }
    Ok(sorted)
}

/// Analyzes the project in place and returns the populated class-table
/// registry for consumption by the code generator.
pub fn check<'f, 's>(
    project: &Project<'f>,
    strtab: &'s StringTable<'f>,
) -> SemanticResult<ClassTables<'f>> {
    let analyzer = SemanticAnalyzer::new(project, strtab);
    analyzer.check()
}

struct Builtins<'f> {
    int: Symbol<'f>,
    int_array: Symbol<'f>,
    boolean: Symbol<'f>,
    void: Symbol<'f>,
    return_void: Symbol<'f>,
    system: Symbol<'f>,
    length: Symbol<'f>,
}

impl<'f> Builtins<'f> {
    fn new(strtab: &StringTable<'f>) -> Self {
        Builtins {
            int: strtab.intern("int"),
            int_array: strtab.intern("int[]"),
            boolean: strtab.intern("boolean"),
            void: strtab.intern("void"),
            return_void: strtab.intern("return-void"),
            system: strtab.intern("System"),
            length: strtab.intern("length"),
        }
    }

    fn is_primitive(&self, ty: Symbol<'f>) -> bool {
        ty == self.int || ty == self.int_array || ty == self.boolean
    }
}

/// The mutable local scope stack used while analyzing one method body.
///
/// `base` is the method scope (holding the parameters) chained to the class
/// table registry, or a `System`-only scope for `main`, which has no `this`.
/// Each code block pushes a frame; a name may shadow outer frames but not be
/// declared twice in the same frame.
struct LocalScopes<'f> {
    base: Rc<SymbolTable<'f>>,
    frames: Vec<HashMap<Symbol<'f>, SymbolDef<'f>>>,
    return_type: Symbol<'f>,
}

impl<'f> LocalScopes<'f> {
    fn new(base: Rc<SymbolTable<'f>>, return_type: Symbol<'f>) -> Self {
        LocalScopes {
            base,
            frames: Vec::new(),
            return_type,
        }
    }

    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, def: SymbolDef<'f>) -> SemanticResult<()> {
        let frame = self
            .frames
            .last_mut()
            .expect("declarations happen inside a block scope");
        if frame.contains_key(&def.name) {
            return Err(SemanticError::RedeclaredSymbol {
                name: def.name.to_string(),
            });
        }
        frame.insert(def.name, def);
        Ok(())
    }

    fn lookup(&self, name: Symbol<'f>) -> Option<SymbolDef<'f>> {
        for frame in self.frames.iter().rev() {
            if let Some(def) = frame.get(&name) {
                return Some(def.clone());
            }
        }
        self.base.lookup(name).cloned()
    }

    fn current_class(&self) -> Option<Symbol<'f>> {
        self.base
            .current_class()
            .and_then(|table| table.class_name())
    }
}

struct SemanticAnalyzer<'f, 's, 'p> {
    project: &'p Project<'f>,
    strtab: &'s StringTable<'f>,
    builtins: Builtins<'f>,
    tables: ClassTables<'f>,
}

impl<'f, 's, 'p> SemanticAnalyzer<'f, 's, 'p> {
    fn new(project: &'p Project<'f>, strtab: &'s StringTable<'f>) -> Self {
        let builtins = Builtins::new(strtab);
        SemanticAnalyzer {
            project,
            strtab,
            builtins,
            tables: ClassTables::new(),
        }
    }

    fn check(mut self) -> SemanticResult<ClassTables<'f>> {
        let sorted = topological_sort(self.project)?;
        debug!("analysis order: {:?}", sorted);

        self.register_builtin_tables()?;
        self.register_declarations(&sorted)?;
        self.check_method_bodies(&sorted)?;

        Ok(self.tables)
    }

    // ------------------------------------------------------------------
    // phase 1

    fn register_builtin_tables(&mut self) -> SemanticResult<()> {
        let system_name = self.builtins.system;
        let mut system = SymbolTable::class_scope(system_name, None);
        self.add_symbol(
            &mut system,
            SymbolDef::var(self.strtab.intern("out"), system_name),
        )?;
        for printer in &["println", "print", "printf"] {
            let name = self.strtab.intern(printer);
            self.add_symbol(
                &mut system,
                SymbolDef::method(name, vec![self.builtins.int], self.builtins.void),
            )?;
        }
        self.add_table(system_name, system)?;

        let mut int_array = SymbolTable::class_scope(self.builtins.int_array, None);
        self.add_symbol(
            &mut int_array,
            SymbolDef::var(self.builtins.length, self.builtins.int),
        )?;
        self.add_table(self.builtins.int_array, int_array)?;

        Ok(())
    }

    fn register_declarations(&mut self, sorted: &[Symbol<'f>]) -> SemanticResult<()> {
        for name in sorted {
            let class = self
                .project
                .class(*name)
                .expect("topological order only contains project classes");

            let parent = class.extends.map(|extends| {
                Rc::clone(
                    self.tables
                        .get(extends)
                        .expect("superclass registered before subclass"),
                )
            });

            let mut table = SymbolTable::class_scope(class.name, parent);
            for field in class.fields() {
                self.add_symbol(&mut table, SymbolDef::var(field.name, field.type_lexeme))?;
            }
            // Synthetic entry so `System.out.println(...)` resolves.
            self.add_symbol(
                &mut table,
                SymbolDef::var(self.builtins.system, self.builtins.system),
            )?;

            for method in class.methods() {
                let params = method.params.iter().map(|param| param.type_lexeme).collect();
                self.add_symbol(
                    &mut table,
                    SymbolDef::method(method.name, params, method.type_lexeme),
                )?;
            }

            self.add_table(class.name, table)?;
        }
        Ok(())
    }

    fn add_symbol(
        &self,
        table: &mut SymbolTable<'f>,
        def: SymbolDef<'f>,
    ) -> SemanticResult<()> {
        let name = def.name;
        table
            .add_symbol(def)
            .map_err(|_| SemanticError::RedeclaredSymbol {
                name: name.to_string(),
            })
    }

    fn add_table(&mut self, name: Symbol<'f>, table: SymbolTable<'f>) -> SemanticResult<()> {
        self.tables
            .add(name, table)
            .map_err(|_| SemanticError::ClassAlreadyDeclared {
                name: name.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // phase 2

    fn check_method_bodies(&self, sorted: &[Symbol<'f>]) -> SemanticResult<()> {
        for name in sorted {
            let class = self
                .project
                .class(*name)
                .expect("topological order only contains project classes");
            let class_table = Rc::clone(
                self.tables
                    .get(class.name)
                    .expect("phase 1 registered every class"),
            );

            for method in class.methods() {
                debug!("checking body of {}.{}", class.name, method.name);

                if method.is_main {
                    // main has no `this`; it sees only the System globals.
                    let mut globals = SymbolTable::class_scope(self.builtins.system, None);
                    self.add_symbol(
                        &mut globals,
                        SymbolDef::var(self.builtins.system, self.builtins.system),
                    )?;
                    let mut scopes =
                        LocalScopes::new(Rc::new(globals), self.builtins.void);
                    self.analyse_block(&method.body, &mut scopes)?;
                    continue;
                }

                let mut method_scope =
                    SymbolTable::method_scope(Rc::clone(&class_table), method.type_lexeme);
                for param in &method.params {
                    self.add_symbol(
                        &mut method_scope,
                        SymbolDef::var(param.name, param.type_lexeme),
                    )?;
                }
                let mut scopes =
                    LocalScopes::new(Rc::new(method_scope), method.type_lexeme);
                self.analyse_block(&method.body, &mut scopes)?;
            }
        }
        Ok(())
    }

    /// Analyzes a block in a fresh scope, tracking return paths: a statement
    /// after a terminating one is unreachable, and a terminating block
    /// carries the terminating return type (or `"return-void"`).
    fn analyse_block(
        &self,
        block: &CodeBlock<'f>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        scopes.push();
        let result = self.analyse_block_statements(block, scopes);
        scopes.pop();
        result
    }

    fn analyse_block_statements(
        &self,
        block: &CodeBlock<'f>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        block.ty.set(self.builtins.void);
        let mut returns = false;

        for code in &block.statements {
            if returns {
                return Err(SemanticError::UnreachableStatement);
            }
            self.analyse_node(code, scopes)?;

            if code.ast_kind() == AstKind::ReturnStatement {
                let ty = if scopes.return_type == self.builtins.void {
                    self.builtins.return_void
                } else {
                    scopes.return_type
                };
                block.ty.set(ty);
                returns = true;
            } else if code.ast_kind() == AstKind::IfStatement
                && code.ty.resolved() != self.builtins.void
            {
                block.ty.set(code.ty.resolved());
                returns = true;
            }
        }
        Ok(())
    }

    /// Analyzes a block without opening a new scope. Used for `for`
    /// initializers and updates, whose declarations belong to the loop scope.
    fn analyse_block_same_scope(
        &self,
        block: &CodeBlock<'f>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        for code in &block.statements {
            self.analyse_node(code, scopes)?;
        }
        block.ty.set(self.builtins.void);
        Ok(())
    }

    fn analyse_node(&self, node: &AstNode<'f>, scopes: &mut LocalScopes<'f>) -> SemanticResult<()> {
        match &node.kind {
            NodeKind::Block(block) => {
                self.analyse_block(block, scopes)?;
                node.ty.set(block.ty.resolved());
            }

            NodeKind::NumberLiteral(_) => node.ty.set(self.builtins.int),
            NodeKind::BooleanLiteral(_) => node.ty.set(self.builtins.boolean),

            NodeKind::BinaryExpression { op, left, right } => {
                self.analyse_node(left, scopes)?;
                self.analyse_node(right, scopes)?;
                node.ty
                    .set(self.check_binary_expression(*op, left, right)?);
            }

            NodeKind::NotExpression { op, operand } => {
                self.analyse_node(operand, scopes)?;
                let found = operand.ty.resolved();
                match op {
                    Operator::Exclaim => {
                        if found != self.builtins.boolean {
                            return Err(SemanticError::NotRequiresBoolean {
                                found: found.to_string(),
                            });
                        }
                        node.ty.set(self.builtins.boolean);
                    }
                    _ => {
                        if found != self.builtins.int {
                            return Err(SemanticError::BitwiseNotRequiresInt {
                                found: found.to_string(),
                            });
                        }
                        node.ty.set(self.builtins.int);
                    }
                }
            }

            NodeKind::CastExpression { target, operand } => {
                self.analyse_node(operand, scopes)?;
                self.check_cast(*target, operand.ty.resolved())?;
                node.ty.set(*target);
            }

            NodeKind::ReturnStatement { operand } => {
                self.check_return(operand.as_deref(), scopes)?;
                node.ty.set(self.builtins.void);
            }

            NodeKind::BreakStatement | NodeKind::ContinueStatement => {
                node.ty.set(self.builtins.void)
            }

            NodeKind::NewObject {
                class_type,
                array_size,
            } => match array_size {
                Some(size) => {
                    self.analyse_node(size, scopes)?;
                    if size.ty.resolved() != self.builtins.int {
                        return Err(SemanticError::ArraySizeNotInt {
                            found: size.ty.resolved().to_string(),
                        });
                    }
                    node.ty.set(self.builtins.int_array);
                }
                None => {
                    if self.tables.get(*class_type).is_none() {
                        return Err(SemanticError::UndefinedClassInNew {
                            name: class_type.to_string(),
                        });
                    }
                    node.ty.set(*class_type);
                }
            },

            NodeKind::Reference(chain) => {
                self.analyse_chain(chain, scopes)?;
                node.ty.set(chain.ty.resolved());
            }

            NodeKind::LocalVariableDecl(field) => {
                if !self.builtins.is_primitive(field.type_lexeme)
                    && self.tables.get(field.type_lexeme).is_none()
                {
                    return Err(SemanticError::InvalidDeclarationType {
                        name: field.type_lexeme.to_string(),
                    });
                }
                scopes.declare(SymbolDef::var(field.name, field.type_lexeme))?;
                node.ty.set(field.type_lexeme);
            }

            NodeKind::Assignment {
                reference,
                op,
                expression,
            } => {
                self.check_assignment(reference, *op, expression, scopes)?;
                node.ty.set(self.builtins.void);
            }

            NodeKind::MethodCall {
                name,
                arguments,
                caller_type,
            } => {
                let caller = caller_type
                    .get()
                    .expect("caller_type is set by the reference chain before analysis");
                node.ty
                    .set(self.check_method_call(*name, arguments, caller, scopes)?);
            }

            NodeKind::ArrayCall {
                array_name,
                index,
                caller_type,
            } => {
                self.check_array_call(*array_name, index, caller_type.get(), scopes)?;
                node.ty.set(self.builtins.int);
            }

            NodeKind::IfStatement {
                condition,
                body,
                else_body,
            } => {
                self.analyse_node(condition, scopes)?;
                if condition.ty.resolved() != self.builtins.boolean {
                    return Err(SemanticError::ConditionNotBoolean {
                        statement: "if".to_string(),
                        found: condition.ty.resolved().to_string(),
                    });
                }
                self.analyse_block(body, scopes)?;

                let mut ty = self.builtins.void;
                if let Some(else_body) = else_body {
                    self.analyse_node(else_body, scopes)?;
                    // Both arms terminating propagates the return path to the
                    // enclosing block.
                    let then_ty = body.ty.resolved();
                    let else_ty = else_body.ty.resolved();
                    if then_ty != self.builtins.void && else_ty != self.builtins.void {
                        ty = then_ty;
                    }
                }
                node.ty.set(ty);
            }

            NodeKind::WhileStatement {
                condition, body, ..
            } => {
                self.analyse_node(condition, scopes)?;
                if condition.ty.resolved() != self.builtins.boolean {
                    return Err(SemanticError::ConditionNotBoolean {
                        statement: "while".to_string(),
                        found: condition.ty.resolved().to_string(),
                    });
                }
                self.analyse_block(body, scopes)?;
                node.ty.set(self.builtins.void);
            }

            NodeKind::ForStatement {
                init,
                condition,
                update,
                body,
            } => {
                scopes.push();
                let result = self.analyse_for(init, condition, update, body, scopes);
                scopes.pop();
                result?;
                node.ty.set(self.builtins.void);
            }
        }
        Ok(())
    }

    fn analyse_for(
        &self,
        init: &Option<CodeBlock<'f>>,
        condition: &Option<Box<AstNode<'f>>>,
        update: &Option<CodeBlock<'f>>,
        body: &Option<CodeBlock<'f>>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        if let Some(init) = init {
            self.analyse_block_same_scope(init, scopes)?;
        }
        if let Some(condition) = condition {
            self.analyse_node(condition, scopes)?;
            if condition.ty.resolved() != self.builtins.boolean {
                return Err(SemanticError::ForConditionNotBoolean {
                    found: condition.ty.resolved().to_string(),
                });
            }
        }
        if let Some(update) = update {
            self.analyse_block(update, scopes)?;
        }
        if let Some(body) = body {
            self.analyse_block(body, scopes)?;
        }
        Ok(())
    }

    fn check_binary_expression(
        &self,
        op: Operator,
        left: &AstNode<'f>,
        right: &AstNode<'f>,
    ) -> SemanticResult<Symbol<'f>> {
        let left_ty = left.ty.resolved();
        let right_ty = right.ty.resolved();

        if left_ty != right_ty {
            return Err(SemanticError::BinaryOperandMismatch {
                left: left_ty.to_string(),
                right: right_ty.to_string(),
            });
        }

        use self::Operator::*;
        match op {
            Plus | Minus | Star | Slash | Percent | Ampersand | Caret | Pipe => {
                if left_ty != self.builtins.int {
                    return Err(SemanticError::ArithmeticRequiresInt {
                        found: left_ty.to_string(),
                    });
                }
                Ok(self.builtins.int)
            }
            DoubleAmpersand | DoublePipe => {
                if left_ty != self.builtins.boolean {
                    return Err(SemanticError::LogicalRequiresBoolean {
                        found: left_ty.to_string(),
                    });
                }
                Ok(self.builtins.boolean)
            }
            LeftChevron | RightChevron | LeftChevronEqual | RightChevronEqual => {
                if left_ty != self.builtins.int || right_ty != self.builtins.int {
                    return Err(SemanticError::RelationalRequiresInt {
                        left: left_ty.to_string(),
                        right: right_ty.to_string(),
                    });
                }
                Ok(self.builtins.boolean)
            }
            DoubleEqual | ExclaimEqual => Ok(self.builtins.boolean),
            _ => unreachable!("the parser only builds supported binary operators"),
        }
    }

    /// The cast target must be a primitive or a registered class, and a
    /// cast between class types must stay within one extends chain (up- and
    /// downcasts allowed, unrelated classes rejected). Primitives cast only
    /// to themselves.
    fn check_cast(&self, target: Symbol<'f>, from: Symbol<'f>) -> SemanticResult<()> {
        if !self.builtins.is_primitive(target) && self.tables.get(target).is_none() {
            return Err(SemanticError::UndefinedCastType {
                name: target.to_string(),
            });
        }

        let related = self.tables.can_cast(from, target) || self.tables.can_cast(target, from);
        if !related {
            return Err(SemanticError::MeaninglessCast {
                from: from.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }

    fn check_return(
        &self,
        operand: Option<&AstNode<'f>>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        let expected = scopes.return_type;

        match operand {
            Some(expression) => {
                self.analyse_node(expression, scopes)?;
                let found = expression.ty.resolved();
                if found == self.builtins.void {
                    return Err(SemanticError::ReturnExpressionMismatch {
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }

                if expected != found {
                    let assignable = !self.builtins.is_primitive(expected)
                        && self.tables.can_cast(found, expected);
                    if !assignable && !expression.is_cast() {
                        return Err(SemanticError::ReturnTypeMismatch {
                            expected: expected.to_string(),
                            found: found.to_string(),
                        });
                    }
                }
                Ok(())
            }
            None => {
                if expected != self.builtins.void {
                    return Err(SemanticError::ReturnExpressionMismatch {
                        expected: expected.to_string(),
                        found: "void".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn check_assignment(
        &self,
        reference: &ReferenceChain<'f>,
        op: Operator,
        expression: &AstNode<'f>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        self.analyse_chain(reference, scopes)?;
        let lhs = reference.ty.resolved();

        if reference.is_array_length.get() {
            let array = reference.chain[reference.chain.len() - 2]
                .token
                .data
                .lexeme();
            return Err(SemanticError::AssignToArrayLength {
                array: array.to_string(),
            });
        }

        self.analyse_node(expression, scopes)?;
        let rhs = expression.ty.resolved();

        use self::Operator::*;
        match op {
            PlusEqual | MinusEqual | StarEqual | SlashEqual => {
                if lhs != self.builtins.int {
                    return Err(SemanticError::CompoundRequiresInt {
                        op: op.to_string(),
                        found: lhs.to_string(),
                    });
                }
                if rhs != self.builtins.int {
                    return Err(SemanticError::CompoundRhsMismatch {
                        op: op.to_string(),
                        found: rhs.to_string(),
                    });
                }
                Ok(())
            }
            AmpersandEqual | PipeEqual | CaretEqual => {
                if lhs != self.builtins.int && lhs != self.builtins.boolean {
                    return Err(SemanticError::BitCompoundRequiresIntOrBoolean {
                        op: op.to_string(),
                        found: lhs.to_string(),
                    });
                }
                if lhs != rhs {
                    return Err(SemanticError::BitCompoundMismatch {
                        op: op.to_string(),
                        left: lhs.to_string(),
                        right: rhs.to_string(),
                    });
                }
                Ok(())
            }
            Equal => {
                if lhs == self.builtins.void || rhs == self.builtins.void {
                    return Err(SemanticError::AssignVoid);
                }
                if lhs != rhs {
                    let assignable = !self.builtins.is_primitive(lhs)
                        && self.tables.can_cast(rhs, lhs);
                    if !assignable {
                        return Err(SemanticError::AssignTypeMismatch {
                            from: rhs.to_string(),
                            to: lhs.to_string(),
                        });
                    }
                }
                Ok(())
            }
            _ => unreachable!("the parser only builds assignment operators"),
        }
    }

    fn check_method_call(
        &self,
        name: Symbol<'f>,
        arguments: &[AstNode<'f>],
        caller: Symbol<'f>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<Symbol<'f>> {
        let table = self
            .tables
            .get(caller)
            .ok_or_else(|| SemanticError::InvalidCallerType {
                ty: caller.to_string(),
            })?;

        let symbol = table
            .lookup(name)
            .ok_or_else(|| SemanticError::UndefinedMethod {
                name: name.to_string(),
                ty: caller.to_string(),
            })?;

        if !symbol.is_method {
            return Err(SemanticError::NotAMethod {
                name: name.to_string(),
            });
        }

        if arguments.len() != symbol.params.len() {
            return Err(SemanticError::ArgumentCountMismatch {
                name: name.to_string(),
                expected: symbol.params.len(),
                got: arguments.len(),
            });
        }

        // Clone breaks the borrow of the registry so argument analysis can
        // recurse through `self`.
        let symbol = symbol.clone();
        for (index, (argument, expected)) in
            arguments.iter().zip(symbol.params.iter()).enumerate()
        {
            self.analyse_node(argument, scopes)?;
            if argument.ty.resolved() != *expected {
                return Err(SemanticError::ArgumentTypeMismatch {
                    index: index + 1,
                    name: name.to_string(),
                    expected: expected.to_string(),
                    got: argument.ty.resolved().to_string(),
                });
            }
        }

        Ok(symbol.ty)
    }

    fn check_array_call(
        &self,
        array_name: Symbol<'f>,
        index: &AstNode<'f>,
        caller: Option<Symbol<'f>>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        let symbol = match caller {
            // No caller type: the array is resolved in the current scope.
            None => scopes.lookup(array_name),
            Some(caller) => {
                let table =
                    self.tables
                        .get(caller)
                        .ok_or_else(|| SemanticError::InvalidCallerType {
                            ty: caller.to_string(),
                        })?;
                table.lookup(array_name).cloned()
            }
        };

        let symbol = symbol.ok_or_else(|| SemanticError::UndefinedArray {
            name: array_name.to_string(),
        })?;

        if symbol.ty != self.builtins.int_array {
            return Err(SemanticError::NotAnArray {
                name: array_name.to_string(),
            });
        }

        self.analyse_node(index, scopes)?;
        if index.ty.resolved() != self.builtins.int {
            return Err(SemanticError::ArrayIndexNotInt {
                name: array_name.to_string(),
                found: index.ty.resolved().to_string(),
            });
        }
        Ok(())
    }

    /// Left-to-right resolution of a reference chain, maintaining a current
    /// type. Payloads get their `caller_type` back-filled immediately before
    /// their own analysis runs.
    fn analyse_chain(
        &self,
        chain: &ReferenceChain<'f>,
        scopes: &mut LocalScopes<'f>,
    ) -> SemanticResult<()> {
        chain.is_array_length.set(false);
        let front = chain.chain.first().ok_or(SemanticError::EmptyReference)?;

        let name = front.token.data.lexeme();
        let mut current = if name == "this" || front.payload.is_some() {
            scopes
                .current_class()
                .ok_or(SemanticError::NoEnclosingClass)?
        } else {
            let symbol = scopes
                .lookup(self.strtab.intern(name))
                .ok_or_else(|| SemanticError::UndefinedReference {
                    name: name.to_string(),
                })?;
            symbol.ty
        };

        if let Some(payload) = &front.payload {
            self.backfill_caller(payload, Some(current), true);
            self.analyse_node(payload, scopes)?;
            current = payload.ty.resolved();
        }

        for link in &chain.chain[1..] {
            let member = self.strtab.intern(link.token.data.lexeme());

            match &link.payload {
                Some(payload) => {
                    self.backfill_caller(payload, Some(current), false);
                    self.analyse_node(payload, scopes)?;
                    current = payload.ty.resolved();
                }
                None => {
                    let table = self.tables.get(current).ok_or_else(|| {
                        SemanticError::NoMembers {
                            ty: current.to_string(),
                            member: member.to_string(),
                        }
                    })?;
                    let symbol =
                        table
                            .lookup(member)
                            .ok_or_else(|| SemanticError::UndefinedMember {
                                name: member.to_string(),
                            })?;

                    if current == self.builtins.int_array && member == self.builtins.length {
                        chain.is_array_length.set(true);
                    }
                    current = symbol.ty;
                }
            }
        }

        chain.ty.set(current);
        Ok(())
    }

    /// At the chain head an array access has no caller type (it resolves in
    /// the local scope); everywhere else the payload receives the current
    /// type of the chain.
    fn backfill_caller(&self, payload: &AstNode<'f>, current: Option<Symbol<'f>>, is_head: bool) {
        match &payload.kind {
            NodeKind::MethodCall { caller_type, .. } => caller_type.set(current),
            NodeKind::ArrayCall { caller_type, .. } => {
                caller_type.set(if is_head { None } else { current })
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::Lexer, parser::Parser, stream::TokenStream};
    use asciifile::AsciiFile;

    fn analyse(
        input: &'static str,
    ) -> (
        &'static Project<'static>,
        &'static StringTable<'static>,
        SemanticResult<ClassTables<'static>>,
    ) {
        let strtab = Box::leak(Box::new(StringTable::new()));
        let file = Box::leak(Box::new(AsciiFile::new(input.as_bytes()).unwrap()));
        let tokens = Lexer::new(strtab, file)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let project = Parser::new(TokenStream::new(tokens), strtab)
            .parse()
            .unwrap_or_else(|error| panic!("parse failed: {}", error));
        let project = Box::leak(Box::new(project));
        let result = check(project, strtab);
        (project, strtab, result)
    }

    fn analyse_ok(
        input: &'static str,
    ) -> (
        &'static Project<'static>,
        &'static StringTable<'static>,
        ClassTables<'static>,
    ) {
        let (project, strtab, result) = analyse(input);
        match result {
            Ok(tables) => (project, strtab, tables),
            Err(error) => panic!("analysis failed: {}", error),
        }
    }

    fn analyse_err(input: &'static str) -> SemanticError {
        let (_, _, result) = analyse(input);
        match result {
            Err(error) => error,
            Ok(_) => panic!("expected a semantic error"),
        }
    }

    #[test]
    fn topological_sort_orders_bases_first() {
        let (project, strtab, _) = analyse_ok("class C extends B {} class B extends A {} class A {}");
        let sorted = topological_sort(project).unwrap();
        assert_eq!(sorted, vec![
            strtab.intern("A"),
            strtab.intern("B"),
            strtab.intern("C"),
        ]);
    }

    #[test]
    fn missing_extends_target() {
        let error = analyse_err("class A extends Ghost {}");
        assert_eq!(error.to_string(), "Class 'Ghost' not found");
    }

    #[test]
    fn cyclic_inheritance_is_detected() {
        let error = analyse_err("class A extends B {} class B extends A {}");
        assert_eq!(error.to_string(), "Cyclic inheritance detected");
    }

    #[test]
    fn hello_world_types() {
        let (project, strtab, _) = analyse_ok(
            "class Main { public static void main() { System.out.println(42); } }",
        );
        let main = &project.classes()[0].methods()[0];
        assert_eq!(main.body.ty.resolved(), strtab.intern("void"));
        assert_eq!(
            main.body.statements[0].ty.resolved(),
            strtab.intern("void")
        );
    }

    #[test]
    fn every_node_gets_a_type() {
        let (project, strtab, _) = analyse_ok(
            r#"
            class A {
                int x;
                public int get() { return x; }
                public static void main() {
                    A a;
                    a = new A();
                    System.out.println(a.get());
                }
            }
        "#,
        );
        let main = &project.classes()[0].methods()[1];
        for statement in &main.body.statements {
            assert!(statement.ty.get().is_some());
        }
        // `a = new A()` types the chain with the class
        match &main.body.statements[1].kind {
            NodeKind::Assignment { expression, .. } => {
                assert_eq!(expression.ty.resolved(), strtab.intern("A"));
            }
            _ => panic!("expected an assignment"),
        }
    }

    #[test]
    fn undefined_reference() {
        let error =
            analyse_err("class A { public void run() { ghost = 1; } }");
        assert_eq!(error.to_string(), "Undefined reference: 'ghost'");
    }

    #[test]
    fn inherited_members_resolve_through_parent_tables() {
        analyse_ok(
            r#"
            class A { int value; public int get() { return value; } }
            class B extends A {
                public int twice() { return this.get() + value; }
            }
        "#,
        );
    }

    #[test]
    fn condition_must_be_boolean() {
        let error = analyse_err("class A { public void run() { if (42) { } } }");
        assert_eq!(
            error.to_string(),
            "Condition in 'if' statement must be of type 'boolean', but got 'int'."
        );
    }

    #[test]
    fn array_length_reads_but_does_not_write() {
        analyse_ok(
            r#"
            class A { public int len(int[] xs) { return xs.length; } }
        "#,
        );
        let error = analyse_err(
            "class A { public void run(int[] xs) { xs.length = 3; } }",
        );
        assert_eq!(
            error.to_string(),
            "You can not set length of array 'xs'"
        );
    }

    #[test]
    fn assignment_upcast_is_allowed_downcast_needs_cast() {
        analyse_ok(
            r#"
            class A {}
            class B extends A {
                public void run() { A a; a = new B(); }
            }
        "#,
        );
        let error = analyse_err(
            r#"
            class A {}
            class B extends A {
                public void run() { B b; b = new A(); }
            }
        "#,
        );
        assert_eq!(
            error.to_string(),
            "Type mismatch in assignment: Cannot assign value of type 'A' to variable/field of type 'B'"
        );
        // the explicit cast form is accepted
        analyse_ok(
            r#"
            class A {}
            class B extends A {
                public void run(A a) { B b; b = (B) a; }
            }
        "#,
        );
    }

    #[test]
    fn cast_between_unrelated_classes_is_rejected() {
        let error = analyse_err(
            r#"
            class A {}
            class C {}
            class B { public void run(A a) { C c; c = (C) a; } }
        "#,
        );
        assert_eq!(error.to_string(), "Cannot cast 'A' to unrelated type 'C'");
    }

    #[test]
    fn compound_assignment_rules() {
        analyse_ok("class A { public void run(int x) { x += 2; x &= 3; } }");
        analyse_ok("class A { public void run(boolean b) { b &= true; } }");

        let error = analyse_err("class A { public void run(boolean b) { b += true; } }");
        assert_eq!(
            error.to_string(),
            "Invalid compound assignment: '+=' requires 'int', but found 'boolean'"
        );

        let error = analyse_err("class A { public void run(int x) { x |= true; } }");
        assert_eq!(
            error.to_string(),
            "Invalid compound assignment: '|=' requires matching types, found 'int' and 'boolean'"
        );
    }

    #[test]
    fn return_type_checking() {
        let error = analyse_err("class A { public int run() { return true; } }");
        assert_eq!(
            error.to_string(),
            "Type mismatch in return: Cannot return value of type 'boolean' to variable/field of type 'int'"
        );

        let error = analyse_err("class A { public void run() { return 1; } }");
        assert_eq!(
            error.to_string(),
            "Return type expression expected to be 'void' but got 'int'"
        );

        analyse_ok(
            r#"
            class A {}
            class B extends A { public A as_a() { return new B(); } }
        "#,
        );
    }

    #[test]
    fn unreachable_statement_after_return() {
        let error = analyse_err(
            "class A { public int run() { return 1; return 2; } }",
        );
        assert_eq!(error.to_string(), "Unreachable statement");
    }

    #[test]
    fn if_with_returning_arms_terminates_the_block() {
        let error = analyse_err(
            r#"
            class A { public int run(boolean p) {
                if (p) { return 1; } else { return 2; }
                return 3;
            } }
        "#,
        );
        assert_eq!(error.to_string(), "Unreachable statement");
    }

    #[test]
    fn if_with_one_returning_arm_does_not_terminate() {
        analyse_ok(
            r#"
            class A { public int run(boolean p) {
                if (p) { return 1; }
                return 3;
            } }
        "#,
        );
    }

    #[test]
    fn method_call_argument_checking() {
        let error = analyse_err(
            r#"
            class A {
                public int add(int a, int b) { return a + b; }
                public void run() { this.add(1); }
            }
        "#,
        );
        assert_eq!(
            error.to_string(),
            "Argument mismatch in method call to 'add': expected 2 arguments, but got 1."
        );

        let error = analyse_err(
            r#"
            class A {
                public int add(int a) { return a; }
                public void run() { this.add(true); }
            }
        "#,
        );
        assert_eq!(
            error.to_string(),
            "Type mismatch for argument 1 in method call to 'add': expected 'int', but got 'boolean'."
        );
    }

    #[test]
    fn duplicate_local_in_same_scope_rejected_shadowing_in_inner_scope_allowed() {
        let error = analyse_err(
            "class A { public void run() { int x; int x; } }",
        );
        assert_eq!(
            error.to_string(),
            "Symbol 'x' is already declared in this scope."
        );

        analyse_ok("class A { public void run() { int x; { int x; } } }");
    }

    #[test]
    fn main_has_no_this() {
        let error = analyse_err(
            r#"
            class A {
                int x;
                public static void main() { x = 1; }
            }
        "#,
        );
        assert_eq!(error.to_string(), "Undefined reference: 'x'");
    }

    #[test]
    fn for_scoping_and_condition() {
        analyse_ok(
            r#"
            class A { public void run() {
                for (int i = 0; i < 10; i++) { System.out.println(i); }
            } }
        "#,
        );
        let error = analyse_err(
            "class A { public void run() { for (int i = 0; i; i++) { } } }",
        );
        assert_eq!(
            error.to_string(),
            "The condition in a for-loop must evaluate to 'boolean', found 'int'."
        );
    }

    #[test]
    fn class_named_system_collides_with_builtin() {
        let error = analyse_err("class System {}");
        assert_eq!(error.to_string(), "Class 'System' is already declared.");
    }
}
