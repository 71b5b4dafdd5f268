//! The syntax tree built by the parser and annotated by the semantic
//! analyzer.
//!
//! Resolved types are attached after parsing, so every node carries a
//! [`TypeSlot`] with interior mutability: analysis runs over a shared borrow
//! of the tree and fills the slots in place. A type is one of `"int"`,
//! `"int[]"`, `"boolean"`, `"void"`, a class name, or the internal
//! `"return-void"` marker used by code blocks to signal a void-returning
//! terminal path.

use crate::{
    lexer::{IntLit, Operator, Token},
    strtab::Symbol,
};
use std::{cell::Cell, collections::HashMap, fmt};
use strum_macros::{Display, EnumDiscriminants};

/// The classification of a declared MiniJava type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Int,
    Boolean,
    IntArray,
    Class,
    Void,
}

/// Holder for the resolved type attached to a node during semantic analysis.
#[derive(Debug, Default)]
pub struct TypeSlot<'f>(Cell<Option<Symbol<'f>>>);

impl<'f> TypeSlot<'f> {
    pub fn unresolved() -> Self {
        TypeSlot(Cell::new(None))
    }

    pub fn set(&self, ty: Symbol<'f>) {
        self.0.set(Some(ty));
    }

    pub fn get(&self) -> Option<Symbol<'f>> {
        self.0.get()
    }

    /// The resolved type. Only valid after semantic analysis succeeded.
    pub fn resolved(&self) -> Symbol<'f> {
        self.0
            .get()
            .expect("resolved type queried before semantic analysis")
    }
}

impl fmt::Display for TypeSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(ty) => write!(f, "{}", ty),
            None => write!(f, "?"),
        }
    }
}

/// A variable declaration: a class field, a method parameter or a local.
#[derive(Debug)]
pub struct Field<'f> {
    pub kind: TypeKind,
    /// Source spelling of the type. Needed for class names and for `int[]`,
    /// which the kind alone cannot distinguish from `int`.
    pub type_lexeme: Symbol<'f>,
    pub name: Symbol<'f>,
}

impl<'f> Field<'f> {
    pub fn new(kind: TypeKind, type_lexeme: Symbol<'f>, name: Symbol<'f>) -> Self {
        Field {
            kind,
            type_lexeme,
            name,
        }
    }
}

#[derive(Debug)]
pub struct Method<'f> {
    pub kind: TypeKind,
    pub type_lexeme: Symbol<'f>,
    pub name: Symbol<'f>,
    pub params: Vec<Field<'f>>,
    pub body: CodeBlock<'f>,
    pub is_main: bool,
}

impl<'f> Method<'f> {
    pub fn new(kind: TypeKind, type_lexeme: Symbol<'f>, name: Symbol<'f>, is_main: bool) -> Self {
        Method {
            kind,
            type_lexeme,
            name,
            params: Vec::new(),
            body: CodeBlock::new(),
            is_main,
        }
    }

    pub fn add_param(&mut self, param: Field<'f>) {
        self.params.push(param);
    }

    pub fn contains_param(&self, name: Symbol<'f>) -> bool {
        self.params.iter().any(|param| param.name == name)
    }
}

#[derive(Debug)]
pub struct Class<'f> {
    pub name: Symbol<'f>,
    pub extends: Option<Symbol<'f>>,
    fields: Vec<Field<'f>>,
    fields_map: HashMap<Symbol<'f>, usize>,
    methods: Vec<Method<'f>>,
    methods_map: HashMap<Symbol<'f>, usize>,
}

impl<'f> Class<'f> {
    pub fn new(name: Symbol<'f>, extends: Option<Symbol<'f>>) -> Self {
        Class {
            name,
            extends,
            fields: Vec::new(),
            fields_map: HashMap::new(),
            methods: Vec::new(),
            methods_map: HashMap::new(),
        }
    }

    pub fn add_field(&mut self, field: Field<'f>) {
        let index = self.fields.len();
        self.fields_map.insert(field.name, index);
        self.fields.push(field);
    }

    pub fn add_method(&mut self, method: Method<'f>) {
        let index = self.methods.len();
        self.methods_map.insert(method.name, index);
        self.methods.push(method);
    }

    pub fn contains_field(&self, name: Symbol<'f>) -> bool {
        self.fields_map.contains_key(&name)
    }

    pub fn contains_method(&self, name: Symbol<'f>) -> bool {
        self.methods_map.contains_key(&name)
    }

    pub fn field(&self, name: Symbol<'f>) -> Option<&Field<'f>> {
        self.fields_map.get(&name).map(|index| &self.fields[*index])
    }

    pub fn fields(&self) -> &[Field<'f>] {
        &self.fields
    }

    pub fn methods(&self) -> &[Method<'f>] {
        &self.methods
    }
}

/// An ordered list of classes plus a name → index mapping. Class names are
/// globally unique; the parser rejects duplicates before insertion.
#[derive(Debug, Default)]
pub struct Project<'f> {
    classes: Vec<Class<'f>>,
    index: HashMap<Symbol<'f>, usize>,
}

impl<'f> Project<'f> {
    pub fn new() -> Self {
        Project::default()
    }

    pub fn add_class(&mut self, class: Class<'f>) {
        let position = self.classes.len();
        self.index.insert(class.name, position);
        self.classes.push(class);
    }

    pub fn contains_class(&self, name: Symbol<'f>) -> bool {
        self.index.contains_key(&name)
    }

    pub fn class(&self, name: Symbol<'f>) -> Option<&Class<'f>> {
        self.index.get(&name).map(|index| &self.classes[*index])
    }

    pub fn classes(&self) -> &[Class<'f>] {
        &self.classes
    }
}

/// A block of statements. Used as method bodies, control-flow arms and
/// nested scopes. Its type slot holds `"void"` unless the block terminates
/// on every path, in which case it holds the terminating return type (or the
/// `"return-void"` marker).
#[derive(Debug, Default)]
pub struct CodeBlock<'f> {
    pub statements: Vec<AstNode<'f>>,
    pub ty: TypeSlot<'f>,
}

impl<'f> CodeBlock<'f> {
    pub fn new() -> Self {
        CodeBlock::default()
    }

    pub fn add(&mut self, node: AstNode<'f>) {
        self.statements.push(node);
    }
}

/// A single element of a reference chain: the token naming the step plus an
/// optional payload for method calls, array accesses and allocations.
#[derive(Debug)]
pub struct ChainLink<'f> {
    pub token: Token<'f>,
    pub payload: Option<Box<AstNode<'f>>>,
}

/// A source-level sequence of dot- and bracket-separated accesses beginning
/// with an identifier, `this` or `new`.
#[derive(Debug, Default)]
pub struct ReferenceChain<'f> {
    pub chain: Vec<ChainLink<'f>>,
    pub ty: TypeSlot<'f>,
    /// Set when the chain's last step is `.length` on an `int[]`.
    pub is_array_length: Cell<bool>,
}

impl<'f> ReferenceChain<'f> {
    pub fn new() -> Self {
        ReferenceChain::default()
    }

    pub fn add_field(&mut self, token: Token<'f>) {
        self.chain.push(ChainLink {
            token,
            payload: None,
        });
    }

    pub fn add_node(&mut self, token: Token<'f>, payload: AstNode<'f>) {
        self.chain.push(ChainLink {
            token,
            payload: Some(Box::new(payload)),
        });
    }
}

#[derive(Debug)]
pub struct AstNode<'f> {
    pub kind: NodeKind<'f>,
    pub ty: TypeSlot<'f>,
}

impl<'f> AstNode<'f> {
    pub fn new(kind: NodeKind<'f>) -> Self {
        AstNode {
            kind,
            ty: TypeSlot::unresolved(),
        }
    }

    pub fn ast_kind(&self) -> AstKind {
        AstKind::from(&self.kind)
    }

    pub fn is_cast(&self) -> bool {
        matches!(self.kind, NodeKind::CastExpression { .. })
    }
}

#[derive(Debug, EnumDiscriminants)]
#[strum_discriminants(name(AstKind), derive(Display, Hash))]
pub enum NodeKind<'f> {
    Block(CodeBlock<'f>),
    BinaryExpression {
        op: Operator,
        left: Box<AstNode<'f>>,
        right: Box<AstNode<'f>>,
    },
    /// `!` on booleans, `~` on ints.
    NotExpression {
        op: Operator,
        operand: Box<AstNode<'f>>,
    },
    CastExpression {
        target: Symbol<'f>,
        operand: Box<AstNode<'f>>,
    },
    ReturnStatement {
        operand: Option<Box<AstNode<'f>>>,
    },
    BreakStatement,
    ContinueStatement,
    /// Mutually exclusive: a class allocation (no size) or an int-array
    /// allocation (size present).
    NewObject {
        class_type: Symbol<'f>,
        array_size: Option<Box<AstNode<'f>>>,
    },
    Reference(ReferenceChain<'f>),
    NumberLiteral(IntLit<'f>),
    BooleanLiteral(bool),
    LocalVariableDecl(Field<'f>),
    Assignment {
        reference: ReferenceChain<'f>,
        op: Operator,
        expression: Box<AstNode<'f>>,
    },
    /// `caller_type` is back-filled by the reference chain during analysis,
    /// before this node's own analysis runs.
    MethodCall {
        name: Symbol<'f>,
        arguments: Vec<AstNode<'f>>,
        caller_type: Cell<Option<Symbol<'f>>>,
    },
    ArrayCall {
        array_name: Symbol<'f>,
        index: Box<AstNode<'f>>,
        caller_type: Cell<Option<Symbol<'f>>>,
    },
    IfStatement {
        condition: Box<AstNode<'f>>,
        body: CodeBlock<'f>,
        else_body: Option<Box<AstNode<'f>>>,
    },
    WhileStatement {
        condition: Box<AstNode<'f>>,
        body: CodeBlock<'f>,
        is_do_while: bool,
    },
    ForStatement {
        init: Option<CodeBlock<'f>>,
        condition: Option<Box<AstNode<'f>>>,
        update: Option<CodeBlock<'f>>,
        body: Option<CodeBlock<'f>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strtab::StringTable;

    #[test]
    fn type_slot_is_settable_through_shared_borrow() {
        let strtab = StringTable::new();
        let node = AstNode::new(NodeKind::NumberLiteral("42"));
        assert!(node.ty.get().is_none());
        node.ty.set(strtab.intern("int"));
        assert_eq!(node.ty.resolved(), strtab.intern("int"));
    }

    #[test]
    fn class_lookup_maps_stay_in_sync() {
        let strtab = StringTable::new();
        let mut class = Class::new(strtab.intern("A"), None);
        class.add_field(Field::new(
            TypeKind::Int,
            strtab.intern("int"),
            strtab.intern("x"),
        ));
        assert!(class.contains_field(strtab.intern("x")));
        assert!(!class.contains_field(strtab.intern("y")));
        assert_eq!(
            class.field(strtab.intern("x")).unwrap().type_lexeme,
            strtab.intern("int")
        );
    }

    #[test]
    fn discriminants_identify_node_kinds() {
        let node = AstNode::new(NodeKind::BreakStatement);
        assert_eq!(node.ast_kind(), AstKind::BreakStatement);
        assert_ne!(node.ast_kind(), AstKind::ContinueStatement);
    }
}
