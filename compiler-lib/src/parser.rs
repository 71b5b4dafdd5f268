//! Recursive-descent parser producing a [`Project`].
//!
//! Statements are normalized while parsing: a local declaration with an
//! initializer becomes a declaration node followed by an assignment node,
//! and the unary `++`/`--` forms are desugared to `+= 1` / `-= 1`.
//! Expressions are parsed by precedence climbing over a fixed table.

use crate::{
    ast::{
        AstNode, Class, CodeBlock, Field, Method, NodeKind, Project, ReferenceChain, TypeKind,
    },
    lexer::{Keyword, Operator, Token, TokenKind},
    stream::TokenStream,
    strtab::{StringTable, Symbol},
};
use asciifile::{MaybeSpanned, Spanned};
use failure::Fail;
use std::cell::Cell;

#[derive(Debug, Clone, Fail)]
pub enum SyntaxError {
    #[fail(display = "Failed to parse {}, Expected {} but got `{}`", context, expected, actual)]
    UnexpectedToken {
        context: String,
        expected: String,
        actual: String,
    },
    #[fail(display = "Failed to parse {}, unexpected end of input", context)]
    UnexpectedEof { context: String },
    #[fail(display = "Class {} already exists!", name)]
    DuplicateClass { name: String },
    #[fail(display = "Failed to parse class, class can not extend itself")]
    SelfExtends,
    #[fail(display = "Field {} already exists in {}", field, class)]
    DuplicateField { field: String, class: String },
    #[fail(display = "Method {} already exists in {}", method, class)]
    DuplicateMethod { method: String, class: String },
    #[fail(display = "Param {} already exists in {}", param, method)]
    DuplicateParam { param: String, method: String },
    #[fail(display = "Failed to parse field, Field can not be static")]
    StaticField,
    #[fail(display = "Failed to parse method, Only main method can be static")]
    StaticNotMain,
}

pub type SyntaxResult<T> = Result<T, MaybeSpanned<SyntaxError>>;

/// Binary operators grouped by precedence, lowest binding first. The final
/// group holds the unary operators, which climb right-associatively.
#[rustfmt::skip]
const OPERATOR_PRECEDENCE: &[&[Operator]] = &[
    &[Operator::DoublePipe],
    &[Operator::DoubleAmpersand],
    &[Operator::Pipe],
    &[Operator::Caret],
    &[Operator::Ampersand],
    &[Operator::DoubleEqual, Operator::ExclaimEqual],
    &[Operator::LeftChevron, Operator::LeftChevronEqual,
      Operator::RightChevron, Operator::RightChevronEqual],
    &[Operator::Plus, Operator::Minus],
    &[Operator::Star, Operator::Slash, Operator::Percent],
    &[Operator::Exclaim, Operator::Tilde],
];

const ASSIGNMENT_OPERATORS: &[Operator] = &[
    Operator::Equal,
    Operator::PlusEqual,
    Operator::MinusEqual,
    Operator::StarEqual,
    Operator::SlashEqual,
    Operator::AmpersandEqual,
    Operator::PipeEqual,
    Operator::CaretEqual,
];

struct MemberSignature<'f> {
    is_static: bool,
    is_field: bool,
    kind: TypeKind,
    type_lexeme: Symbol<'f>,
    name: Symbol<'f>,
    name_token: Token<'f>,
}

pub struct Parser<'f, 's> {
    stream: TokenStream<'f>,
    strtab: &'s StringTable<'f>,
}

impl<'f, 's> Parser<'f, 's> {
    pub fn new(stream: TokenStream<'f>, strtab: &'s StringTable<'f>) -> Self {
        Parser { stream, strtab }
    }

    pub fn parse(mut self) -> SyntaxResult<Project<'f>> {
        let mut project = Project::new();
        while self.stream.has_token() {
            if !self.parse_class(&mut project)? {
                break;
            }
        }
        Ok(project)
    }

    // ------------------------------------------------------------------
    // helpers

    fn eof(&self, context: &str) -> MaybeSpanned<SyntaxError> {
        MaybeSpanned::WithoutSpan(SyntaxError::UnexpectedEof {
            context: context.to_string(),
        })
    }

    fn unexpected(
        &self,
        context: &str,
        expected: &str,
        token: Token<'f>,
    ) -> MaybeSpanned<SyntaxError> {
        MaybeSpanned::WithSpan(Spanned::new(
            token.span,
            SyntaxError::UnexpectedToken {
                context: context.to_string(),
                expected: expected.to_string(),
                actual: token.data.lexeme().to_string(),
            },
        ))
    }

    fn spanned(&self, token: Token<'f>, error: SyntaxError) -> MaybeSpanned<SyntaxError> {
        MaybeSpanned::WithSpan(Spanned::new(token.span, error))
    }

    fn read_or(&mut self, context: &str) -> SyntaxResult<Token<'f>> {
        match self.stream.read() {
            Some(token) => Ok(token),
            None => Err(self.eof(context)),
        }
    }

    fn expect_lexeme(&mut self, lexeme: &str, context: &str) -> SyntaxResult<Token<'f>> {
        let token = self.read_or(context)?;
        if token.data.lexeme() == lexeme {
            Ok(token)
        } else {
            Err(self.unexpected(context, &format!("'{}'", lexeme), token))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> SyntaxResult<(Token<'f>, Symbol<'f>)> {
        let token = self.read_or(context)?;
        match token.data {
            TokenKind::Identifier(symbol) => Ok((token, symbol)),
            _ => Err(self.unexpected(context, "identifier", token)),
        }
    }

    fn peek_lexeme(&self) -> Option<&'f str> {
        self.stream.peek().map(|token| token.data.lexeme())
    }

    fn operator_of(&self, token: Token<'f>) -> Operator {
        match token.data {
            TokenKind::Operator(operator) => operator,
            _ => unreachable!("caller checked the token is an operator"),
        }
    }

    fn is_assignment(token: &Token<'f>) -> bool {
        match token.data {
            TokenKind::Operator(op) => ASSIGNMENT_OPERATORS.contains(&op),
            _ => false,
        }
    }

    /// A token that can open a type: `int`, `boolean`, an identifier, and
    /// `void` where explicitly allowed.
    fn is_valid_type(token: &Token<'f>, can_be_void: bool) -> bool {
        match token.data {
            TokenKind::Keyword(Keyword::Int) | TokenKind::Keyword(Keyword::Boolean) => true,
            TokenKind::Keyword(Keyword::Void) => can_be_void,
            TokenKind::Identifier(_) => true,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // declarations

    /// Parses the next class declaration. Returns `false` once the stream
    /// holds no further `class` keyword.
    fn parse_class(&mut self, project: &mut Project<'f>) -> SyntaxResult<bool> {
        if self.stream.read_until("class").is_none() {
            return Ok(false);
        }

        let (name_token, name) = self.expect_identifier("class name")?;
        if project.contains_class(name) {
            return Err(self.spanned(
                name_token,
                SyntaxError::DuplicateClass {
                    name: name.to_string(),
                },
            ));
        }

        let next = self.read_or("class")?;
        let extends = match next.data.lexeme() {
            "extends" => {
                let (extends_token, extends) = self.expect_identifier("class extends")?;
                if extends == name {
                    return Err(self.spanned(extends_token, SyntaxError::SelfExtends));
                }
                self.expect_lexeme("{", "class")?;
                Some(extends)
            }
            "{" => None,
            _ => return Err(self.unexpected("class", "'{'", next)),
        };

        let mut class = Class::new(name, extends);
        self.parse_class_scope(&mut class)?;
        project.add_class(class);
        Ok(true)
    }

    /// The class body: alternating field and method declarations up to `}`.
    fn parse_class_scope(&mut self, class: &mut Class<'f>) -> SyntaxResult<()> {
        loop {
            let next = self.read_or("class body")?;
            if next.data.lexeme() == "}" {
                return Ok(());
            }
            self.stream.unread();

            let sign = self.parse_field_or_method()?;
            if sign.is_field {
                if class.contains_field(sign.name) {
                    return Err(self.spanned(
                        sign.name_token,
                        SyntaxError::DuplicateField {
                            field: sign.name.to_string(),
                            class: class.name.to_string(),
                        },
                    ));
                }
                class.add_field(Field::new(sign.kind, sign.type_lexeme, sign.name));
            } else {
                if class.contains_method(sign.name) {
                    return Err(self.spanned(
                        sign.name_token,
                        SyntaxError::DuplicateMethod {
                            method: sign.name.to_string(),
                            class: class.name.to_string(),
                        },
                    ));
                }
                let mut method =
                    Method::new(sign.kind, sign.type_lexeme, sign.name, sign.is_static);
                self.parse_method_params(&mut method)?;
                self.parse_method_body(&mut method)?;
                class.add_method(method);
            }
        }
    }

    /// Parses optional `public`/`static` modifiers followed by a type.
    /// Returns `(kind, type_lexeme, is_static)`.
    fn parse_type(
        &mut self,
        can_have_modifier: bool,
        can_be_void: bool,
    ) -> SyntaxResult<(TypeKind, Symbol<'f>, bool)> {
        let mut start = self.read_or("type")?;
        let mut is_static = false;

        if can_have_modifier {
            // skip public modifier
            if start.data == TokenKind::Keyword(Keyword::Public) {
                start = self.read_or("type")?;
            }

            if start.data == TokenKind::Keyword(Keyword::Static) {
                start = self.read_or("type")?;
                is_static = true;
            }
        }

        if !Self::is_valid_type(&start, can_be_void) {
            return Err(self.unexpected("type", "a type", start));
        }

        let (kind, type_lexeme) = match start.data {
            TokenKind::Keyword(Keyword::Int) => match self.stream.read() {
                Some(token) if token.data.lexeme() == "[" => {
                    let closing = self.read_or("type")?;
                    if closing.data.lexeme() != "]" {
                        return Err(self.unexpected("type", "int[]", closing));
                    }
                    (TypeKind::IntArray, self.strtab.intern("int[]"))
                }
                Some(_) => {
                    self.stream.unread();
                    (TypeKind::Int, self.strtab.intern("int"))
                }
                None => (TypeKind::Int, self.strtab.intern("int")),
            },
            TokenKind::Keyword(Keyword::Boolean) => {
                (TypeKind::Boolean, self.strtab.intern("boolean"))
            }
            TokenKind::Keyword(Keyword::Void) => (TypeKind::Void, self.strtab.intern("void")),
            TokenKind::Identifier(symbol) => (TypeKind::Class, symbol),
            _ => unreachable!("is_valid_type checked the token"),
        };

        Ok((kind, type_lexeme, is_static))
    }

    /// A single `type name` pair, used for parameters and local variables.
    fn parse_param(&mut self) -> SyntaxResult<(Field<'f>, Token<'f>)> {
        let (kind, type_lexeme, _) = self.parse_type(false, false)?;
        let (name_token, name) = self.expect_identifier("param")?;
        Ok((Field::new(kind, type_lexeme, name), name_token))
    }

    /// Member dispatch: type and name are parsed first; `;` means field,
    /// `(` begins a method. Static members are validated here: fields can
    /// never be static and only `void main` may be.
    fn parse_field_or_method(&mut self) -> SyntaxResult<MemberSignature<'f>> {
        let (kind, type_lexeme, is_static) = self.parse_type(true, true)?;

        let (name_token, name) = self.expect_identifier("field")?;

        let next = self.read_or("field")?;
        let is_field = match next.data.lexeme() {
            ";" => true,
            "(" => false,
            _ => return Err(self.unexpected("field", "';'", next)),
        };

        if is_static {
            if is_field {
                return Err(self.spanned(next, SyntaxError::StaticField));
            } else if kind != TypeKind::Void || name != "main" {
                return Err(self.spanned(next, SyntaxError::StaticNotMain));
            }
        }

        Ok(MemberSignature {
            is_static,
            is_field,
            kind,
            type_lexeme,
            name,
            name_token,
        })
    }

    fn parse_method_params(&mut self, method: &mut Method<'f>) -> SyntaxResult<()> {
        if self.peek_lexeme() == Some(")") {
            self.stream.read();
            return Ok(());
        }

        loop {
            let (param, name_token) = self.parse_param()?;
            if method.contains_param(param.name) {
                return Err(self.spanned(
                    name_token,
                    SyntaxError::DuplicateParam {
                        param: param.name.to_string(),
                        method: method.name.to_string(),
                    },
                ));
            }
            method.add_param(param);

            let token = self.read_or("method")?;
            match token.data.lexeme() {
                "," => continue,
                ")" => return Ok(()),
                _ => return Err(self.unexpected("method", "',' or ')'", token)),
            }
        }
    }

    fn parse_method_body(&mut self, method: &mut Method<'f>) -> SyntaxResult<()> {
        let token = self.read_or("method")?;
        if token.data.lexeme() != "{" {
            return Err(self.unexpected("method", "'{'", token));
        }
        self.parse_code_block(&mut method.body)
    }

    // ------------------------------------------------------------------
    // statements

    fn parse_code_block(&mut self, block: &mut CodeBlock<'f>) -> SyntaxResult<()> {
        loop {
            let token = self.read_or("method body")?;
            match token.data.lexeme() {
                ";" => continue,
                "}" => return Ok(()),
                _ => self.parse_statement(block, token)?,
            }
        }
    }

    /// One-token lookahead deciding "is this a local variable declaration?":
    /// a valid type token followed by an identifier (or `int` followed by
    /// `[`) is a declaration, anything else is an expression statement.
    fn lookahead_is_local_variable(&mut self, token: &Token<'f>) -> bool {
        if !Self::is_valid_type(token, false) {
            return false;
        }

        self.stream.save();
        let is_decl = match self.stream.peek() {
            Some(next) => {
                next.data.is_identifier()
                    || (token.data.lexeme() == "int" && next.data.lexeme() == "[")
            }
            None => false,
        };
        self.stream.restore();
        is_decl
    }

    fn parse_statement(&mut self, block: &mut CodeBlock<'f>, token: Token<'f>) -> SyntaxResult<()> {
        match token.data.lexeme() {
            "++" | "--" => {
                self.parse_unary(token, None, block)?;
                self.read_optional_semicolon();
                return Ok(());
            }
            _ => (),
        }

        if self.lookahead_is_local_variable(&token) {
            self.stream.unread();
            self.parse_local_variable(block)?;
            self.read_optional_semicolon();
            return Ok(());
        }

        match token.data.lexeme() {
            "if" => {
                let node = self.parse_if_statement()?;
                block.add(node);
            }
            "while" => {
                let node = self.parse_while_statement()?;
                block.add(node);
            }
            "do" => {
                let node = self.parse_do_while_statement()?;
                block.add(node);
            }
            "for" => {
                let node = self.parse_for_statement()?;
                block.add(node);
            }
            "{" => {
                let mut inner = CodeBlock::new();
                self.parse_code_block(&mut inner)?;
                block.add(AstNode::new(NodeKind::Block(inner)));
            }
            "return" => self.parse_return(block)?,
            "break" => self.parse_break(block)?,
            "continue" => self.parse_continue(block)?,
            _ if token.data.is_identifier()
                || token.data.lexeme() == "this"
                || token.data.lexeme() == "new" =>
            {
                self.parse_assignment(block, token)?;
            }
            _ => return Err(self.unexpected("statement", "a statement", token)),
        }

        self.read_optional_semicolon();
        Ok(())
    }

    fn read_optional_semicolon(&mut self) {
        if self.peek_lexeme() == Some(";") {
            self.stream.read();
        }
    }

    /// Simple statements are the subset allowed as `for` initializers:
    /// a local declaration, an assignment, or a unary statement.
    fn parse_simple_statement(
        &mut self,
        block: &mut CodeBlock<'f>,
        token: Token<'f>,
    ) -> SyntaxResult<()> {
        match token.data.lexeme() {
            "++" | "--" => return self.parse_unary(token, None, block),
            _ => (),
        }

        if self.lookahead_is_local_variable(&token) {
            self.stream.unread();
            return self.parse_local_variable(block);
        }

        self.parse_assignment(block, token)
    }

    /// `type name [op expr]`. The declaration and the initializing
    /// assignment become two independent statements.
    fn parse_local_variable(&mut self, block: &mut CodeBlock<'f>) -> SyntaxResult<()> {
        let (field, name_token) = self.parse_param()?;
        block.add(AstNode::new(NodeKind::LocalVariableDecl(field)));

        let next = self.read_or("local variable code")?;

        if next.data.lexeme() == ";" {
            return Ok(());
        }

        if Self::is_assignment(&next) {
            self.parse_assignment_for_local_variable(block, name_token, next)
        } else {
            Err(self.unexpected("local variable code", "';' or assignment", next))
        }
    }

    fn parse_assignment_for_local_variable(
        &mut self,
        block: &mut CodeBlock<'f>,
        name_token: Token<'f>,
        assignment_token: Token<'f>,
    ) -> SyntaxResult<()> {
        let mut reference = ReferenceChain::new();
        reference.add_field(name_token);

        let expression = self.parse_expression()?;
        block.add(AstNode::new(NodeKind::Assignment {
            reference,
            op: self.operator_of(assignment_token),
            expression: Box::new(expression),
        }));
        Ok(())
    }

    /// A statement beginning with a reference chain: an assignment, a
    /// unary `++`/`--`, or a bare chain (method call) ended by `;`.
    fn parse_assignment(
        &mut self,
        block: &mut CodeBlock<'f>,
        reference: Token<'f>,
    ) -> SyntaxResult<()> {
        let chain = self.parse_reference_chain(reference)?;
        let next = self.read_or("assignment code")?;

        if Self::is_assignment(&next) {
            let expression = self.parse_expression()?;
            block.add(AstNode::new(NodeKind::Assignment {
                reference: chain,
                op: self.operator_of(next),
                expression: Box::new(expression),
            }));
            Ok(())
        } else if next.data.lexeme() == "++" || next.data.lexeme() == "--" {
            self.parse_unary(next, Some(chain), block)
        } else if next.data.lexeme() == ";" {
            block.add(AstNode::new(NodeKind::Reference(chain)));
            Ok(())
        } else {
            Err(self.unexpected("assignment code", "assignment", next))
        }
    }

    /// `++x` / `x--` and friends desugar to `x += 1` / `x -= 1`.
    fn parse_unary(
        &mut self,
        op_token: Token<'f>,
        reference: Option<ReferenceChain<'f>>,
        block: &mut CodeBlock<'f>,
    ) -> SyntaxResult<()> {
        let op = if op_token.data.lexeme() == "++" {
            Operator::PlusEqual
        } else {
            Operator::MinusEqual
        };

        let reference = match reference {
            Some(chain) => chain,
            None => {
                let seed = self.read_or("unary statement")?;
                self.parse_reference_chain(seed)?
            }
        };

        block.add(AstNode::new(NodeKind::Assignment {
            reference,
            op,
            expression: Box::new(AstNode::new(NodeKind::NumberLiteral("1"))),
        }));
        Ok(())
    }

    fn parse_return(&mut self, block: &mut CodeBlock<'f>) -> SyntaxResult<()> {
        if self.peek_lexeme().map_or(true, |lexeme| lexeme == ";") {
            self.stream.read();
            block.add(AstNode::new(NodeKind::ReturnStatement { operand: None }));
            return Ok(());
        }

        let expression = self.parse_expression()?;
        match self.stream.peek() {
            Some(token) if token.data.lexeme() == ";" => (),
            Some(token) => return Err(self.unexpected("return expression", "';'", token)),
            None => return Err(self.eof("return expression")),
        }
        block.add(AstNode::new(NodeKind::ReturnStatement {
            operand: Some(Box::new(expression)),
        }));
        Ok(())
    }

    fn parse_break(&mut self, block: &mut CodeBlock<'f>) -> SyntaxResult<()> {
        match self.stream.peek() {
            Some(token) if token.data.lexeme() != ";" => {
                Err(self.unexpected("break", "';'", token))
            }
            _ => {
                self.stream.read();
                block.add(AstNode::new(NodeKind::BreakStatement));
                Ok(())
            }
        }
    }

    fn parse_continue(&mut self, block: &mut CodeBlock<'f>) -> SyntaxResult<()> {
        match self.stream.peek() {
            Some(token) if token.data.lexeme() != ";" => {
                Err(self.unexpected("continue", "';'", token))
            }
            _ => {
                self.stream.read();
                block.add(AstNode::new(NodeKind::ContinueStatement));
                Ok(())
            }
        }
    }

    /// Either a brace-delimited block or a single statement wrapped in a
    /// one-element block, as used by the control-flow arms.
    fn parse_block_or_statement(&mut self, token: Token<'f>) -> SyntaxResult<CodeBlock<'f>> {
        let mut block = CodeBlock::new();
        if token.data.lexeme() != ";" {
            if token.data.lexeme() == "{" {
                self.parse_code_block(&mut block)?;
            } else {
                self.parse_statement(&mut block, token)?;
            }
        }
        Ok(block)
    }

    /// The dangling `else` binds to the nearest `if`: the recursive descent
    /// attaches it greedily while parsing the inner statement.
    fn parse_if_statement(&mut self) -> SyntaxResult<AstNode<'f>> {
        self.expect_lexeme("(", "if-statement")?;
        let condition = self.parse_expression()?;
        self.expect_lexeme(")", "if-statement")?;

        let token = self.read_or("if-statement")?;
        let body = self.parse_block_or_statement(token)?;

        let else_body = match self.stream.read() {
            Some(token) if token.data.lexeme() == "else" => {
                let token = self.read_or("if-statement")?;
                if token.data.lexeme() == "if" {
                    Some(Box::new(self.parse_if_statement()?))
                } else {
                    let block = self.parse_block_or_statement(token)?;
                    Some(Box::new(AstNode::new(NodeKind::Block(block))))
                }
            }
            Some(_) => {
                self.stream.unread();
                None
            }
            None => None,
        };

        Ok(AstNode::new(NodeKind::IfStatement {
            condition: Box::new(condition),
            body,
            else_body,
        }))
    }

    fn parse_while_statement(&mut self) -> SyntaxResult<AstNode<'f>> {
        self.expect_lexeme("(", "while-statement")?;
        let condition = self.parse_expression()?;
        self.expect_lexeme(")", "while-statement")?;

        let token = self.read_or("while-statement")?;
        let body = self.parse_block_or_statement(token)?;

        Ok(AstNode::new(NodeKind::WhileStatement {
            condition: Box::new(condition),
            body,
            is_do_while: false,
        }))
    }

    fn parse_do_while_statement(&mut self) -> SyntaxResult<AstNode<'f>> {
        let token = self.read_or("do-while-statement")?;
        let body = self.parse_block_or_statement(token)?;

        self.expect_lexeme("while", "do-while-statement")?;
        self.expect_lexeme("(", "do-while-statement")?;
        let condition = self.parse_expression()?;
        self.expect_lexeme(")", "do-while-statement")?;
        self.expect_lexeme(";", "do-while-statement")?;

        Ok(AstNode::new(NodeKind::WhileStatement {
            condition: Box::new(condition),
            body,
            is_do_while: true,
        }))
    }

    fn parse_for_statement(&mut self) -> SyntaxResult<AstNode<'f>> {
        self.expect_lexeme("(", "for-statement")?;

        let token = self.read_or("for-statement")?;
        let init = if token.data.lexeme() == ";" {
            None
        } else {
            let mut block = CodeBlock::new();
            self.parse_simple_statement(&mut block, token)?;
            self.expect_lexeme(";", "for-statement")?;
            Some(block)
        };

        let token = self.read_or("for-statement")?;
        let condition = if token.data.lexeme() == ";" {
            None
        } else {
            self.stream.unread();
            let condition = self.parse_expression()?;
            self.expect_lexeme(";", "for-statement")?;
            Some(Box::new(condition))
        };

        let token = self.read_or("for-statement")?;
        let update = if token.data.lexeme() == ")" {
            None
        } else {
            let mut block = CodeBlock::new();
            self.parse_assignment(&mut block, token)?;
            self.expect_lexeme(")", "for-statement")?;
            Some(block)
        };

        let token = self.read_or("for-statement")?;
        let body = if token.data.lexeme() == ";" {
            None
        } else {
            Some(self.parse_block_or_statement(token)?)
        };

        Ok(AstNode::new(NodeKind::ForStatement {
            init,
            condition,
            update,
            body,
        }))
    }

    // ------------------------------------------------------------------
    // expressions

    pub(crate) fn parse_expression(&mut self) -> SyntaxResult<AstNode<'f>> {
        let peeked = match self.stream.peek() {
            Some(token) => token,
            None => return Err(self.eof("expression")),
        };

        match peeked.data.lexeme() {
            "!" | "~" => {
                let op_token = self.read_or("expression")?;
                let operand = self.parse_expression()?;
                return Ok(AstNode::new(NodeKind::NotExpression {
                    op: self.operator_of(op_token),
                    operand: Box::new(operand),
                }));
            }
            "(" => {
                if let Some(cast) = self.try_parse_cast()? {
                    return Ok(cast);
                }
            }
            _ => (),
        }

        self.parse_expression_with_precedence(0)
    }

    /// `(TYPE) expr` is recognized only when a parenthesized identifier is
    /// followed by `)` and the next token is neither an operator nor `;`.
    /// This deliberately excludes e.g. `(x) + 1` from being read as a cast.
    fn try_parse_cast(&mut self) -> SyntaxResult<Option<AstNode<'f>>> {
        self.stream.save();
        self.stream.read(); // consume '('

        if let Some(target) = self.stream.peek() {
            if let TokenKind::Identifier(symbol) = target.data {
                self.stream.read();
                if self.peek_lexeme() == Some(")") {
                    self.stream.read();
                    if let Some(next) = self.stream.peek() {
                        if !next.data.is_operator() && next.data.lexeme() != ";" {
                            self.stream.discard();
                            let operand = self.parse_expression()?;
                            return Ok(Some(AstNode::new(NodeKind::CastExpression {
                                target: symbol,
                                operand: Box::new(operand),
                            })));
                        }
                    }
                }
            }
        }

        self.stream.restore();
        Ok(None)
    }

    fn parse_expression_with_precedence(&mut self, level: usize) -> SyntaxResult<AstNode<'f>> {
        if level == OPERATOR_PRECEDENCE.len() - 1 {
            if let Some(lexeme) = self.peek_lexeme() {
                if lexeme == "!" || lexeme == "~" {
                    let op_token = self.read_or("expression")?;
                    let operand = self.parse_expression_with_precedence(level)?;
                    return Ok(AstNode::new(NodeKind::NotExpression {
                        op: self.operator_of(op_token),
                        operand: Box::new(operand),
                    }));
                }
            }

            return self.parse_primary();
        }

        let mut left = self.parse_expression_with_precedence(level + 1)?;

        while let Some(token) = self.stream.peek() {
            let op = match token.data {
                TokenKind::Operator(op) if OPERATOR_PRECEDENCE[level].contains(&op) => op,
                _ => break,
            };
            self.stream.read();
            let right = self.parse_expression_with_precedence(level + 1)?;
            left = AstNode::new(NodeKind::BinaryExpression {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> SyntaxResult<AstNode<'f>> {
        let token = self.read_or("expression")?;

        match token.data {
            TokenKind::IntegerLiteral(lit)
            | TokenKind::HexLiteral(lit)
            | TokenKind::BinaryLiteral(lit) => Ok(AstNode::new(NodeKind::NumberLiteral(lit))),
            TokenKind::Keyword(Keyword::True) => Ok(AstNode::new(NodeKind::BooleanLiteral(true))),
            TokenKind::Keyword(Keyword::False) => {
                Ok(AstNode::new(NodeKind::BooleanLiteral(false)))
            }
            TokenKind::Identifier(_)
            | TokenKind::Keyword(Keyword::This)
            | TokenKind::Keyword(Keyword::New) => {
                let chain = self.parse_reference_chain(token)?;
                Ok(AstNode::new(NodeKind::Reference(chain)))
            }
            TokenKind::Operator(Operator::LeftParen) => {
                let expression = self.parse_expression()?;
                let next = self.read_or("expression")?;
                if next.data.lexeme() != ")" {
                    return Err(self.unexpected("expression", "')'", next));
                }
                Ok(expression)
            }
            _ => Err(self.unexpected("expression", "a primary expression", token)),
        }
    }

    // ------------------------------------------------------------------
    // reference chains

    /// Beginning at the seed token (identifier, `this` or `new`), collects
    /// `.field` steps, `[index]` accesses, `(args)` calls and `new`
    /// allocations into a [`ReferenceChain`].
    fn parse_reference_chain(&mut self, seed: Token<'f>) -> SyntaxResult<ReferenceChain<'f>> {
        let mut chain = ReferenceChain::new();
        let mut pending: Option<Token<'f>> = Some(seed);

        if seed.data.lexeme() == "new" {
            let new_object = self.parse_new_object()?;
            if self.stream.peek().is_none() {
                return Err(self.eof("new object"));
            }
            chain.add_node(seed, new_object);
            pending = None;
            if self.peek_lexeme() == Some(";") {
                return Ok(chain);
            }
        }

        loop {
            let next = self.read_or("reference chain")?;
            match next.data.lexeme() {
                "." => {
                    if let Some(token) = pending.take() {
                        chain.add_field(token);
                    }
                    let (token, _) = self.expect_identifier("reference chain")?;
                    pending = Some(token);
                }
                "[" => {
                    let index = self.parse_expression()?;
                    self.expect_lexeme("]", "bracket")?;
                    let token = match pending.take() {
                        Some(token) => token,
                        None => {
                            return Err(self.unexpected(
                                "reference chain",
                                "an array reference",
                                next,
                            ));
                        }
                    };
                    chain.add_node(
                        token,
                        AstNode::new(NodeKind::ArrayCall {
                            array_name: self.strtab.intern(token.data.lexeme()),
                            index: Box::new(index),
                            caller_type: Cell::new(None),
                        }),
                    );
                }
                "(" => {
                    let token = match pending.take() {
                        Some(token) => token,
                        None => {
                            return Err(self.unexpected(
                                "reference chain",
                                "a method reference",
                                next,
                            ));
                        }
                    };
                    let arguments = self.parse_method_arguments(next)?;
                    chain.add_node(
                        token,
                        AstNode::new(NodeKind::MethodCall {
                            name: self.strtab.intern(token.data.lexeme()),
                            arguments,
                            caller_type: Cell::new(None),
                        }),
                    );
                }
                _ => {
                    if let Some(token) = pending.take() {
                        chain.add_field(token);
                    }
                    self.stream.unread();
                    break;
                }
            }
        }

        Ok(chain)
    }

    fn parse_method_arguments(&mut self, open: Token<'f>) -> SyntaxResult<Vec<AstNode<'f>>> {
        let mut arguments = Vec::new();
        loop {
            match self.peek_lexeme() {
                None => return Err(self.unexpected("method call", "')'", open)),
                Some(")") => (),
                Some(_) => arguments.push(self.parse_expression()?),
            }

            match self.peek_lexeme() {
                Some(",") => {
                    self.stream.read();
                }
                Some(")") => {
                    self.stream.read();
                    return Ok(arguments);
                }
                Some(_) | None => {
                    let token = self.read_or("method call")?;
                    return Err(self.unexpected("method call", "',' or ')'", token));
                }
            }
        }
    }

    /// `new TYPE ( )` or `new int [ expr ]` as the first chain element.
    fn parse_new_object(&mut self) -> SyntaxResult<AstNode<'f>> {
        let type_token = self.read_or("new object")?;

        if type_token.data.lexeme() == "int" {
            self.expect_lexeme("[", "new array")?;
            let array_size = self.parse_expression()?;
            self.expect_lexeme("]", "new array")?;
            Ok(AstNode::new(NodeKind::NewObject {
                class_type: self.strtab.intern("int"),
                array_size: Some(Box::new(array_size)),
            }))
        } else {
            let symbol = match type_token.data {
                TokenKind::Identifier(symbol) => symbol,
                _ => {
                    return Err(self.unexpected("new object", "identifier", type_token));
                }
            };
            self.expect_lexeme("(", "new object")?;
            self.expect_lexeme(")", "new object")?;
            Ok(AstNode::new(NodeKind::NewObject {
                class_type: symbol,
                array_size: None,
            }))
        }
    }
}
