//! Indented tree dump of a parsed (and possibly analyzed) project.
//!
//! Resolved types render as `?` before semantic analysis has run, so the
//! printer is usable after either stage.

use crate::ast::{AstNode, Class, CodeBlock, Field, Method, NodeKind, Project, ReferenceChain};
use std::io;

struct IndentPrinter<'w> {
    writer: &'w mut dyn io::Write,
    indent: usize,
}

impl<'w> IndentPrinter<'w> {
    fn new(writer: &'w mut dyn io::Write) -> Self {
        IndentPrinter { writer, indent: 0 }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "{}{}", "\t".repeat(self.indent), text)
    }

    fn indented<F>(&mut self, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        self.indent += 1;
        let result = f(self);
        self.indent -= 1;
        result
    }
}

pub fn print(project: &Project<'_>, out: &mut dyn io::Write) -> io::Result<()> {
    let mut printer = IndentPrinter::new(out);
    for class in project.classes() {
        print_class(class, &mut printer)?;
    }
    Ok(())
}

fn print_class(class: &Class<'_>, printer: &mut IndentPrinter<'_>) -> io::Result<()> {
    match class.extends {
        Some(extends) => printer.line(&format!("Class {} extends {}", class.name, extends))?,
        None => printer.line(&format!("Class {}", class.name))?,
    }

    printer.indented(|printer| {
        for field in class.fields() {
            print_field("Field", field, printer)?;
        }
        for method in class.methods() {
            print_method(method, printer)?;
        }
        Ok(())
    })
}

fn print_field(label: &str, field: &Field<'_>, printer: &mut IndentPrinter<'_>) -> io::Result<()> {
    printer.line(&format!("{} {} {}", label, field.type_lexeme, field.name))
}

fn print_method(method: &Method<'_>, printer: &mut IndentPrinter<'_>) -> io::Result<()> {
    let params = method
        .params
        .iter()
        .map(|param| format!("{} {}", param.type_lexeme, param.name))
        .collect::<Vec<_>>()
        .join(", ");
    let label = if method.is_main { "Main " } else { "" };
    printer.line(&format!(
        "{}Method {} {}({})",
        label, method.type_lexeme, method.name, params
    ))?;
    printer.indented(|printer| print_block(&method.body, printer))
}

fn print_block(block: &CodeBlock<'_>, printer: &mut IndentPrinter<'_>) -> io::Result<()> {
    printer.line(&format!("CodeBlock (Type: {})", block.ty))?;
    printer.indented(|printer| {
        for statement in &block.statements {
            print_node(statement, printer)?;
        }
        Ok(())
    })
}

fn print_chain(chain: &ReferenceChain<'_>, printer: &mut IndentPrinter<'_>) -> io::Result<()> {
    let path = chain
        .chain
        .iter()
        .map(|link| link.token.data.lexeme())
        .collect::<Vec<_>>()
        .join(".");
    printer.line(&format!("Chain {} (Type: {})", path, chain.ty))?;
    printer.indented(|printer| {
        for link in &chain.chain {
            if let Some(payload) = &link.payload {
                print_node(payload, printer)?;
            }
        }
        Ok(())
    })
}

fn print_node(node: &AstNode<'_>, printer: &mut IndentPrinter<'_>) -> io::Result<()> {
    match &node.kind {
        NodeKind::Block(block) => print_block(block, printer),

        NodeKind::BinaryExpression { op, left, right } => {
            printer.line(&format!("BinaryExpression ({}) (Type: {})", op, node.ty))?;
            printer.indented(|printer| {
                print_node(left, printer)?;
                print_node(right, printer)
            })
        }

        NodeKind::NotExpression { op, operand } => {
            printer.line(&format!("NotExpression ({}) (Type: {})", op, node.ty))?;
            printer.indented(|printer| print_node(operand, printer))
        }

        NodeKind::CastExpression { target, operand } => {
            printer.line(&format!("CastExpression ({}) (Type: {})", target, node.ty))?;
            printer.indented(|printer| print_node(operand, printer))
        }

        NodeKind::ReturnStatement { operand } => {
            printer.line("Return")?;
            match operand {
                Some(operand) => printer.indented(|printer| print_node(operand, printer)),
                None => Ok(()),
            }
        }

        NodeKind::BreakStatement => printer.line("Break"),
        NodeKind::ContinueStatement => printer.line("Continue"),

        NodeKind::NewObject {
            class_type,
            array_size,
        } => {
            printer.line(&format!("NewObject ({}) (Type: {})", class_type, node.ty))?;
            match array_size {
                Some(size) => printer.indented(|printer| print_node(size, printer)),
                None => Ok(()),
            }
        }

        NodeKind::Reference(chain) => {
            printer.line(&format!("Reference (Type: {})", node.ty))?;
            printer.indented(|printer| print_chain(chain, printer))
        }

        NodeKind::NumberLiteral(literal) => printer.line(&format!("Number {}", literal)),
        NodeKind::BooleanLiteral(value) => printer.line(&format!("Boolean {}", value)),

        NodeKind::LocalVariableDecl(field) => print_field("LocalVariable", field, printer),

        NodeKind::Assignment {
            reference,
            op,
            expression,
        } => {
            printer.line(&format!("Assignment ({})", op))?;
            printer.indented(|printer| {
                print_chain(reference, printer)?;
                print_node(expression, printer)
            })
        }

        NodeKind::MethodCall { name, arguments, .. } => {
            printer.line(&format!("MethodCall {} (Type: {})", name, node.ty))?;
            printer.indented(|printer| {
                for argument in arguments {
                    print_node(argument, printer)?;
                }
                Ok(())
            })
        }

        NodeKind::ArrayCall {
            array_name, index, ..
        } => {
            printer.line(&format!("ArrayCall {} (Type: {})", array_name, node.ty))?;
            printer.indented(|printer| print_node(index, printer))
        }

        NodeKind::IfStatement {
            condition,
            body,
            else_body,
        } => {
            printer.line("IfStatement")?;
            printer.indented(|printer| {
                printer.line("Condition:")?;
                printer.indented(|printer| print_node(condition, printer))?;
                printer.line("Body:")?;
                printer.indented(|printer| print_block(body, printer))?;
                if let Some(else_body) = else_body {
                    printer.line("ElseBody:")?;
                    printer.indented(|printer| print_node(else_body, printer))?;
                }
                Ok(())
            })
        }

        NodeKind::WhileStatement {
            condition,
            body,
            is_do_while,
        } => {
            let label = if *is_do_while {
                "DoWhileStatement"
            } else {
                "WhileStatement"
            };
            printer.line(label)?;
            printer.indented(|printer| {
                printer.line("Condition:")?;
                printer.indented(|printer| print_node(condition, printer))?;
                printer.line("Body:")?;
                printer.indented(|printer| print_block(body, printer))
            })
        }

        NodeKind::ForStatement {
            init,
            condition,
            update,
            body,
        } => {
            printer.line("ForStatement")?;
            printer.indented(|printer| {
                if let Some(init) = init {
                    printer.line("Initialization:")?;
                    printer.indented(|printer| print_block(init, printer))?;
                }
                if let Some(condition) = condition {
                    printer.line("Condition:")?;
                    printer.indented(|printer| print_node(condition, printer))?;
                }
                if let Some(update) = update {
                    printer.line("Update:")?;
                    printer.indented(|printer| print_block(update, printer))?;
                }
                if let Some(body) = body {
                    printer.line("Body:")?;
                    printer.indented(|printer| print_block(body, printer))?;
                }
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::Lexer, parser::Parser, stream::TokenStream, strtab::StringTable};
    use asciifile::AsciiFile;

    #[test]
    fn prints_a_small_program() {
        let file = AsciiFile::new(
            b"class A { int x; public int get() { return x + 1; } }",
        )
        .unwrap();
        let strtab = StringTable::new();
        let tokens = Lexer::new(&strtab, &file)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let project = Parser::new(TokenStream::new(tokens), &strtab)
            .parse()
            .unwrap();

        let mut out = Vec::new();
        print(&project, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Class A"));
        assert!(text.contains("Field int x"));
        assert!(text.contains("Method int get()"));
        assert!(text.contains("BinaryExpression (+)"));
        // unresolved before analysis
        assert!(text.contains("(Type: ?)"));
    }
}
