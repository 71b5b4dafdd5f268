//! Reference-chain lowering, the subtlest part of the generator.
//!
//! A chain walks left to right carrying the current type and the current
//! class table. Field heads climb the inheritance chain with `super->` /
//! `super.` hops (the first hop dereferences the receiver pointer, the rest
//! walk embedded structs by value), and the `is_pointer` flag decides
//! between `->` and `.` for every subsequent accessor.

use super::{c_type, CodegenError, CodegenResult};
use crate::{
    ast::{AstKind, AstNode, NodeKind, ReferenceChain},
    strtab::Symbol,
    symtab::SymbolTable,
};
use itertools::Itertools;
use std::rc::Rc;

use super::tac::TacGenerator;

/// A lowered receiver that is a bare name can be passed to a call directly;
/// anything compound gets bound to a temporary first.
fn is_plain_identifier(expr: &str) -> bool {
    let mut chars = expr.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl<'f, 'g> TacGenerator<'f, 'g> {
    pub(super) fn gen_chain(&mut self, chain: &ReferenceChain<'f>) -> CodegenResult<String> {
        if self.gen_print(chain)? {
            return Ok(String::new());
        }

        let mut current_table: Option<Rc<SymbolTable<'f>>> = None;
        let mut current_type: Option<Symbol<'f>> = None;
        let mut output = String::new();
        let mut is_pointer = true;

        for (index, entry) in chain.chain.iter().enumerate() {
            let lexeme = entry.token.data.lexeme();

            if index == 0 {
                if lexeme == "this" {
                    output.push_str("super");
                    current_type = Some(self.class.name);
                    current_table = self.tables.get(self.class.name).cloned();
                    continue;
                }

                match entry.payload.as_deref() {
                    Some(payload) if payload.ast_kind() == AstKind::MethodCall => {
                        // implicit receiver: the call resolves on `this`
                        output.push_str("super");
                        current_type = Some(self.class.name);
                    }
                    Some(payload) if payload.ast_kind() == AstKind::ArrayCall => {
                        match self.lookup(self.intern_lexeme(lexeme)) {
                            Some(local_type) => {
                                current_type = Some(local_type);
                            }
                            None => {
                                let (hops, field_type) =
                                    self.lookup_class_nested_count(self.intern_lexeme(lexeme));
                                for hop in 0..hops {
                                    output.push_str(if hop == 0 { "super->" } else { "super." });
                                }
                                if field_type.is_some() {
                                    current_type = field_type;
                                }
                            }
                        }
                        output = self.gen_array_call(payload, &output)?;
                        continue;
                    }
                    Some(payload) if payload.ast_kind() == AstKind::NewObject => {
                        output = self.gen_new_object(payload)?;
                        let ty = payload.ty.resolved();
                        current_type = Some(ty);
                        if ty != "int[]" {
                            current_table = Some(self.class_table_of(ty)?);
                        }
                        continue;
                    }
                    Some(_) => unreachable!("chains only carry call, index and new payloads"),
                    None => {
                        let name = self.intern_lexeme(lexeme);
                        match self.lookup(name) {
                            Some(local_type) => {
                                output = lexeme.to_string();
                                current_type = Some(local_type);
                            }
                            None => {
                                let (hops, field_type) = self.lookup_class_nested_count(name);
                                for hop in 0..hops {
                                    output.push_str(if hop == 0 { "super->" } else { "super." });
                                }
                                output.push_str(lexeme);
                                if field_type.is_some() {
                                    current_type = field_type;
                                }
                            }
                        }
                    }
                }

                match current_type {
                    Some(ty) if ty == "int" || ty == "int[]" || ty == "boolean" => continue,
                    _ => {
                        let ty = current_type.unwrap_or_else(|| self.intern_lexeme(""));
                        current_table = Some(self.class_table_of(ty)?);
                        if entry.payload.is_none() {
                            continue;
                        }
                    }
                }
            }

            let member = self.intern_lexeme(lexeme);

            // `int[]` has a single member.
            if current_type.map_or(false, |ty| ty == "int[]")
                && lexeme == "length"
                && entry.payload.is_none()
            {
                current_type = Some(self.intern_lexeme("int"));
                output.push_str("->length");
                continue;
            }

            let before_climb = output.clone();
            let mut climbed = false;
            let mut found = None;

            while found.is_none() {
                let table = match current_table.clone() {
                    Some(table) => table,
                    None => break,
                };
                if let Some(def) = table.find(member) {
                    found = Some(def.clone());
                    break;
                }
                match table.parent() {
                    Some(parent) => {
                        output.push_str(if is_pointer { "->" } else { "." });
                        output.push_str("super");
                        current_type = parent.class_name();
                        is_pointer = false;
                        climbed = true;
                        current_table = Some(Rc::clone(parent));
                    }
                    None => current_table = None,
                }
            }

            let found = match found {
                Some(def) => def,
                None => {
                    return Err(CodegenError::FieldNotFound {
                        name: lexeme.to_string(),
                    });
                }
            };

            match entry.payload.as_deref() {
                None => {
                    output.push_str(if is_pointer { "->" } else { "." });
                    output.push_str(lexeme);
                    is_pointer = true;

                    current_type = Some(found.ty);
                    current_table = self.tables.get(found.ty).cloned();
                }
                Some(payload) => {
                    match payload.ast_kind() {
                        AstKind::MethodCall => {
                            output = self.gen_method_call(payload, climbed, &output, &before_climb)?;
                        }
                        AstKind::ArrayCall => {
                            output.push_str(if is_pointer { "->" } else { "." });
                            output = self.gen_array_call(payload, &output)?;
                        }
                        _ => {
                            output = self.gen_node(payload)?;
                        }
                    }
                    current_type = Some(payload.ty.resolved());
                    is_pointer = true;
                    current_table = self.tables.get(payload.ty.resolved()).cloned();
                }
            }
        }

        Ok(output)
    }

    fn class_table_of(&self, ty: Symbol<'f>) -> CodegenResult<Rc<SymbolTable<'f>>> {
        self.tables
            .get(ty)
            .cloned()
            .ok_or_else(|| CodegenError::InvalidClass { ty: ty.to_string() })
    }

    /// `new ClassName()` and `new int[size]` allocations.
    fn gen_new_object(&mut self, payload: &AstNode<'f>) -> CodegenResult<String> {
        let (class_type, array_size) = match &payload.kind {
            NodeKind::NewObject {
                class_type,
                array_size,
            } => (*class_type, array_size.as_deref()),
            _ => unreachable!("gen_new_object lowers NewObject payloads"),
        };

        let temp = self.new_temp();
        match array_size {
            Some(size) if class_type == "int" => {
                let value = self.gen_node(size)?;
                self.emit(&format!(
                    "__int_array *{} = $_new___int_array({})",
                    temp, value
                ));
            }
            _ => {
                self.record_new_object(class_type);
                self.emit(&format!(
                    "{} *{} = $_new_{}()",
                    class_type, temp, class_type
                ));
            }
        }
        Ok(temp)
    }

    /// Array accesses read through the data pointer of `__int_array`.
    fn gen_array_call(&mut self, payload: &AstNode<'f>, caller: &str) -> CodegenResult<String> {
        let (array_name, index) = match &payload.kind {
            NodeKind::ArrayCall {
                array_name, index, ..
            } => (*array_name, index),
            _ => unreachable!("gen_array_call lowers ArrayCall payloads"),
        };

        let index = self.gen_node(index)?;
        Ok(format!("{}{}->data[{}]", caller, array_name, index))
    }

    /// Dynamic dispatch through the per-instance function pointer. The
    /// receiver is evaluated once: compound receivers get bound to a
    /// temporary, and after a hierarchy climb the original (pre-climb)
    /// receiver is what gets passed as `$this`.
    fn gen_method_call(
        &mut self,
        payload: &AstNode<'f>,
        climbed: bool,
        caller: &str,
        caller_before_climb: &str,
    ) -> CodegenResult<String> {
        let (name, arguments, caller_type) = match &payload.kind {
            NodeKind::MethodCall {
                name,
                arguments,
                caller_type,
            } => (*name, arguments, caller_type),
            _ => unreachable!("gen_method_call lowers MethodCall payloads"),
        };

        let (callee, receiver_arg) = if is_plain_identifier(caller) || climbed {
            (caller.to_string(), caller_before_climb.to_string())
        } else {
            let temp = self.new_temp();
            let receiver_type = caller_type
                .get()
                .expect("caller_type was attached during semantic analysis");
            self.emit(&format!("{}{} = {}", c_type(receiver_type), temp, caller));
            (temp.clone(), temp)
        };

        let mut argument_temps = vec![receiver_arg];
        for argument in arguments {
            argument_temps.push(self.gen_node(argument)?);
        }
        let argument_list = argument_temps.iter().join(", ");

        let method = format!(
            "{}{}$_function_{}",
            callee,
            if climbed { "." } else { "->" },
            name
        );

        let return_type = payload.ty.resolved();
        if return_type != "void" {
            let result = self.new_temp();
            self.emit(&format!(
                "{}{} = {}({})",
                c_type(return_type),
                result,
                method,
                argument_list
            ));
            Ok(result)
        } else {
            self.emit(&format!("{}({})", method, argument_list));
            Ok(String::new())
        }
    }

    /// The exact chain `System.out.{print,println,printf}(x)` with an `int`
    /// argument rewrites to `printf`; no generic `System` support exists in
    /// the emitted code.
    fn gen_print(&mut self, chain: &ReferenceChain<'f>) -> CodegenResult<bool> {
        if chain.chain.len() != 3
            || chain.chain[0].token.data.lexeme() != "System"
            || chain.chain[1].token.data.lexeme() != "out"
        {
            return Ok(false);
        }

        let printer = chain.chain[2].token.data.lexeme();
        if printer != "print" && printer != "println" && printer != "printf" {
            return Ok(false);
        }

        let arguments = match chain.chain[2].payload.as_deref() {
            Some(payload) => match &payload.kind {
                NodeKind::MethodCall { arguments, .. } => arguments,
                _ => return Ok(false),
            },
            None => return Ok(false),
        };

        if arguments.len() != 1 || arguments[0].ty.resolved() != "int" {
            return Ok(false);
        }

        let format = if printer == "println" { "%d\\n" } else { "%d" };
        let value = self.gen_node(&arguments[0])?;
        self.emit(&format!("printf(\"{}\", {})", format, value));
        Ok(true)
    }
}
