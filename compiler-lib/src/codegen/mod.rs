//! Lowering of the analyzed project to C translation units.
//!
//! The object model: each class becomes a struct whose first field embeds
//! the superclass by value, so a derived object is pointer-castable to its
//! ancestors. Methods live behind per-instance function pointers installed
//! by the `$_new_<Class>` allocator, which realizes overriding by writing
//! the derived function into the inherited slot.

pub mod chain;
pub mod runtime;
pub mod tac;

use crate::{
    ast::{Class, Field, Method, Project, TypeKind},
    strtab::{StringTable, Symbol},
    symtab::ClassTables,
};
use failure::Fail;
use log::debug;
use std::collections::BTreeSet;

use self::tac::TacGenerator;

#[derive(Debug, Fail)]
pub enum CodegenError {
    #[fail(display = "Failed to call break, break statement must be called inside a loop")]
    BreakOutsideLoop,
    #[fail(
        display = "Failed to call continue, continue statement must be called inside a loop"
    )]
    ContinueOutsideLoop,
    #[fail(display = "Type '{}' is not a valid class.", ty)]
    InvalidClass { ty: String },
    #[fail(display = "Field '{}' not found in class hierarchy.", name)]
    FieldNotFound { name: String },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// A generated file: name (relative to the output directory) and contents.
pub type GeneratedFile = (String, String);

/// Generates every output file for the project: one `.h`/`.c` pair per
/// class in declaration order, then the array support pair, then the build
/// manifest.
pub fn generate<'f, 's>(
    project: &Project<'f>,
    tables: &ClassTables<'f>,
    strtab: &'s StringTable<'f>,
) -> CodegenResult<Vec<GeneratedFile>> {
    let mut files = Vec::new();

    for class in project.classes() {
        debug!("generating code for class {}", class.name);
        let mut included = BTreeSet::new();
        files.push((
            format!("{}.h", class.name),
            generate_class_header(class, &mut included),
        ));
        files.push((
            format!("{}.c", class.name),
            generate_class_source(project, tables, strtab, class, &mut included)?,
        ));
    }

    files.push(("__int_array.h".to_string(), runtime::INT_ARRAY_H.to_string()));
    files.push(("__int_array.c".to_string(), runtime::INT_ARRAY_C.to_string()));
    files.push(("CMakeLists.txt".to_string(), runtime::CMAKE_LISTS.to_string()));

    Ok(files)
}

/// Primitive and array types live in fixed headers; everything else needs
/// `<name>.h`.
fn should_include_header(ty: Symbol<'_>) -> bool {
    ty != "int" && ty != "boolean" && ty != "bool" && ty != "int[]" && ty != "void"
}

/// MiniJava type → C type, with the spacing used in declarations
/// (`int x`, `MyClass *x`).
pub(crate) fn c_type(ty: Symbol<'_>) -> String {
    match ty.as_str() {
        "boolean" => "bool ".to_string(),
        "int[]" => "__int_array *".to_string(),
        "int" => "int ".to_string(),
        "void" => "void ".to_string(),
        class => format!("{} *", class),
    }
}

fn c_type_of(kind: TypeKind, lexeme: Symbol<'_>) -> String {
    match kind {
        TypeKind::Class => format!("{} *", lexeme),
        TypeKind::Boolean => "bool ".to_string(),
        TypeKind::Int => "int ".to_string(),
        TypeKind::IntArray => "__int_array *".to_string(),
        TypeKind::Void => "void ".to_string(),
    }
}

pub(crate) fn field_c_type(field: &Field<'_>) -> String {
    c_type_of(field.kind, field.type_lexeme)
}

fn method_c_type(method: &Method<'_>) -> String {
    c_type_of(method.kind, method.type_lexeme)
}

/// The full C signature of a method. Every non-main method takes the
/// receiver as leading `void *$this`; `main` compiles to `int main()`.
fn method_signature<'f>(
    class: &Class<'f>,
    method: &Method<'f>,
    included: &mut BTreeSet<Symbol<'f>>,
) -> String {
    if method.is_main {
        return "int main()".to_string();
    }
    included.insert(method.type_lexeme);

    let mut sign = method_c_type(method);
    sign.push_str(&format!("{}_{}", class.name, method.name));

    if method.params.is_empty() {
        sign.push_str("(\n\tvoid *$this\n)");
        return sign;
    }

    sign.push_str("(\n\tvoid *$this,\n\t");
    let count = method.params.len();
    for (index, param) in method.params.iter().enumerate() {
        included.insert(param.type_lexeme);

        sign.push_str(&field_c_type(param));
        sign.push_str(param.name.as_str());

        if index != count - 1 {
            sign.push_str(",\n\t");
        } else {
            sign.push_str("\n)");
        }
    }
    sign
}

/// The struct field holding the method's function pointer, keyed by name so
/// an overriding class installs into the same slot.
fn method_pointer_field<'f>(
    method: &Method<'f>,
    included: &mut BTreeSet<Symbol<'f>>,
) -> String {
    let mut sign = format!("\t{}", method_c_type(method));
    sign.push_str(&format!("(*$_function_{})", method.name));

    if method.params.is_empty() {
        sign.push_str("(void *)");
        return sign;
    }

    sign.push_str("(void *, ");
    let count = method.params.len();
    for (index, param) in method.params.iter().enumerate() {
        sign.push_str(&field_c_type(param));

        if index != count - 1 {
            sign.push_str(", ");
        } else {
            sign.push_str(")");
        }

        if param.kind == TypeKind::Class {
            included.insert(param.type_lexeme);
        }
    }
    sign
}

/// The struct body: embedded superclass first, then the owned fields, then
/// one function pointer per method.
fn write_struct_fields<'f>(
    source: &mut String,
    class: &Class<'f>,
    included: &mut BTreeSet<Symbol<'f>>,
) {
    if let Some(extends) = class.extends {
        source.push_str(&format!("\t{} super;\n", extends));
        included.insert(extends);
    }

    for field in class.fields() {
        if field.type_lexeme == class.name {
            // a self-referential field needs the struct tag
            source.push_str(&format!(
                "\tstruct {} *{};\n",
                class.name, field.name
            ));
        } else {
            source.push_str(&format!("\t{}{};\n", field_c_type(field), field.name));
        }

        if field.kind == TypeKind::Class {
            included.insert(field.type_lexeme);
        }
    }

    source.push('\n');

    for method in class.methods() {
        if method.is_main {
            continue;
        }
        source.push_str(&method_pointer_field(method, included));
        source.push_str(";\n");
    }
}

fn generate_class_header<'f>(class: &Class<'f>, included: &mut BTreeSet<Symbol<'f>>) -> String {
    let guard = format!("COMPILED_{}_H", class.name);
    let mut header = format!("#ifndef {}\n#define {}\n\n", guard, guard);

    header.push_str("#include <stdbool.h>\n");
    header.push_str("#include \"__int_array.h\"\n");
    let include_start = header.len();

    header.push_str(&format!("struct {} {{\n", class.name));
    write_struct_fields(&mut header, class, included);
    header.push_str("};\n\n");

    header.push_str(&format!("typedef struct {} {};\n\n", class.name, class.name));

    for method in class.methods() {
        if method.is_main {
            continue;
        }
        header.push_str(&method_signature(class, method, included));
        header.push_str(";\n\n");
    }

    header.push_str(&format!("{} *$_new_{}();\n\n", class.name, class.name));

    header.push_str(&format!("#endif //{}\n", guard));

    let mut include_headers = String::new();
    for include in included.iter() {
        if *include == class.name || !should_include_header(*include) {
            continue;
        }
        include_headers.push_str(&format!("#include \"{}.h\"\n", include));
    }
    include_headers.push('\n');
    header.insert_str(include_start, &include_headers);

    header
}

/// The global function implementing `name` for instances of `class`:
/// the class's own version if it declares one, otherwise the nearest
/// ancestor's.
fn method_reference_name<'f>(
    project: &Project<'f>,
    class: &Class<'f>,
    name: Symbol<'f>,
) -> String {
    if class.contains_method(name) {
        return format!("{}_{}", class.name, name);
    }
    if let Some(parent) = class.extends.and_then(|extends| project.class(extends)) {
        return method_reference_name(project, parent, name);
    }
    String::new()
}

fn field_default_value(field: &Field<'_>) -> &'static str {
    match field.kind {
        TypeKind::Int => "0",
        TypeKind::Boolean => "false",
        _ => "NULL",
    }
}

fn write_allocator_field_inits<'f>(
    source: &mut String,
    accessor: &str,
    project: &Project<'f>,
    class: &Class<'f>,
) {
    for field in class.fields() {
        source.push_str(&format!(
            "\t{}{} = {};\n",
            accessor,
            field.name,
            field_default_value(field)
        ));
    }
    if let Some(parent) = class.extends.and_then(|extends| project.class(extends)) {
        write_allocator_field_inits(source, &format!("{}super.", accessor), project, parent);
    }
}

/// Installs the function pointers, resolving each slot against `root` so
/// overridden methods point at the derived implementation.
fn write_allocator_function_inits<'f>(
    source: &mut String,
    accessor: &str,
    project: &Project<'f>,
    class: &Class<'f>,
    root: &Class<'f>,
) {
    for method in class.methods() {
        if method.is_main {
            continue;
        }
        source.push_str(&format!(
            "\t{}$_function_{} = {};\n",
            accessor,
            method.name,
            method_reference_name(project, root, method.name)
        ));
    }
    if let Some(parent) = class.extends.and_then(|extends| project.class(extends)) {
        write_allocator_function_inits(
            source,
            &format!("{}super.", accessor),
            project,
            parent,
            root,
        );
    }
}

fn write_allocator<'f>(source: &mut String, project: &Project<'f>, class: &Class<'f>) {
    source.push_str(&format!("{} *$_new_{}() {{\n", class.name, class.name));
    source.push_str(&format!(
        "\t{} *self = ({} *) malloc(sizeof({}));\n\n",
        class.name, class.name, class.name
    ));
    write_allocator_field_inits(source, "self->", project, class);
    source.push('\n');
    write_allocator_function_inits(source, "self->", project, class, class);
    source.push_str("\treturn self;\n");
    source.push_str("}\n\n");
}

fn generate_class_source<'f, 's>(
    project: &Project<'f>,
    tables: &ClassTables<'f>,
    strtab: &'s StringTable<'f>,
    class: &Class<'f>,
    included: &mut BTreeSet<Symbol<'f>>,
) -> CodegenResult<String> {
    let mut source = format!(
        "#include <stdlib.h>\n#include <stdio.h>\n#include \"{}.h\"\n",
        class.name
    );
    let include_start = source.len();
    source.push('\n');

    write_allocator(&mut source, project, class);

    let mut types_used = BTreeSet::new();

    for method in class.methods() {
        source.push_str(&method_signature(class, method, included));
        source.push_str(" {\n");
        if !method.is_main {
            // alias the receiver; `super` then names the receiver struct
            source.push_str(&format!(
                "\t{} *super = ({} *) $this;\n\n",
                class.name, class.name
            ));
        }

        let mut generator = TacGenerator::new(project, tables, class, strtab, &mut types_used);
        generator.open_block();
        if !method.is_main {
            for param in &method.params {
                generator.add_variable(param.name, param.type_lexeme);
            }
        }
        generator.gen_block(&method.body)?;
        generator.close_block();
        source.push_str(&generator.into_code());
        source.push_str("}\n\n");
    }

    if !types_used.is_empty() {
        let mut include_headers = String::new();
        for ty in &types_used {
            if *ty == class.name || included.contains(ty) || !should_include_header(*ty) {
                continue;
            }
            include_headers.push_str(&format!("#include \"{}.h\"\n", ty));
        }
        include_headers.push('\n');
        source.insert_str(include_start, &include_headers);
    }

    Ok(source)
}
