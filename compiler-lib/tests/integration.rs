//! End-to-end pipeline tests: lex, parse, analyze, generate, and assert on
//! the emitted C text.

use asciifile::AsciiFile;
use compiler_lib::{
    codegen::{self, CodegenError},
    lexer::Lexer,
    parser::Parser,
    semantics,
    stream::TokenStream,
    strtab::StringTable,
};
use std::collections::HashMap;

fn compile(input: &'static str) -> Result<HashMap<String, String>, String> {
    let strtab = Box::leak(Box::new(StringTable::new()));
    let file = Box::leak(Box::new(AsciiFile::new(input.as_bytes()).unwrap()));
    let tokens = Lexer::new(strtab, file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| error.to_string())?;
    let project = Parser::new(TokenStream::new(tokens), strtab)
        .parse()
        .map_err(|error| error.to_string())?;
    let project = Box::leak(Box::new(project));
    let tables = semantics::check(project, strtab).map_err(|error| error.to_string())?;
    let files = codegen::generate(project, &tables, strtab).map_err(|error| error.to_string())?;
    Ok(files.into_iter().collect())
}

fn compile_ok(input: &'static str) -> HashMap<String, String> {
    compile(input).unwrap_or_else(|error| panic!("compilation failed: {}", error))
}

#[test]
fn hello_world_prints_through_printf() {
    let files = compile_ok(
        "class Main { public static void main() { System.out.println(42); } }",
    );

    let main_c = &files["Main.c"];
    assert!(main_c.contains("int main() {"));
    assert!(main_c.contains("printf(\"%d\\n\", 42);"));
    // no generic System support is emitted
    assert!(!main_c.contains("System"));

    // fixed support files and the build manifest are always present
    assert!(files["__int_array.h"].contains("int *data;"));
    assert!(files["__int_array.c"].contains("calloc(size, sizeof(int))"));
    assert!(files["CMakeLists.txt"].contains("set(CMAKE_C_STANDARD 99)"));
    assert!(files["CMakeLists.txt"].contains("add_executable"));
}

#[test]
fn inheritance_and_override_install_the_derived_function() {
    let files = compile_ok(
        r#"
        class A { public int v() { return 1; } }
        class B extends A { public int v() { return 2; } }
        class M { public static void main() {
            A a; a = new B(); System.out.println(a.v());
        } }
    "#,
    );

    // B embeds A by value as its first member
    let b_h = &files["B.h"];
    assert!(b_h.contains("struct B {\n\tA super;\n"));
    assert!(b_h.contains("#include \"A.h\""));

    // the allocator installs the override into the inherited slot
    let b_c = &files["B.c"];
    assert!(b_c.contains("self->$_function_v = B_v;"));
    assert!(b_c.contains("self->super.$_function_v = B_v;"));

    // the base allocator installs its own function
    let a_c = &files["A.c"];
    assert!(a_c.contains("self->$_function_v = A_v;"));

    // dispatch goes through the per-instance function pointer
    let m_c = &files["M.c"];
    assert!(m_c.contains("B *$_t_0 = $_new_B();"));
    assert!(m_c.contains("a = $_t_0;"));
    assert!(m_c.contains("int $_t_1 = a->$_function_v(a);"));
    assert!(m_c.contains("printf(\"%d\\n\", $_t_1);"));
    // body-only class references are included in the source file
    assert!(m_c.contains("#include \"A.h\""));
    assert!(m_c.contains("#include \"B.h\""));
}

#[test]
fn arrays_carry_their_length() {
    let files = compile_ok(
        r#"
        class M { public static void main() {
            int[] x; x = new int[3]; x[0] = 7;
            System.out.println(x.length); System.out.println(x[0]);
        } }
    "#,
    );

    let m_c = &files["M.c"];
    assert!(m_c.contains("__int_array *x;"));
    assert!(m_c.contains("__int_array *$_t_0 = $_new___int_array(3);"));
    assert!(m_c.contains("x = $_t_0;"));
    assert!(m_c.contains("x->data[0] = 7;"));
    assert!(m_c.contains("printf(\"%d\\n\", x->length);"));
    assert!(m_c.contains("printf(\"%d\\n\", x->data[0]);"));
}

#[test]
fn field_access_climbs_the_inheritance_chain() {
    let files = compile_ok(
        r#"
        class A { int[] arr; }
        class B extends A { }
        class C extends B {
            public void test() { arr[2] = 4; }
        }
    "#,
    );

    let c_c = &files["C.c"];
    assert!(c_c.contains("super->super.super.arr->data[2] = 4;"));
}

#[test]
fn method_calls_climb_with_value_semantics() {
    let files = compile_ok(
        r#"
        class A { public int get() { return 1; } }
        class B extends A {
            public int fetch() { return this.get(); }
        }
    "#,
    );

    // `this.get()` climbs one level: the pointer hop first, then the
    // embedded struct, and the original receiver is passed as $this
    let b_c = &files["B.c"];
    assert!(b_c.contains("int $_t_0 = super->super.$_function_get(super);"));
    assert!(b_c.contains("return $_t_0;"));
}

#[test]
fn dangling_else_attaches_to_the_inner_if() {
    let files = compile_ok(
        r#"
        class C {
            public void a() {}
            public void b() {}
            public void run(boolean p, boolean q) {
                if (p) if (q) a(); else b();
            }
        }
    "#,
    );

    let c_c = &files["C.c"];
    // outer if has only a then-arm: its branch jumps straight to its end
    assert!(c_c.contains("if (!(p)) goto if_end_1;"));
    // inner if carries the else arm
    assert!(c_c.contains("if (!(q)) goto if_else_4;"));
    assert!(c_c.contains("if_else_4:;"));
    assert!(c_c.contains("super->$_function_a(super);"));
    assert!(c_c.contains("super->$_function_b(super);"));
}

#[test]
fn while_and_do_while_layouts() {
    let files = compile_ok(
        r#"
        class C { public void run(int x) {
            while (x > 0) { x -= 1; }
            do x += 1; while (x < 10);
        } }
    "#,
    );

    let c_c = &files["C.c"];
    // while: condition guards the body
    assert!(c_c.contains("while_start_0:;"));
    assert!(c_c.contains("if (!($_t_0)) goto while_end_1;"));
    assert!(c_c.contains("goto while_start_0;"));
    // do-while: the body runs before the first check
    assert!(c_c.contains("while_start_2:;"));
    assert!(c_c.contains("goto while_start_2;"));
}

#[test]
fn empty_for_header_is_an_infinite_loop() {
    let files = compile_ok(
        r#"
        class C { public void run() {
            for (;;) { break; }
        } }
    "#,
    );

    let c_c = &files["C.c"];
    assert!(c_c.contains("for_start_0:;"));
    // no condition check: the body label follows the start label directly
    assert!(c_c.contains("for_start_0:;\n\t\tfor_body_1:;"));
    assert!(c_c.contains("goto for_end_3;"));
    assert!(c_c.contains("goto for_start_0;"));
}

#[test]
fn for_loop_continue_targets_the_update_label() {
    let files = compile_ok(
        r#"
        class C { public void run() {
            for (int i = 0; i < 3; i++) { continue; }
        } }
    "#,
    );

    let c_c = &files["C.c"];
    assert!(c_c.contains("int i;"));
    assert!(c_c.contains("i = 0;"));
    assert!(c_c.contains("for_update_2:;"));
    assert!(c_c.contains("goto for_update_2;"));
    assert!(c_c.contains("i += 1;"));
}

#[test]
fn break_outside_a_loop_is_a_codegen_error() {
    let strtab = Box::leak(Box::new(StringTable::new()));
    let file = Box::leak(Box::new(
        AsciiFile::new(b"class C { public void run() { break; } }").unwrap(),
    ));
    let tokens = Lexer::new(strtab, file)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let project = Parser::new(TokenStream::new(tokens), strtab).parse().unwrap();
    let project = Box::leak(Box::new(project));
    let tables = semantics::check(project, strtab).unwrap();
    match codegen::generate(project, &tables, strtab) {
        Err(CodegenError::BreakOutsideLoop) => (),
        other => panic!("expected a break-outside-loop error, got {:?}", other.is_ok()),
    }
}

#[test]
fn compound_receivers_are_bound_to_a_temporary() {
    let files = compile_ok(
        r#"
        class A { public int get() { return 1; } }
        class B {
            A a;
            public int run() { return this.a.get(); }
        }
    "#,
    );

    let b_c = &files["B.c"];
    // the receiver expression `super->a` is not a bare identifier: bind it
    assert!(b_c.contains("A *$_t_0 = super->a;"));
    assert!(b_c.contains("int $_t_1 = $_t_0->$_function_get($_t_0);"));
}

#[test]
fn unsigned_shift_and_literal_lowering() {
    let files = compile_ok(
        r#"
        class C { public int run() { return 0b1010 + 0x1F + 1_000; } }
    "#,
    );

    let c_c = &files["C.c"];
    assert!(c_c.contains("int $_t_0 = 10 + 0x1F;"));
    assert!(c_c.contains("int $_t_1 = $_t_0 + 1000;"));
}

#[test]
fn header_includes_cover_field_param_and_return_types() {
    let files = compile_ok(
        r#"
        class Dep {}
        class Ret {}
        class Par {}
        class C {
            Dep dep;
            public Ret run(Par par) { return new Ret(); }
        }
    "#,
    );

    let c_h = &files["C.h"];
    assert!(c_h.contains("#include \"Dep.h\""));
    assert!(c_h.contains("#include \"Ret.h\""));
    assert!(c_h.contains("#include \"Par.h\""));
    // its own struct fields
    assert!(c_h.contains("\tDep *dep;\n"));
    assert!(c_h.contains("(*$_function_run)(void *, Par *)"));
    assert!(c_h.contains("C *$_new_C();"));
}

#[test]
fn allocator_defaults_every_field() {
    let files = compile_ok(
        r#"
        class A { int x; boolean flag; int[] data; A next; }
    "#,
    );

    let a_c = &files["A.c"];
    assert!(a_c.contains("A *self = (A *) malloc(sizeof(A));"));
    assert!(a_c.contains("self->x = 0;"));
    assert!(a_c.contains("self->flag = false;"));
    assert!(a_c.contains("self->data = NULL;"));
    assert!(a_c.contains("self->next = NULL;"));
    assert!(a_c.contains("return self;"));

    // the self-referential field uses the struct tag in the header
    assert!(files["A.h"].contains("struct A *next;"));
}

#[test]
fn inherited_fields_are_initialized_through_the_super_chain() {
    let files = compile_ok(
        r#"
        class A { int x; }
        class B extends A { int y; }
    "#,
    );

    let b_c = &files["B.c"];
    assert!(b_c.contains("self->y = 0;"));
    assert!(b_c.contains("self->super.x = 0;"));
}

#[test]
fn casts_lower_to_c_casts() {
    let files = compile_ok(
        r#"
        class A {}
        class B extends A {
            public B down(A a) { return (B) a; }
        }
    "#,
    );

    let b_c = &files["B.c"];
    assert!(b_c.contains("B *$_t_0 = (B *) a;"));
}

#[test]
fn methods_without_parameters_still_take_the_receiver() {
    let files = compile_ok(
        r#"
        class A { public void ping() {} }
    "#,
    );

    let a_h = &files["A.h"];
    assert!(a_h.contains("void A_ping(\n\tvoid *$this\n);"));
    assert!(a_h.contains("\tvoid (*$_function_ping)(void *);"));
}

#[test]
fn emitted_headers_are_guarded() {
    let files = compile_ok("class Solo {}");
    let h = &files["Solo.h"];
    assert!(h.starts_with("#ifndef COMPILED_Solo_H\n#define COMPILED_Solo_H\n"));
    assert!(h.contains("#include <stdbool.h>"));
    assert!(h.contains("#include \"__int_array.h\""));
    assert!(h.trim_end().ends_with("#endif //COMPILED_Solo_H"));
}
