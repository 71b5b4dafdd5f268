#![warn(rust_2018_idioms)]

//! `mj2c` compiles a MiniJava source file to a directory of portable C
//! translation units plus a CMake build manifest.

use asciifile::AsciiFile;
use compiler_lib::{
    codegen,
    context::Context,
    emitter::Emitter,
    lexer::{Lexer, TokenKind},
    parser::Parser,
    print, semantics,
    stream::TokenStream,
    strtab::StringTable,
};
use diagnostics::{Diagnostics, MessageLevel};
use log::debug;
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};
use structopt::StructOpt;
use termcolor::{ColorChoice, StandardStream};

#[derive(StructOpt)]
#[structopt(name = "mj2c", about = "MiniJava to C compiler")]
struct Opt {
    /// Echo the input file to stdout and exit
    #[structopt(long = "echo")]
    echo: bool,

    /// Dump the significant tokens of the input and exit
    #[structopt(long = "lextest")]
    lextest: bool,

    /// Pretty-print the analyzed syntax tree and exit
    #[structopt(long = "print-ast")]
    print_ast: bool,

    /// Stop after semantic analysis
    #[structopt(long = "check")]
    check: bool,

    /// Directory the C translation units are written to
    #[structopt(
        short = "o",
        long = "output-dir",
        default_value = "compile",
        parse(from_os_str)
    )]
    output_dir: PathBuf,

    #[structopt(name = "FILE", parse(from_os_str))]
    file: PathBuf,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    std::process::exit(run(&opt));
}

fn run(opt: &Opt) -> i32 {
    let input = match fs::read(&opt.file) {
        Ok(input) => input,
        Err(error) => {
            eprintln!("error: could not open {}: {}", opt.file.display(), error);
            return 1;
        }
    };

    if opt.echo {
        return match io::stdout().write_all(&input) {
            Ok(()) => 0,
            Err(error) => {
                eprintln!("error: could not write to stdout: {}", error);
                1
            }
        };
    }

    let stderr = StandardStream::stderr(ColorChoice::Auto);

    let file = match AsciiFile::new(&input) {
        Ok(file) => file,
        Err(error) => {
            let diagnostics = Diagnostics::new(Box::new(stderr));
            diagnostics.error(&error, None);
            diagnostics.write_statistics();
            return 1;
        }
    };

    let context = Context::new(&file, Box::new(stderr));
    compile(opt, &context)
}

fn compile(opt: &Opt, context: &Context<'_>) -> i32 {
    let strtab = StringTable::new();

    debug!("lexing {}", opt.file.display());
    let tokens = match Lexer::new(&strtab, context.file).collect::<Result<Vec<_>, _>>() {
        Ok(tokens) => tokens,
        Err(error) => {
            context.diagnostics.emit_with_source_snippet(
                MessageLevel::Error,
                &error.data,
                error.span,
                context.file,
            );
            context.diagnostics.write_statistics();
            return 1;
        }
    };

    if opt.lextest {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        for token in &tokens {
            match token.data {
                TokenKind::Whitespace | TokenKind::Comment => continue,
                kind => {
                    if writeln!(stdout, "{}", kind).is_err() {
                        return 1;
                    }
                }
            }
        }
        return 0;
    }

    debug!("parsing");
    let project = match Parser::new(TokenStream::new(tokens), &strtab).parse() {
        Ok(project) => project,
        Err(error) => {
            match error.span() {
                Some(span) => context.diagnostics.emit_with_source_snippet(
                    MessageLevel::Error,
                    error.data(),
                    span,
                    context.file,
                ),
                None => context.diagnostics.error(error.data(), None),
            }
            context.diagnostics.write_statistics();
            return 1;
        }
    };

    debug!("running semantic analysis");
    let tables = match semantics::check(&project, &strtab) {
        Ok(tables) => tables,
        Err(error) => {
            context.diagnostics.error(&error, None);
            context.diagnostics.write_statistics();
            return 1;
        }
    };

    if opt.print_ast {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        return match print::pretty::print(&project, &mut stdout) {
            Ok(()) => 0,
            Err(error) => {
                context
                    .diagnostics
                    .error(&format!("could not write to stdout: {}", error), None);
                1
            }
        };
    }

    if opt.check {
        context.diagnostics.write_statistics();
        return 0;
    }

    debug!("generating C translation units");
    let files = match codegen::generate(&project, &tables, &strtab) {
        Ok(files) => files,
        Err(error) => {
            context.diagnostics.error(&error, None);
            context.diagnostics.write_statistics();
            return 1;
        }
    };

    if let Err(error) = Emitter::new(&opt.output_dir).write(&files) {
        context.diagnostics.error(&error, None);
        return 1;
    }

    0
}
