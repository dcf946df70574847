//! SysLang Compiler
//!
//! An ahead-of-time compiler for the SysLang systems language,
//! targeting x86-64 and AArch64 assembly.

use std::fs;
use std::path::PathBuf;

use clap::{Parser as ClapParser, ValueEnum};
use thiserror::Error;

mod codegen;
mod errors;
mod fmt;
mod ir;
mod lexer;
mod optimizer;
mod parser;
mod symtab;

use errors::{report_diagnostics, Diagnostic};
use ir::{lower_program, Architecture, OutputFormat};
use lexer::Lexer;
use parser::Parser;

#[derive(ClapParser)]
#[command(name = "syclang")]
#[command(version, about = "The SysLang systems language compiler", long_about = None)]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Target architecture
    #[arg(long, value_enum, default_value = "x64")]
    arch: ArchArg,

    /// Output file
    #[arg(long, default_value = "output.s")]
    output: PathBuf,

    /// Output container format
    #[arg(long, value_enum, default_value = "elf")]
    format: FormatArg,

    /// Emit the IR textual dump instead of assembly
    #[arg(long)]
    ir: bool,

    /// Optimisation level
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    opt: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum ArchArg {
    #[value(name = "x64", alias = "x86_64")]
    X64,
    #[value(name = "arm64", alias = "aarch64")]
    Arm64,
}

impl From<ArchArg> for Architecture {
    fn from(arch: ArchArg) -> Self {
        match arch {
            ArchArg::X64 => Architecture::X64,
            ArchArg::Arm64 => Architecture::Arm64,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Elf,
    Pe,
    Efi,
    Raw,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Elf => OutputFormat::Elf,
            FormatArg::Pe => OutputFormat::Pe,
            FormatArg::Efi => OutputFormat::Efi,
            FormatArg::Raw => OutputFormat::Raw,
        }
    }
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("compilation failed with {0} error(s)")]
    Failed(usize),
}

fn run(cli: Cli) -> Result<(), DriverError> {
    let source = fs::read_to_string(&cli.input).map_err(|source| DriverError::Read {
        path: cli.input.clone(),
        source,
    })?;
    let filename = cli.input.display().to_string();

    let check = |errors: Vec<Diagnostic>| -> Result<(), DriverError> {
        if errors.is_empty() {
            Ok(())
        } else {
            report_diagnostics(&filename, &source, &errors);
            Err(DriverError::Failed(errors.len()))
        }
    };

    println!("Lexical analysis...");
    let tokens = Lexer::new(&source).tokenize();
    println!("  {} tokens", tokens.len());

    println!("Parsing...");
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    check(parser.take_errors())?;
    println!("  {} declarations", program.decls.len());

    let arch = Architecture::from(cli.arch);
    println!("Generating IR...");
    let (mut module, lower_errors) = lower_program(&program, arch, cli.format.into());
    check(lower_errors)?;
    println!("  {} functions", module.functions.len());

    if cli.opt > 0 {
        println!("Optimising at O{}...", cli.opt);
        let stats = optimizer::optimize(&mut module, cli.opt);
        println!(
            "  {} folded, {} eliminated, {} merged",
            stats.folded, stats.eliminated, stats.merged
        );
    }

    let (output, backend_errors) = if cli.ir {
        println!("Writing IR dump...");
        (module.dump(), Vec::new())
    } else {
        println!(
            "Code generation for {}...",
            match arch {
                Architecture::X64 => "x64",
                Architecture::Arm64 => "arm64",
            }
        );
        codegen::emit(&module)
    };

    fs::write(&cli.output, &output).map_err(|source| DriverError::Write {
        path: cli.output.clone(),
        source,
    })?;
    println!("Output written to {}", cli.output.display());

    check(backend_errors)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
