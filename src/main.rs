//! Devin interpreter CLI
//!
//! The `devc` command drives the pipeline: tokenize, parse, check, run.

use clap::{Parser, Subcommand};
use devin::eval::{self, State};
use devin::{lexer, parser, typeck};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "devc")]
#[command(version = devin::VERSION)]
#[command(about = "The Devin interpreter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Devin source file
    Run {
        /// Input file to run
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Check a file for errors without running it
    Check {
        /// Input file to check
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a file and print the AST
    Parse {
        /// Input file to parse
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print the canonical source rendering instead of the tree
        #[arg(long)]
        render: bool,
    },

    /// Tokenize a file and print tokens
    Tokenize {
        /// Input file to tokenize
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { input } => {
            let source = read_source(&input)?;
            let typed = check_source(&source)?;

            let mut state = State::predefined();
            match eval::evaluate(&typed, &mut state) {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Runtime error at {}: {}", e.span, e.kind);
                    eprintln!("  {}", e.span.text(&source));
                    Err(miette::miette!("Evaluation failed"))
                }
            }
        }

        Commands::Check { input } => {
            let source = read_source(&input)?;
            let typed = check_source(&source)?;
            for warning in &typed.warnings {
                eprintln!("Warning: {}", warning);
            }
            println!("No errors found!");
            Ok(())
        }

        Commands::Parse { input, render } => {
            let source = read_source(&input)?;
            let (program, errors) = parser::parse(&source);

            if !errors.is_empty() {
                for err in &errors {
                    eprintln!("Parse error: {}", err);
                }
                return Err(miette::miette!("Found {} parse error(s)", errors.len()));
            }

            if render {
                println!("{}", program);
            } else {
                println!("{:#?}", program);
            }
            Ok(())
        }

        Commands::Tokenize { input } => {
            let source = read_source(&input)?;
            let (tokens, errors) = lexer::lex(&source);

            for token in &tokens {
                println!(
                    "{:>4}..{:<4} {:12} {:?}",
                    token.span.start,
                    token.span.end,
                    format!("{:?}", token.kind),
                    token.text(&source)
                );
            }

            if !errors.is_empty() {
                eprintln!("\nLexer errors:");
                for err in errors {
                    eprintln!("  {}", err);
                }
            }

            Ok(())
        }
    }
}

fn read_source(input: &PathBuf) -> miette::Result<String> {
    fs::read_to_string(input).map_err(|e| miette::miette!("Failed to read file: {}", e))
}

/// Parse and type check, reporting anything fatal
fn check_source(source: &str) -> miette::Result<typeck::TypedProgram> {
    let (program, parse_errors) = parser::parse(source);
    if !parse_errors.is_empty() {
        for err in &parse_errors {
            eprintln!("Parse error: {}", err);
        }
        return Err(miette::miette!("Found {} parse error(s)", parse_errors.len()));
    }

    let (typed, diagnostics) = typeck::check(program);
    if !diagnostics.is_empty() {
        for d in &diagnostics {
            eprintln!("Type error at {}: {}", d.span, d.kind);
        }
        return Err(miette::miette!("Found {} type error(s)", diagnostics.len()));
    }

    Ok(typed)
}
