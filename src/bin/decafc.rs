//! the main compiler binary. takes a source file (standard input when
//! omitted) and an optional output format (MIPS assembly by default).
//!
//! run with `--help` for more info.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use decaf::back;
use decaf::front::*;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file; standard input when omitted
    file: Option<String>,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Asm)]
    out: Output,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// the list of tokens
    Tokens,
    /// the ast data structure
    Ast,
    /// the three-address-code stream
    Tac,
    /// the resulting assembly code
    Asm,
}

fn main() -> ExitCode {
    use Output::*;
    let args = Args::parse();

    let input = match &args.file {
        Some(path) => fs::read_to_string(path).expect("file should be readable"),
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .expect("input characters should be utf8");
            input
        }
    };

    match args.out {
        Tokens => {
            let mut lexer = lex::Lexer::new(&input);
            loop {
                match lexer.next() {
                    Ok(Some(token)) => println!("{token}"),
                    Ok(None) => break,
                    Err(err) => {
                        eprintln!("{err}");
                        return ExitCode::FAILURE;
                    }
                }
            }
        }
        Ast => match parse(&input) {
            Ok(program) => println!("{program:#?}"),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        Tac => {
            let program = match parse(&input) {
                Ok(program) => program,
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::FAILURE;
                }
            };
            match back::emit_program(&program) {
                Ok(cg) => print!("{}", cg.print_tac()),
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::FAILURE;
                }
            }
        }
        Asm => {
            let program = match parse(&input) {
                Ok(program) => program,
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::FAILURE;
                }
            };
            match back::compile(&program) {
                Ok(asm) => print!("{asm}"),
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }
    ExitCode::SUCCESS
}
