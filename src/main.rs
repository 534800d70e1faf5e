#![deny(clippy::allow_attributes_without_reason)]
#![deny(clippy::exit)]
#![deny(clippy::todo)]

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::process::ExitCode;
use titanc::diagnostic::CompileError;
use titanc::driver;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[clap(arg_required_else_help(true))]
struct Args {
    /// The Titan module to compile (a .pln file)
    file: String,
    /// Translate to plain Lua instead of compiling
    #[arg(long)]
    emit_lua: bool,
    /// Stop after generating the C translation unit
    #[arg(long)]
    emit_c: bool,
    /// Dump the parsed syntax tree and exit
    #[arg(long)]
    print_ast: bool,
    #[arg(long, short('q'))]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    TermLogger::init(
        if args.quiet {
            LevelFilter::Off
        } else {
            LevelFilter::Info
        },
        ConfigBuilder::new()
            .set_time_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .unwrap();

    let result = if args.print_ast {
        driver::print_ast(&args.file)
    } else if args.emit_lua {
        driver::translate(&args.file).map(|_| ())
    } else {
        let output_ext = if args.emit_c { "c" } else { "so" };
        driver::compile("pln", output_ext, &args.file).map(|_| ())
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CompileError::Source(diags)) => {
            for d in diags {
                eprintln!("{d}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("titanc: {e}");
            ExitCode::FAILURE
        }
    }
}
