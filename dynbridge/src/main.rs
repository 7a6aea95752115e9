//! # dynbridge
//!
//! Main entry point for the command-line tool.

use dynbridge::{init_logging, parse_args, run, usage, Command};
use std::env;
use std::io;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("dynbridge");

    let invocation = parse_args(args.get(1..).unwrap_or_default()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprint!("{}", usage(program));
        process::exit(2);
    });

    if invocation.command == Command::Help {
        eprint!("{}", usage(program));
        return;
    }

    if let Err(e) = init_logging(invocation.log) {
        eprintln!("Error: failed to install logger: {}", e);
    }

    let stdout = io::stdout();
    if let Err(e) = run(&invocation.command, &mut stdout.lock()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
