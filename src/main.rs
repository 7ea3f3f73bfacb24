use std::env;
use std::process;

mod command;
mod error;
mod jobs;
mod limits;
mod pipes;
mod prompt;
mod redirects;
mod shell;
mod signal_handler;
mod tokenizer;

use limits::Limits;

fn print_help() {
    println!("minsh - minimal pipeline shell");
    println!();
    println!("Usage: minsh [OPTIONS]");
    println!("  -c LINE            Run LINE and exit with its status");
    println!("  --max-args N       Arguments allowed per command (default {})", limits::MAXARG);
    println!("  --max-stages N     Commands allowed per pipeline (default {})", limits::PIPELINE);
    println!("  --max-name N       Redirection file name length bound (default {})", limits::MAXNAME);
    println!("  --max-line N       Input line length bound (default {})", limits::MAXLINE);
    println!("  -h, --help         Print this help");
    println!("  -v, --version      Print version");
}

fn print_version() {
    println!("minsh v {}", env!("CARGO_PKG_VERSION"));
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        process::exit(0);
    }

    if args.iter().any(|a| a == "-v" || a == "--version" || a == "-V") {
        print_version();
        process::exit(0);
    }

    let mut limits = Limits::default();
    let mut line: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1).map(String::as_str);
        if flag == "-c" {
            match value {
                Some(v) => line = Some(v.to_string()),
                None => {
                    eprintln!("minsh: -c: missing command line");
                    process::exit(2);
                }
            }
        } else {
            match limits.apply_flag(flag, value) {
                Ok(true) => {}
                Ok(false) => {
                    eprintln!("minsh: unknown option '{}'", flag);
                    process::exit(2);
                }
                Err(e) => {
                    eprintln!("minsh: {}", e);
                    process::exit(2);
                }
            }
        }
        i += 2;
    }

    let mut shell = shell::Shell::new(limits);

    match line {
        Some(line) => process::exit(shell.run_command(&line)),
        None => shell.run(),
    }
}
