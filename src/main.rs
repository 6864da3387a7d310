//! Veil Compiler Binary

use std::process;
use veilc::{CompilerError, EnhancedCli};

fn main() {
    match EnhancedCli::new().run() {
        Ok(()) => {}
        Err(CompilerError::Io(e)) => {
            eprintln!("IO Error: {}", e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            process::exit(1);
        }
    }
}
