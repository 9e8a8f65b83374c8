use crate::println;

/// echo <text> — print the argument string back.
pub fn run(args: &str) {
    println!("{}", args);
}
