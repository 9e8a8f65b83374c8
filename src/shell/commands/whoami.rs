use crate::println;

/// whoami — print the current user. There is only one.
pub fn run(_args: &str) {
    println!("root");
}
