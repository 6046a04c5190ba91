//! Hwid command

use crate::domain::install_plan::generate_hwid;

/// Print a freshly generated hardware-identifier token.
pub fn run() {
    println!("{}", generate_hwid(&mut rand::thread_rng()));
}
