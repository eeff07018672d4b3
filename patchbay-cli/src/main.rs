//! Command line program for building and running `patchbay` worlds.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

use colored::*;

pub mod cli;
pub mod world;

fn main() {
    match cli::start(cli::app_matches()) {
        Ok(_) => (),
        Err(e) => {
            println!("{}{}", "error: ".red(), e);
            if e.root_cause().to_string() != e.to_string() {
                println!("Caused by:\n{}", e.root_cause())
            }
        }
    }
}
