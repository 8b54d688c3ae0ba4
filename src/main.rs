//! Play a story from the terminal through the driver: print each
//! observation, read the next command from stdin.

use std::io::{self, BufRead, Write};
use std::process::exit;

use zealot::driver::Driver;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let story_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: zealot <story-file> [seed]");
            exit(2);
        }
    };
    let seed: u32 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let (mut driver, observation) = match Driver::setup(&story_path, seed) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("zealot: {e}");
            exit(1);
        }
    };
    println!("{observation}");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        match driver.step(&line) {
            Ok(observation) => {
                println!("{observation}");
                if driver.victory() {
                    println!("[victory detected]");
                }
                if driver.is_finished() {
                    break;
                }
                print!("> ");
                let _ = io::stdout().flush();
            }
            Err(e) => {
                eprintln!("zealot: {e}");
                break;
            }
        }
    }
}
