use std::fs::File;
use std::io;

use glean::text::text_from;

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: glean <file.pdf>");
        std::process::exit(2);
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open {}: {}", path, err);
            std::process::exit(2);
        }
    };

    let mut text = match text_from(file) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("failed to extract text from {}: {}", path, err);
            std::process::exit(2);
        }
    };

    if let Err(err) = io::copy(&mut text, &mut io::stdout().lock()) {
        eprintln!("failed to write output: {}", err);
        std::process::exit(2);
    }
}
