use multidiff::{read_multi_file_diff, LogCache, LogConfig};
use std::io::BufRead;

fn main() {
    let logger: &'static LogCache = Box::leak(Box::new(LogCache::new(LogConfig {
        name: Some("parse_diff".to_string()),
        ..Default::default()
    })));
    if let Err(e) = logger.enable_caching(100, 64 * 1024) {
        eprintln!("{}", e);
    }
    if log::set_logger(logger).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let input: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => match std::fs::File::open(&path) {
            Ok(file) => Box::new(std::io::BufReader::new(file)),
            Err(e) => {
                eprintln!("{}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Box::new(std::io::stdin().lock()),
    };

    let output = match read_multi_file_diff(input) {
        Ok(output) => output,
        Err(failure) => {
            logger.error(&failure.to_string());
            println!("Read {} file(s) before failing", failure.files.len());
            std::process::exit(1);
        }
    };

    println!("Parsed {} file(s)", output.files.len());
    for file in &output.files {
        let stat = file.stat();
        println!(
            "{:?} {} (+{} -{}, {} hunk(s))",
            file.status(),
            file.display_name(),
            stat.added,
            stat.removed,
            file.hunks.len()
        );
    }

    if let Some(error) = output.error {
        println!();
        println!("Problems:");
        for e in error.errors() {
            println!("  {}", e);
        }
        println!();
        println!("Recent log output:");
        print!("{}", logger.cached_output());
        std::process::exit(2);
    }
}
