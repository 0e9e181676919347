//! CLI tool: decode the dispatch target descriptions embedded in an image.

mod report;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::PathBuf;
use std::process;

fn main() {
    let mut json = false;
    let mut arch: Option<String> = None;
    let mut path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--arch" => arch = Some(args.next().unwrap_or_else(|| usage())),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => usage(),
        }
    }
    let path = path.unwrap_or_else(|| usage());

    let data = fs::read(&path).unwrap_or_else(|e| {
        eprintln!("varimg_inspect: failed to read {}: {e}", path.display());
        process::exit(1);
    });

    match report::inspect(&data, arch.as_deref()) {
        Ok(report) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).expect("report serializes")
                );
            } else {
                print!("{}", report.render());
            }
        }
        Err(e) => {
            eprintln!("varimg_inspect: {e}");
            process::exit(1);
        }
    }
}

fn usage() -> ! {
    eprintln!("Usage: varimg_inspect [--json] [--arch x86|aarch64|arm] <image>");
    process::exit(1);
}
