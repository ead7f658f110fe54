use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use doubri_rs::apply::apply_flags;
use doubri_rs::flags::FlagStore;

fn print_help() {
    eprintln!(
        r#"doubri_apply_whole - Read documents (in JSONL format) from STDIN and output non-duplicate ones to STDOUT

The flag file must align 1:1 with the input: one byte per line.

USAGE:
    doubri_apply_whole [OPTIONS] --flag <FLAG>

OPTIONS:
    -f, --flag <FLAG>       flag file marking duplicated documents with 'D'
    -v, --verbose           output debug information to STDERR
    -h, --help              print help
"#
    );
}

fn main() -> anyhow::Result<()> {
    let mut flag_file: Option<PathBuf> = None;
    let mut verbose = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("missing value for {}", name))
        };
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-f" | "--flag" => flag_file = Some(PathBuf::from(value(&arg)?)),
            "-v" | "--verbose" => verbose = true,
            other => {
                print_help();
                bail!("unknown argument: {}", other);
            }
        }
    }

    let Some(flag_file) = flag_file else {
        print_help();
        bail!("--flag is required");
    };

    let flags = FlagStore::load(&flag_file)?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let stats = apply_flags(flags.as_bytes(), BufReader::new(stdin.lock()), &mut out)?;
    out.flush()?;

    if verbose {
        eprintln!("flag: {}", flag_file.display());
        eprintln!("size: {}", stats.num_lines);
        eprintln!("num_active: {}", stats.num_active);
    }
    Ok(())
}
