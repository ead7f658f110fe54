use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use doubri_rs::apply::{apply_flags, flag_file_len, read_flag_range};
use doubri_rs::manifest::SourceManifest;

fn print_help() {
    eprintln!(
        r#"doubri_apply - Read documents (in JSONL format) from STDIN and output non-duplicate ones to STDOUT

USAGE:
    doubri_apply [OPTIONS] --flag <FLAG> --source <SRC> TARGET

ARGS:
    TARGET                  the MinHash filename corresponding to the input
                            JSONL file (this file does not need to exist)

OPTIONS:
    -f, --flag <FLAG>       flag file marking duplicated documents with 'D'
    -s, --source <SRC>      file storing the list of source MinHash files for
                            the flag file
    -d, --strip             strip directory names from source MinHash files
                            (path) when finding the target
    -v, --verbose           output debug information to STDERR
    -h, --help              print help
"#
    );
}

fn main() -> anyhow::Result<()> {
    let mut flag_file: Option<PathBuf> = None;
    let mut src_file: Option<PathBuf> = None;
    let mut target: Option<String> = None;
    let mut strip = false;
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
            "-s" | "--source" => src_file = Some(PathBuf::from(value(&arg)?)),
            "-d" | "--strip" => strip = true,
            "-v" | "--verbose" => verbose = true,
            other if other.starts_with('-') => {
                print_help();
                bail!("unknown option: {}", other);
            }
            _ => {
                if target.is_some() {
                    print_help();
                    bail!("more than one target");
                }
                target = Some(arg.clone());
            }
        }
    }

    let (Some(flag_file), Some(src_file), Some(target)) = (flag_file, src_file, target) else {
        print_help();
        bail!("--flag, --source, and TARGET are required");
    };

    let manifest = SourceManifest::load(&src_file)?;
    let num_total_items = flag_file_len(&flag_file)?;
    if manifest.total_items() != num_total_items {
        bail!(
            "inconsistent numbers of items: {} (from flag), {} (from source)",
            num_total_items,
            manifest.total_items()
        );
    }

    let (offset, size) = manifest.locate(&target, strip)?;
    let flags = read_flag_range(&flag_file, offset, size)?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let stats = apply_flags(&flags, BufReader::new(stdin.lock()), &mut out)?;
    out.flush()?;

    if verbose {
        eprintln!("flag: {}", flag_file.display());
        eprintln!("source: {}", src_file.display());
        eprintln!("target: {}", target);
        eprintln!("begin: {}", offset);
        eprintln!("size: {}", size);
        eprintln!("num_active: {}", stats.num_active);
    }
    Ok(())
}
