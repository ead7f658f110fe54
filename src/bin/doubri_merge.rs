use std::path::PathBuf;

use anyhow::{bail, Context};
use doubri_rs::logging;
use doubri_rs::merge::merge_indices;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

fn print_help() {
    eprintln!(
        r#"doubri_merge - Merge bucket indices to deduplicate items across different groups

USAGE:
    doubri_merge [OPTIONS] --output <OUTPUT> SOURCES...

ARGS:
    SOURCES...              basenames of the source index files (.idx.#####)

OPTIONS:
    -s, --start <START>     start number of buckets [default: 0]
    -r, --end <END>         end number of buckets [default: 40]
    -o, --output <OUTPUT>   basename for the merged index files
    -l, --log-level-console <LEVEL>
                            console log level [default: warn]
    -L, --log-level-file <LEVEL>
                            log level for {{OUTPUT}}.log [default: off]
    -h, --help              print help
"#
    );
}

fn main() -> anyhow::Result<()> {
    let mut begin = 0u32;
    let mut end = 40u32;
    let mut output: Option<PathBuf> = None;
    let mut console_level = "warn".to_string();
    let mut file_level = "off".to_string();
    let mut sources: Vec<PathBuf> = Vec::new();

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
            "-s" | "--start" => begin = value(&arg)?.parse()?,
            "-r" | "--end" => end = value(&arg)?.parse()?,
            "-o" | "--output" => output = Some(PathBuf::from(value(&arg)?)),
            "-l" | "--log-level-console" => console_level = value(&arg)?,
            "-L" | "--log-level-file" => file_level = value(&arg)?,
            other if other.starts_with('-') => {
                print_help();
                bail!("unknown option: {}", other);
            }
            _ => sources.push(PathBuf::from(arg.clone())),
        }
    }

    let Some(output) = output else {
        print_help();
        bail!("missing --output");
    };
    if sources.is_empty() {
        print_help();
        bail!("no source basenames");
    }

    let file_level = logging::parse_level(&file_level)?;
    let console_level = logging::parse_level(&console_level)?;
    if file_level == LevelFilter::OFF {
        logging::init_console(console_level)?;
    } else {
        let log_path = {
            let mut name = output.as_os_str().to_os_string();
            name.push(".log");
            PathBuf::from(name)
        };
        logging::init_with_file(console_level, &log_path, file_level)?;
    }

    let run = || -> anyhow::Result<()> {
        let mut num_duplicates = 0u64;
        let stats = merge_indices(&sources, &output, begin, end, |_, _| {
            num_duplicates += 1;
        })?;
        let num_emitted: u64 = stats.iter().map(|s| s.num_emitted).sum();
        info!(
            num_bands = stats.len(),
            num_emitted, num_duplicates, "all bands merged"
        );
        Ok(())
    };

    if let Err(err) = run() {
        error!("{:#}", err);
        return Err(err);
    }
    Ok(())
}
