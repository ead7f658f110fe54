use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context};
use doubri_rs::dedup::{read_shard_list, DedupOptions, GroupDeduper};
use doubri_rs::logging;
use tracing::error;

fn print_help() {
    eprintln!(
        r#"doubri_dedup - Read MinHash buckets from files, deduplicate items, and build bucket indices

Reads one MinHash filename per line from STDIN.

USAGE:
    doubri_dedup [OPTIONS] --group <N> BASENAME

ARGS:
    BASENAME                basename for output files (index, flag, source list, log)

OPTIONS:
    -g, --group <N>         unique group order in the range of [0, 65535]
    -n, --no-index          do not save index files after deduplication
    -l, --log-level-console <LEVEL>
                            console log level [default: warn]
    -L, --log-level-file <LEVEL>
                            log level for {{BASENAME}}.log [default: info]
    -h, --help              print help
"#
    );
}

fn main() -> anyhow::Result<()> {
    let mut group: Option<u16> = None;
    let mut save_index = true;
    let mut console_level = "warn".to_string();
    let mut file_level = "info".to_string();
    let mut basename: Option<PathBuf> = None;

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
            "-g" | "--group" => {
                let raw = value(&arg)?;
                group = Some(
                    raw.parse()
                        .with_context(|| format!("group order must be in [0, 65535]: {}", raw))?,
                );
            }
            "-n" | "--no-index" => save_index = false,
            "-l" | "--log-level-console" => console_level = value(&arg)?,
            "-L" | "--log-level-file" => file_level = value(&arg)?,
            other if other.starts_with('-') => {
                print_help();
                bail!("unknown option: {}", other);
            }
            _ => {
                if basename.is_some() {
                    print_help();
                    bail!("more than one basename");
                }
                basename = Some(PathBuf::from(arg.clone()));
            }
        }
    }

    let Some(basename) = basename else {
        print_help();
        bail!("missing basename");
    };
    let Some(group) = group else {
        print_help();
        bail!("missing --group");
    };

    let flag_path = with_suffix(&basename, ".dup");
    let src_path = with_suffix(&basename, ".src");
    let log_path = with_suffix(&basename, ".log");
    logging::init_with_file(
        logging::parse_level(&console_level)?,
        &log_path,
        logging::parse_level(&file_level)?,
    )?;

    let run = || -> anyhow::Result<()> {
        let stdin = std::io::stdin();
        let paths = read_shard_list(BufReader::new(stdin.lock()))?;

        let mut deduper = GroupDeduper::open(&paths, None)?;
        deduper.manifest(group).save(&src_path)?;
        deduper.run(&basename, &DedupOptions { group, save_index })?;
        deduper.flags().save(&flag_path)?;
        Ok(())
    };

    if let Err(err) = run() {
        error!("{:#}", err);
        return Err(err);
    }
    Ok(())
}

fn with_suffix(base: &std::path::Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
