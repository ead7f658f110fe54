use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context};
use doubri_rs::hash::HashBackend;
use doubri_rs::logging;
use doubri_rs::sketch::{sketch_stream, SketchOptions};

fn print_help() {
    eprintln!(
        r#"doubri_minhash - Read text (in JSONL format) from STDIN and compute MinHash buckets

USAGE:
    doubri_minhash [OPTIONS] FILENAME

ARGS:
    FILENAME                filename where MinHash buckets will be stored

OPTIONS:
    -n, --ngram <N>         number of letters of an n-gram [default: 5]
    -b, --bucket <HASHNUM>  number of hash values per bucket [default: 20]
    -s, --start <START>     start number of buckets [default: 0]
    -r, --end <END>         end number of buckets [default: 40]
    -t, --text <TEXT>       text field in JSON [default: text]
        --hash <BACKEND>    hash family, murmur3 or xxh3 [default: murmur3]
    -l, --log-level-console <LEVEL>
                            console log level [default: warn]
    -h, --help              print help
"#
    );
}

fn main() -> anyhow::Result<()> {
    let mut options = SketchOptions::default();
    let mut console_level = "warn".to_string();
    let mut output: Option<PathBuf> = None;

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
            "-n" | "--ngram" => options.ngram = value(&arg)?.parse()?,
            "-b" | "--bucket" => options.num_hash_values = value(&arg)?.parse()?,
            "-s" | "--start" => options.begin = value(&arg)?.parse()?,
            "-r" | "--end" => options.end = value(&arg)?.parse()?,
            "-t" | "--text" => options.text_field = value(&arg)?,
            "--hash" => options.backend = HashBackend::parse(&value(&arg)?)?,
            "-l" | "--log-level-console" => console_level = value(&arg)?,
            other if other.starts_with('-') => {
                print_help();
                bail!("unknown option: {}", other);
            }
            _ => {
                if output.is_some() {
                    print_help();
                    bail!("more than one output filename");
                }
                output = Some(PathBuf::from(arg.clone()));
            }
        }
    }

    let Some(output) = output else {
        print_help();
        bail!("missing output filename");
    };

    logging::init_console(logging::parse_level(&console_level)?)?;

    let stdin = std::io::stdin();
    sketch_stream(BufReader::new(stdin.lock()), &output, &options)?;
    Ok(())
}
