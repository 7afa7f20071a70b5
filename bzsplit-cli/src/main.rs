//! bzsplit CLI - split-aware BZip2 decompression.
//!
//! Decompresses `.bz2` files and, for split-based processing, lists the
//! exact compressed-byte ranges the blocks of a stream occupy.

use bzsplit_decoder::{BzDecoder, ReadMode, ReadStatus};
use clap::{Parser, Subcommand};
use log::{LevelFilter, debug, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bzsplit")]
#[command(author, version, about = "Split-aware BZip2 decompression")]
#[command(long_about = "
bzsplit decodes BZip2 streams and reports block boundaries as exact
compressed-byte offsets, so large .bz2 files can be handed out to
parallel workers range by range.

Examples:
  bzsplit decode data.bz2
  bzsplit decode data.bz2 -o data.txt
  bzsplit blocks data.bz2
")]
struct Cli {
    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress a .bz2 file
    #[command(alias = "d")]
    Decode {
        /// Input .bz2 file
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the block boundaries of a .bz2 file
    #[command(alias = "b")]
    Blocks {
        /// Input .bz2 file
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Decode { input, output } => cmd_decode(&input, output.as_deref()),
        Commands::Blocks { input } => cmd_blocks(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

/// Consume and verify the two `BZ` magic bytes.
fn strip_magic(file: &mut File, path: &Path) -> io::Result<()> {
    let mut magic = [0u8; 2];
    file.read_exact(&mut magic)?;
    if magic != [0x42, 0x5A] {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not a BZip2 file", path.display()),
        ));
    }
    Ok(())
}

fn cmd_decode(input: &Path, output: Option<&Path>) -> io::Result<()> {
    let mut file = File::open(input)?;
    strip_magic(&mut file, input)?;

    let mut decoder = BzDecoder::new(file, ReadMode::Continuous)?;
    decoder.adjust_reported_bytes(2);

    let written = match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            let n = io::copy(&mut decoder, &mut writer)?;
            writer.flush()?;
            n
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            io::copy(&mut decoder, &mut handle)?
        }
    };

    info!(
        "decompressed {} -> {} bytes",
        decoder.compressed_bytes_read(),
        written
    );
    Ok(())
}

fn cmd_blocks(input: &Path) -> io::Result<()> {
    let mut file = File::open(input)?;
    strip_magic(&mut file, input)?;

    let mut decoder = BzDecoder::new(file, ReadMode::ByBlock)?;
    decoder.adjust_reported_bytes(2);

    let mut buf = vec![0u8; 64 * 1024];
    let mut block_no = 0u64;
    let mut block_bytes = 0u64;
    let mut start = decoder.reported_bytes_consumed();
    let mut total_bytes = 0u64;

    loop {
        match decoder.read_into(&mut buf)? {
            ReadStatus::Data(n) => block_bytes += n as u64,
            ReadStatus::EndOfBlock => {
                block_no += 1;
                let next = decoder.reported_bytes_consumed();
                println!(
                    "block {block_no}: compressed [{start}, {next}), {block_bytes} bytes out"
                );
                debug!("block {block_no} spans {} compressed bytes", next - start);
                total_bytes += block_bytes;
                start = next;
                block_bytes = 0;
            }
            ReadStatus::EndOfStream => break,
        }
    }

    println!("{block_no} blocks, {total_bytes} bytes total");
    Ok(())
}
