// Command-line front end for vcdiff-stream.
//
// Both subcommands push the input through a `VcdiffStream` in 64 KiB
// chunks and write output as soon as it can be read. A file target is
// written under a hidden `.partial` name and only renamed into place once
// the stream has closed cleanly.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use bytes::Bytes;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::config::{
    DEFAULT_ENCODE_WINDOW_SIZE, DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_TARGET_FILE_SIZE, DEFAULT_MAX_TARGET_WINDOW_SIZE,
    DEFAULT_MIN_ENCODE_WINDOW_SIZE, DecodeOptions, EncodeOptions,
};
use crate::error::VcdiffError;
use crate::hash::HashedDictionary;
use crate::stream::{StreamState, StreamStats, VcdiffStream};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

fn parse_usize_size(s: &str) -> Result<usize, String> {
    let n = parse_byte_size(s)?;
    usize::try_from(n).map_err(|_| format!("size too large for this platform: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Streaming VCDIFF (RFC 3284) encoder/decoder against a fixed dictionary.
#[derive(Parser, Debug)]
#[command(
    name = "vcdiff-stream",
    version,
    about = "Streaming VCDIFF encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (only errors are logged).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stream statistics as JSON to stderr.
    #[arg(long, global = true)]
    stats: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Delta encode an input stream against a dictionary.
    Encode(EncodeArgs),
    /// Rebuild the target from a delta and its dictionary.
    Decode(DecodeArgs),
    /// Print the default session options.
    Config,
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Dictionary file.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Input file (default: stdin, also `-`).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output file (default: stdout, also `-`).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Emit the interleaved ('S') window layout.
    #[arg(long)]
    interleaved: bool,

    /// Add an Adler-32 checksum to every window.
    #[arg(long)]
    checksum: bool,

    /// Emit the JSON instruction format instead of binary VCDIFF.
    #[arg(long)]
    json: bool,

    /// Allow COPY from earlier bytes of the same window.
    #[arg(long)]
    target_matches: bool,

    /// Buffered bytes that trigger a dispatch (supports K/M/G suffix).
    #[arg(long = "min-window", value_parser = parse_usize_size, default_value_t = DEFAULT_MIN_ENCODE_WINDOW_SIZE)]
    min_window: usize,

    /// Largest VCDIFF window emitted (supports K/M/G suffix).
    #[arg(long = "window", value_parser = parse_usize_size, default_value_t = DEFAULT_ENCODE_WINDOW_SIZE)]
    window: usize,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Reject windows that copy from earlier output.
    #[arg(long = "no-vcd-target")]
    no_vcd_target: bool,

    /// Largest total output accepted (supports K/M/G suffix).
    #[arg(long, value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_FILE_SIZE)]
    max_target_file_size: u64,

    /// Largest single window accepted (supports K/M/G suffix).
    #[arg(long, value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_WINDOW_SIZE)]
    max_target_window_size: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{what}: {}: {source}", .path.display())]
    File {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("output file exists, use -f to overwrite: {}", .0.display())]
    Exists(PathBuf),
    #[error("{0}: {1}")]
    Io(&'static str, #[source] io::Error),
    #[error(transparent)]
    Codec(#[from] VcdiffError),
}

// ---------------------------------------------------------------------------
// Input and output
// ---------------------------------------------------------------------------

fn is_stdio(path: Option<&Path>) -> bool {
    path.is_none_or(|p| p == Path::new("-"))
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>, CliError> {
    match path {
        Some(p) if !is_stdio(path) => {
            let f = File::open(p).map_err(|source| CliError::File {
                what: "input file",
                path: p.to_path_buf(),
                source,
            })?;
            Ok(Box::new(BufReader::with_capacity(BUF_SIZE, f)))
        }
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Output sink; `staged` holds the partial and final paths of a file target.
struct Output {
    writer: Box<dyn Write>,
    staged: Option<(PathBuf, PathBuf)>,
}

impl Output {
    /// Move a staged file into place, or discard it when the run failed.
    fn finish(self, ok: bool) -> Result<(), CliError> {
        let Output { writer, staged } = self;
        drop(writer);
        let Some((partial, path)) = staged else {
            return Ok(());
        };
        if !ok {
            let _ = std::fs::remove_file(&partial);
            return Ok(());
        }
        std::fs::rename(&partial, &path).map_err(|source| {
            let _ = std::fs::remove_file(&partial);
            CliError::File {
                what: "output file",
                path,
                source,
            }
        })
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or(OsStr::new("output")));
    name.push(".partial");
    path.with_file_name(name)
}

fn open_output(path: Option<&Path>, force: bool) -> Result<Output, CliError> {
    match path {
        Some(p) if !is_stdio(path) => {
            if p.exists() && !force {
                return Err(CliError::Exists(p.to_path_buf()));
            }
            let partial = partial_path(p);
            let f = File::create(&partial).map_err(|source| CliError::File {
                what: "output file",
                path: partial.clone(),
                source,
            })?;
            Ok(Output {
                writer: Box::new(BufWriter::with_capacity(BUF_SIZE, f)),
                staged: Some((partial, p.to_path_buf())),
            })
        }
        _ => Ok(Output {
            writer: Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock())),
            staged: None,
        }),
    }
}

fn read_dictionary(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::File {
        what: "dictionary",
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Streaming loop
// ---------------------------------------------------------------------------

fn write_ready(stream: &mut VcdiffStream, out: &mut dyn Write) -> Result<(), CliError> {
    while let Some(chunk) = stream.read() {
        out.write_all(&chunk).map_err(|e| CliError::Io("write error", e))?;
    }
    if let Some(err) = stream.error() {
        return Err(err.clone().into());
    }
    Ok(())
}

/// A write refused because the stream already failed reports the failure.
fn root_cause(stream: &VcdiffStream, err: VcdiffError) -> CliError {
    stream.error().cloned().unwrap_or(err).into()
}

/// Push everything from `input` through `stream` into `output`.
fn run_stream(mut stream: VcdiffStream, mut input: Box<dyn Read>, output: &mut dyn Write) -> Result<StreamStats, CliError> {
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CliError::Io("read error", e)),
        };
        stream
            .write(Bytes::copy_from_slice(&buf[..n]))
            .map_err(|e| root_cause(&stream, e))?;
        write_ready(&mut stream, output)?;
        while stream.needs_drain() {
            stream.wait();
            write_ready(&mut stream, output)?;
        }
    }

    stream.end().map_err(|e| root_cause(&stream, e))?;
    loop {
        write_ready(&mut stream, output)?;
        if stream.state() == StreamState::Closed {
            break;
        }
        stream.wait();
    }
    output.flush().map_err(|e| CliError::Io("write flush error", e))?;
    Ok(stream.stats())
}

fn report(command: &str, stats: &StreamStats, cli: &Cli) {
    if cli.verbose > 0 && !cli.quiet {
        eprintln!(
            "vcdiff-stream: {command}: input size: {}, output size: {}, dispatches: {}",
            stats.bytes_written, stats.bytes_emitted, stats.dispatches
        );
    }
    if cli.stats {
        let json = serde_json::json!({
            "command": command,
            "input_size": stats.bytes_written,
            "output_size": stats.bytes_emitted,
            "dispatches": stats.dispatches,
        });
        eprintln!("{json:#}");
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn encode_options(args: &EncodeArgs, dictionary: Vec<u8>) -> Result<EncodeOptions, CliError> {
    let hashed = HashedDictionary::new(dictionary)?;
    Ok(EncodeOptions {
        min_encode_window_size: Some(args.min_window),
        encode_window_size: Some(args.window),
        interleaved: args.interleaved,
        checksum: args.checksum,
        json: args.json,
        target_matches: args.target_matches,
        ..EncodeOptions::new(Arc::new(hashed))
    })
}

fn decode_options(args: &DecodeArgs, dictionary: Vec<u8>) -> DecodeOptions {
    DecodeOptions {
        allow_vcd_target: !args.no_vcd_target,
        max_target_file_size: Some(args.max_target_file_size),
        max_target_window_size: Some(args.max_target_window_size),
        ..DecodeOptions::new(dictionary)
    }
}

fn cmd_encode(args: &EncodeArgs, cli: &Cli) -> Result<(), CliError> {
    let options = encode_options(args, read_dictionary(&args.io.dictionary)?)?;
    let stream = VcdiffStream::encoder(&options)?;
    let input = open_input(args.io.input.as_deref())?;
    let mut output = open_output(args.io.output.as_deref(), cli.force)?;
    let result = run_stream(stream, input, output.writer.as_mut());
    output.finish(result.is_ok())?;
    report("encode", &result?, cli);
    Ok(())
}

fn cmd_decode(args: &DecodeArgs, cli: &Cli) -> Result<(), CliError> {
    let options = decode_options(args, read_dictionary(&args.io.dictionary)?);
    let stream = VcdiffStream::decoder(&options)?;
    let input = open_input(args.io.input.as_deref())?;
    let mut output = open_output(args.io.output.as_deref(), cli.force)?;
    let result = run_stream(stream, input, output.writer.as_mut());
    output.finish(result.is_ok())?;
    report("decode", &result?, cli);
    Ok(())
}

fn cmd_config() {
    println!("vcdiff-stream {}", env!("CARGO_PKG_VERSION"));
    println!("  min encode window size:  {DEFAULT_MIN_ENCODE_WINDOW_SIZE}");
    println!("  encode window size:      {DEFAULT_ENCODE_WINDOW_SIZE}");
    println!("  max target file size:    {DEFAULT_MAX_TARGET_FILE_SIZE}");
    println!("  max target window size:  {DEFAULT_MAX_TARGET_WINDOW_SIZE}");
    println!("  high water mark:         {DEFAULT_HIGH_WATER_MARK}");
    println!("  adler32 simd:            {}", cfg!(feature = "adler32"));
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn log_filter(cli: &Cli) -> &'static str {
    match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&cli)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let result = match &cli.command {
        Cmd::Encode(args) => cmd_encode(args, &cli),
        Cmd::Decode(args) => cmd_decode(args, &cli),
        Cmd::Config => {
            cmd_config();
            Ok(())
        }
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("vcdiff-stream: {e}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
