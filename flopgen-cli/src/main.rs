//! flopgen - build FAT-formatted floppy images from host files.
//!
//! Usage:
//!   flopgen [options] <inputs...>
//!
//! Examples:
//!   flopgen -o dos.img autoexec.bat config.sys     # two files in the root
//!   flopgen -s 720 -o tools.img tools/             # directory tree, 720K disk
//!   flopgen -f -o game.img game.zip               # archive contents, overwrite
//!   flopgen -c 850 -o intl.img docs/               # code page 850 names

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{Level, LevelFilter, Log, Metadata, Record};

use flopgen_core::{
    load_archive_entries, CodePage, FloppySize, HostNode, ImageResult, ImageTarget, Volume,
};

/// Floppy disk image builder
#[derive(Parser, Debug)]
#[command(name = "flopgen")]
#[command(about = "Create FAT-formatted floppy disk images")]
struct Args {
    /// Files, directories or .zip archives to copy into the image
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output image path
    #[arg(short, long, default_value = "floppy.img")]
    output: PathBuf,

    /// Floppy size: 360K, 720K, 1200K, 1440K or 2880K
    #[arg(short, long, default_value = "1440K")]
    size: FloppySize,

    /// OEM code page for file names
    #[arg(short, long, default_value_t = 437)]
    code_page: u16,

    /// Overwrite the output image if it exists
    #[arg(short, long)]
    force: bool,

    /// More output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Logger writing `LEVEL message` lines to stderr.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Info => eprintln!("{}", record.args()),
            level => eprintln!("{level:5} {}", record.args()),
        }
    }

    fn flush(&self) {}
}

fn init_logger(verbose: u8) -> Result<(), log::SetLoggerError> {
    log::set_max_level(match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    log::set_logger(&LOGGER)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

/// Absolute form of a path that may not exist yet.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return fs::canonicalize(path);
    }
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(parent)?.join(name))
}

/// The input the output image would overwrite, if any.
/// Inputs are read after the image is created, so they must not overlap.
fn input_containing<'a>(output: &Path, inputs: &'a [PathBuf]) -> io::Result<Option<&'a PathBuf>> {
    let output = resolve(output)?;
    for input in inputs {
        // Missing inputs are reported when loading
        let Ok(input_path) = fs::canonicalize(input) else {
            continue;
        };
        if output.starts_with(&input_path) {
            return Ok(Some(input));
        }
    }
    Ok(None)
}

/// Turn command-line inputs into host trees.
/// Archives contribute their top-level entries.
fn load_inputs(inputs: &[PathBuf]) -> ImageResult<Vec<(PathBuf, HostNode)>> {
    let mut nodes = Vec::new();
    for path in inputs {
        if is_archive(path) && path.is_file() {
            let entries = load_archive_entries(File::open(path)?)?;
            log::debug!("{}: {} top-level entries", path.display(), entries.len());
            nodes.extend(entries.into_iter().map(|node| (path.clone(), node)));
        } else {
            nodes.push((path.clone(), HostNode::scan(path)?));
        }
    }
    Ok(nodes)
}

fn run(args: &Args) -> Result<(), String> {
    let existed = args.output.exists();
    if existed && !args.force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        ));
    }

    CodePage::new(args.code_page).map_err(|_| format!("unsupported code page {}", args.code_page))?;

    match input_containing(&args.output, &args.inputs) {
        Ok(Some(input)) => {
            return Err(format!(
                "output {} would overwrite input {}",
                args.output.display(),
                input.display()
            ));
        }
        Ok(None) => {}
        Err(e) => return Err(format!("{}: {}", args.output.display(), e)),
    }

    let nodes = load_inputs(&args.inputs).map_err(|e| format!("reading inputs: {}", e))?;

    let target = ImageTarget::File(args.output.clone());
    let mut volume = match Volume::try_open(&target, args.size, args.code_page) {
        Ok(volume) => volume,
        Err(e) => {
            if !existed {
                let _ = fs::remove_file(&args.output);
            }
            return Err(format!("cannot create {}: {}", args.output.display(), e));
        }
    };

    for (input, node) in &nodes {
        volume.try_insert(node).map_err(|e| {
            format!("failed to add {} ({}): {}", node.path(), input.display(), e)
        })?;
    }

    volume
        .close()
        .map_err(|e| format!("closing {}: {}", args.output.display(), e))?;

    log::info!("wrote {} ({})", args.output.display(), args.size);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logger(args.verbose) {
        eprintln!("Failed to install logger: {}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log::error!("{}", message);
            ExitCode::FAILURE
        }
    }
}
