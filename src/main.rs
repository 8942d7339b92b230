use clap::{Parser, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};
use scorepage::timeline::records::Side;
use scorepage::{Layout, LayoutOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "scorepage")]
#[command(version = "0.1.0")]
#[command(about = "Vertical layout and pagination of a music timeline", long_about = None)]
struct Args {
    /// Output JSON file with pages and placed timeline
    output: PathBuf,

    /// Input timeline JSON file (reads from stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of the first page
    #[arg(long, default_value_t = 1)]
    first_page: u32,

    /// Side of the first page (default: odd pages are right pages)
    #[arg(long, value_enum)]
    first_side: Option<SideArg>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,

    /// More log output, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Left,
    Right,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Left => Side::Left,
            SideArg::Right => Side::Right,
        }
    }
}

/// Writes log records to stderr
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                Level::Error => eprintln!("error: {}", record.args()),
                Level::Warn => eprintln!("warning: {}", record.args()),
                _ => eprintln!("{}", record.args()),
            }
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> Result<(), scorepage::Error> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = LayoutOptions {
        first_page: args.first_page,
        first_page_side: args.first_side.map(Side::from),
    };
    let layout = Layout::new(options).compact(args.compact);

    match &args.input {
        Some(path) => layout.layout_file(path, &args.output)?,
        None => layout.layout(std::io::stdin().lock(), &args.output)?,
    }

    Ok(())
}
