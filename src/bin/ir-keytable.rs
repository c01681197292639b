use clap::{ArgAction, Parser};
use log::{Level, LevelFilter, Metadata, Record};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ir-keytable",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "List, load or change IR keytables of remote controller devices"
)]
struct App {
    /// Increase message verbosity
    #[arg(long, short, action = ArgAction::Count)]
    verbose: u8,

    /// rc device to control, defaults to rc0
    #[arg(long, short, name = "SYSDEV")]
    sysdev: Option<String>,

    /// Clear the scancode to keycode table
    #[arg(long, short)]
    clear: bool,

    /// Read the current scancode to keycode table
    #[arg(long, short)]
    read: bool,

    /// Load a keymap file
    #[arg(long, short, name = "KEYMAP")]
    write: Vec<PathBuf>,

    /// Set scancode to keycode mappings, scancode=keycode[,scancode=keycode..]
    #[arg(long = "set-key", short = 'k', name = "KEYS")]
    set_key: Vec<String>,

    /// Protocol to enable, or "all"
    #[arg(long, short, value_delimiter = ',', name = "PROTOCOL")]
    protocol: Vec<String>,

    /// BPF decoder parameter, name=value[,name=value..]
    #[arg(long = "parameter", short = 'e', name = "PARAM")]
    parameter: Vec<String>,

    /// Set repeat delay in milliseconds
    #[arg(long, short = 'D', name = "DELAY")]
    delay: Option<u32>,

    /// Set repeat period in milliseconds
    #[arg(long, short = 'P', name = "PERIOD")]
    period: Option<u32>,

    /// Load keymaps for matching devices from an rc_maps.cfg file
    #[arg(long = "auto-load", short = 'a', name = "CFGFILE")]
    auto_load: Option<PathBuf>,

    /// Test if IR is generating events
    #[arg(long, short)]
    test: bool,

    /// Parse a keymap file, then exit
    #[arg(long = "test-keymap", name = "TESTKEYMAP")]
    test_keymap: Option<PathBuf>,
}

fn main() {
    let args = App::parse();

    log::set_logger(&CLI_LOGGER).unwrap();

    log::set_max_level(match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    commands::keytable::keytable(&args);
}

static CLI_LOGGER: CliLogger = CliLogger;

struct CliLogger;

impl log::Log for CliLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "{}: {}",
                match record.level() {
                    Level::Trace => "trace",
                    Level::Debug => "debug",
                    Level::Info => "info",
                    Level::Warn => "warn",
                    Level::Error => "error",
                },
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
