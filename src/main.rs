use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use zsend::{com::ComModemImpl, data::Options, TransferResult, Zmodem, VERSION};

const LOG_PATTERN: &str = "{d(%H:%M:%S%.3f)} {h({l:5})} {t} - {m}{n}";

/// Sends a file to a ZMODEM receiver over a serial line.
#[derive(Parser)]
#[command(name = "zsend")]
#[command(author, version, about)]
struct Args {
    /// Options file, defaults to options.toml in the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device
    #[arg(short, long)]
    device: Option<String>,

    /// Line speed
    #[arg(short, long)]
    baud: Option<usize>,

    /// Data subpacket size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,

    /// More output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// File to send, `-` reads the data from stdin
    file: String,
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> TransferResult<()> {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let mut config = Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = log_file {
        let file = FileAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_PATTERN))).build(path)?;
        config = config.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    log4rs::init_config(config.build(root.build(level))?)?;
    Ok(())
}

fn run(args: Args) -> TransferResult<bool> {
    let mut options = Options::load_options(args.config.as_deref())?;
    if let Some(device) = args.device {
        options.modem.device = device;
    }
    if let Some(baud) = args.baud {
        options.modem.baud_rate = baud;
    }
    if let Some(chunk_size) = args.chunk_size {
        options.transfer.chunk_size = chunk_size.max(1);
    }

    log::info!("zsend {VERSION} on {} at {} baud", options.modem.device, options.modem.baud_rate);
    let com = ComModemImpl::new(options.modem.clone());
    let mut zmodem = Zmodem::new(Box::new(com), options.transfer);

    let res = if args.file == "-" {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        zmodem.upload_data(data)?
    } else {
        zmodem.upload_file(&args.file)?
    };

    if !res {
        if let Err(err) = zmodem.cancel() {
            log::error!("can't cancel the session: {err}");
        }
    }
    Ok(res)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(args.verbose, args.log_file.as_deref()) {
        eprintln!("can't initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            log::error!("transfer failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
