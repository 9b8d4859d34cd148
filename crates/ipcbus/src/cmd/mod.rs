use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use ipcbus_command::Width;
use ipcbus_link::Link;
use ipcbus_peer::{FlashConfig, RegisterClient, Session, SessionConfig};

#[cfg(unix)]
use crate::exit::link_error;
use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod echo;
pub mod flash;
pub mod read;
pub mod serve;
pub mod setclr;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the slave answers.
    Echo(EchoArgs),
    /// Read consecutive registers.
    Read(ReadArgs),
    /// Write consecutive registers.
    Write(WriteArgs),
    /// Set and clear bits of one register.
    Setclr(SetclrArgs),
    /// Program a flash image.
    Flash(FlashArgs),
    /// Run a simulated slave on a unix socket.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

impl Command {
    /// Whether raw frame tracing was requested.
    pub fn traces_frames(&self) -> bool {
        match self {
            Command::Echo(args) => args.link.trace,
            Command::Read(args) => args.link.trace,
            Command::Write(args) => args.link.trace,
            Command::Setclr(args) => args.link.trace,
            Command::Flash(args) => args.link.trace,
            Command::Serve(args) => args.trace,
            Command::Version(_) => false,
        }
    }
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Read(args) => read::run(args, format),
        Command::Write(args) => write::run(args, format),
        Command::Setclr(args) => setclr::run(args, format),
        Command::Flash(args) => flash::run(args, format),
        Command::Serve(args) => serve::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Link to the slave: `unix:<path>` for a simulated slave, otherwise a tty device.
    #[arg(long, env = "IPCBUS_LINK")]
    pub link: String,
    /// Response timeout per request (e.g. 10ms, 2s).
    #[arg(long, env = "IPCBUS_TIMEOUT", default_value = "10ms")]
    pub timeout: String,
    /// Log every raw frame.
    #[arg(long)]
    pub trace: bool,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Payload to send.
    #[arg(default_value = "ping")]
    pub data: String,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Start address (decimal or 0x hex).
    pub addr: String,
    /// Access width in bytes: 1, 2 or 4.
    #[arg(long, short = 'w', default_value = "4", value_parser = parse_width)]
    pub width: Width,
    /// Number of registers.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: u16,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Start address (decimal or 0x hex).
    pub addr: String,
    /// Values to write, one per register.
    #[arg(required = true, num_args = 1..)]
    pub values: Vec<String>,
    /// Access width in bytes: 1, 2 or 4.
    #[arg(long, short = 'w', default_value = "4", value_parser = parse_width)]
    pub width: Width,
}

#[derive(Args, Debug)]
pub struct SetclrArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Register address (decimal or 0x hex).
    pub addr: String,
    /// Bits to change.
    #[arg(long)]
    pub mask: String,
    /// New value of the masked bits.
    #[arg(long)]
    pub val: String,
    /// Access width in bytes: 1, 2 or 4.
    #[arg(long, short = 'w', default_value = "4", value_parser = parse_width)]
    pub width: Width,
}

#[derive(Args, Debug)]
pub struct FlashArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Image file to program.
    pub file: PathBuf,
    /// Offset into flash.
    #[arg(long, default_value = "0")]
    pub offset: String,
    /// Bytes to program. Default: the whole file.
    #[arg(long)]
    pub length: Option<String>,
    /// Bus address of flash offset 0.
    #[arg(long, env = "IPCBUS_FLASH_BASE", default_value = "0")]
    pub base: String,
    /// Erase sector size.
    #[arg(long, default_value = "0x10000")]
    pub sector_size: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Valid address range `start:end` (repeatable). Default: everything.
    #[arg(long)]
    pub region: Vec<String>,
    /// Exit after the first master disconnects.
    #[arg(long)]
    pub once: bool,
    /// Log every raw frame.
    #[arg(long)]
    pub trace: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub type BoxedLink = Box<dyn Link + Send>;

/// Open the link named by `--link`.
#[cfg(unix)]
pub fn open_link(spec: &str) -> CliResult<BoxedLink> {
    let link: BoxedLink = match spec.strip_prefix("unix:") {
        Some(path) => Box::new(
            ipcbus_link::connect_unix(path).map_err(|err| link_error("connect failed", err))?,
        ),
        None => Box::new(
            ipcbus_link::SerialLink::open(spec).map_err(|err| link_error("open failed", err))?,
        ),
    };
    Ok(link)
}

#[cfg(not(unix))]
pub fn open_link(spec: &str) -> CliResult<BoxedLink> {
    Err(CliError::usage(format!(
        "cannot open {spec}: links are only supported on unix"
    )))
}

/// Open the link and wrap it in a register client.
pub fn connect(args: &LinkArgs, flash: FlashConfig) -> CliResult<RegisterClient<BoxedLink>> {
    let config = SessionConfig {
        timeout: parse_duration(&args.timeout)?,
        trace: args.trace,
        ..SessionConfig::default()
    };
    let link = open_link(&args.link)?;
    Ok(RegisterClient::with_flash_config(
        Session::with_config(link, config),
        flash,
    ))
}

pub fn parse_width(input: &str) -> Result<Width, String> {
    let raw: u8 = input
        .parse()
        .map_err(|_| format!("invalid width: {input}"))?;
    Width::try_from(raw).map_err(|_| format!("width must be 1, 2 or 4, got {raw}"))
}

/// Parse a decimal or `0x`-prefixed hex number; `_` separators are allowed.
pub fn parse_u32(name: &str, input: &str) -> CliResult<u32> {
    let cleaned: String = input.trim().chars().filter(|c| *c != '_').collect();
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|_| CliError::usage(format!("invalid {name}: {input}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("us") {
        (num, "us")
    } else if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(match unit {
        "us" => Duration::from_micros(value),
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
