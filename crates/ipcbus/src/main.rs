mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ipcbus", version, about = "Register access over the ipcbus serial protocol")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.command.traces_frames() {
        cli.log_level.at_least(LogLevel::Debug)
    } else {
        cli.log_level
    };
    init_logging(cli.log_format, level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_subcommand() {
        let cli = Cli::try_parse_from([
            "ipcbus",
            "read",
            "--link",
            "unix:/tmp/bus.sock",
            "0x40001000",
            "--width",
            "4",
            "--count",
            "2",
        ])
        .expect("read args should parse");

        match cli.command {
            Command::Read(args) => {
                assert_eq!(args.addr, "0x40001000");
                assert_eq!(args.count, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn write_requires_values() {
        let err = Cli::try_parse_from(["ipcbus", "write", "--link", "unix:/tmp/x", "0x10"])
            .expect_err("write without values should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_unknown_width() {
        let err = Cli::try_parse_from([
            "ipcbus", "read", "--link", "unix:/tmp/x", "0x10", "--width", "3",
        ])
        .expect_err("width 3 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "ipcbus",
            "serve",
            "/tmp/bus.sock",
            "--region",
            "0x0:0x1000",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
    }
}
