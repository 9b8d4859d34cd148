use ipcbus_peer::FlashConfig;

use crate::cmd::{connect, EchoArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_ok, OutputFormat};

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(&args.link, FlashConfig::default())?;
    client
        .echo(args.data.as_bytes())
        .map_err(|err| peer_error("echo failed", err))?;
    print_ok("echo", None, format);
    Ok(SUCCESS)
}
