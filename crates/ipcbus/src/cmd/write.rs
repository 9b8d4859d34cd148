use ipcbus_peer::FlashConfig;

use crate::cmd::{connect, parse_u32, WriteArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_ok, OutputFormat};

pub fn run(args: WriteArgs, format: OutputFormat) -> CliResult<i32> {
    let addr = parse_u32("address", &args.addr)?;
    let values = args
        .values
        .iter()
        .map(|v| parse_u32("value", v))
        .collect::<CliResult<Vec<u32>>>()?;

    let mut client = connect(&args.link, FlashConfig::default())?;
    client
        .write(addr, args.width, &values)
        .map_err(|err| peer_error("write failed", err))?;
    print_ok("write", Some(addr), format);
    Ok(SUCCESS)
}
