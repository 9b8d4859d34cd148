use ipcbus_peer::FlashConfig;

use crate::cmd::{connect, parse_u32, ReadArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_values, OutputFormat};

pub fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    let addr = parse_u32("address", &args.addr)?;
    let mut client = connect(&args.link, FlashConfig::default())?;
    let values = client
        .read(addr, args.width, args.count)
        .map_err(|err| peer_error("read failed", err))?;
    print_values(addr, args.width, &values, format);
    Ok(SUCCESS)
}
