use ipcbus_peer::FlashConfig;

use crate::cmd::{connect, parse_u32, SetclrArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_ok, OutputFormat};

pub fn run(args: SetclrArgs, format: OutputFormat) -> CliResult<i32> {
    let addr = parse_u32("address", &args.addr)?;
    let mask = parse_u32("mask", &args.mask)?;
    let val = parse_u32("value", &args.val)?;

    let mut client = connect(&args.link, FlashConfig::default())?;
    client
        .setclr(addr, args.width, mask, val)
        .map_err(|err| peer_error("setclr failed", err))?;
    print_ok("setclr", Some(addr), format);
    Ok(SUCCESS)
}
