use std::fs;

use ipcbus_peer::FlashConfig;
use tracing::info;

use crate::cmd::{connect, parse_u32, FlashArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_flash_report, OutputFormat};

pub fn run(args: FlashArgs, format: OutputFormat) -> CliResult<i32> {
    let image = fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;

    let offset = parse_u32("offset", &args.offset)?;
    let length = match &args.length {
        Some(length) => parse_u32("length", length)?,
        None => u32::try_from(image.len()).map_err(|_| {
            CliError::new(
                DATA_INVALID,
                format!("{} is larger than the address space", args.file.display()),
            )
        })?,
    };
    let flash = FlashConfig {
        base: parse_u32("flash base", &args.base)?,
        sector_size: parse_u32("sector size", &args.sector_size)?,
        ..FlashConfig::default()
    };

    let mut client = connect(&args.link, flash)?;
    let report = client
        .flash_update_with_progress(offset, length, &image, |p| {
            if (p.index + 1) % 64 == 0 || p.index + 1 == p.total {
                info!(
                    done = p.index + 1,
                    total = p.total,
                    addr = format_args!("{:#010x}", p.addr),
                    "flash progress"
                );
            }
        })
        .map_err(|err| peer_error("flash failed", err))?;

    print_flash_report(&report, format);
    Ok(SUCCESS)
}
