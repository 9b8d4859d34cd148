use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("ipcbus {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("IPCBUS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("IPCBUS_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("crc: {}", crc_name());
    println!(
        "features: peer={}, async={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}

fn crc_name() -> String {
    let crc = ipcbus_frame::DEFAULT_CRC;
    format!("poly={:#06x} init={:#06x} check={:#06x}", crc.poly, crc.init, crc.check)
}
