use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ipcbus_peer::MemoryTarget;

use crate::cmd::{parse_u32, ServeArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};

/// How often an idle listener checks for Ctrl-C.
#[cfg(unix)]
const ACCEPT_POLL: std::time::Duration = std::time::Duration::from_millis(50);

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let regions = args
        .region
        .iter()
        .map(|r| parse_region(r))
        .collect::<CliResult<Vec<_>>>()?;
    let target = regions
        .into_iter()
        .fold(MemoryTarget::new(), MemoryTarget::with_region);

    serve(args, target)
}

#[cfg(unix)]
fn serve(args: ServeArgs, mut target: MemoryTarget) -> CliResult<i32> {
    use ipcbus_link::UnixLinkListener;
    use ipcbus_peer::{Responder, SessionConfig};
    use tracing::info;

    use crate::exit::{link_error, peer_error};

    // The handler must be in place before the socket path becomes visible.
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let listener =
        UnixLinkListener::bind(&args.path).map_err(|err| link_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| link_error("listen failed", err))?;

    let config = SessionConfig {
        trace: args.trace,
        ..SessionConfig::default()
    };

    while running.load(Ordering::SeqCst) {
        let Some(link) = listener
            .try_accept()
            .map_err(|err| link_error("accept failed", err))?
        else {
            std::thread::sleep(ACCEPT_POLL);
            continue;
        };
        info!("master connected");

        let mut responder = Responder::with_config(link, target, config.clone());
        let served = responder.serve_until(|| !running.load(Ordering::SeqCst));
        target = responder.into_parts().1;
        served.map_err(|err| peer_error("serve failed", err))?;

        if args.once {
            break;
        }
    }

    info!("serve stopped");
    Ok(SUCCESS)
}

#[cfg(not(unix))]
fn serve(args: ServeArgs, _target: MemoryTarget) -> CliResult<i32> {
    Err(CliError::usage(format!(
        "cannot serve on {}: unix sockets are required",
        args.path.display()
    )))
}

/// Parse `start:end` (end exclusive).
fn parse_region(input: &str) -> CliResult<Range<u32>> {
    let (start, end) = input
        .split_once(':')
        .ok_or_else(|| CliError::usage(format!("region must be start:end, got {input}")))?;
    let start = parse_u32("region start", start)?;
    let end = parse_u32("region end", end)?;
    if end <= start {
        return Err(CliError::usage(format!("empty region: {input}")));
    }
    Ok(start..end)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
