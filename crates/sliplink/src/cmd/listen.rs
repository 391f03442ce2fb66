use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sliplink_link::{open_link_layer, LinkConfig};

use crate::cmd::ListenArgs;
use crate::exit::{link_error, CliError, CliResult, SUCCESS};
use crate::output::{print_datagram, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config =
        LinkConfig::from_path(&args.config).map_err(|err| link_error("config failed", err))?;
    let layer = open_link_layer(&config).map_err(|err| link_error("open failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel::<Bytes>();
    layer.register_receiver(move |datagram| {
        tx.send(datagram)?;
        Ok(())
    });
    tracing::info!(links = layer.len(), "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let datagram = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(datagram) => datagram,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_datagram(&datagram, "link", format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    for next_hop in layer.next_hops() {
        if let Some(stats) = layer.stats(next_hop) {
            tracing::debug!(%next_hop, ?stats, "link statistics");
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
