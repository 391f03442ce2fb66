use std::io::Read;

use sliplink_frame::encode;

use crate::cmd::EncodeArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::print_raw;

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let datagram = match &args.file {
        Some(path) => std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };

    tracing::debug!(size = datagram.len(), "encoding datagram");
    print_raw(&encode(&datagram));
    Ok(SUCCESS)
}
