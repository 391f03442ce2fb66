use std::fs::File;
use std::io::Read;

use sliplink_frame::{FrameConfig, FrameReader};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_datagram, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = FrameConfig::default();
    if let Some(max) = args.max_frame_len {
        config.max_frame_len = max;
    }

    let (input, source): (Box<dyn Read>, String) = match &args.file {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            (Box::new(file), path.display().to_string())
        }
        None => (Box::new(std::io::stdin().lock()), "stdin".to_string()),
    };

    let mut decoded = 0usize;
    for datagram in FrameReader::with_config(input, config) {
        let datagram = datagram.map_err(|err| frame_error("decode failed", err))?;
        print_datagram(&datagram, &source, format);
        decoded += 1;
    }

    tracing::debug!(decoded, "end of input");
    Ok(SUCCESS)
}
