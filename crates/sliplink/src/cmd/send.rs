use std::fs;

use sliplink_link::{open_link_layer, LinkConfig};

use crate::cmd::SendArgs;
use crate::exit::{io_error, link_error, CliResult, SUCCESS};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let config =
        LinkConfig::from_path(&args.config).map_err(|err| link_error("config failed", err))?;
    let payload = resolve_payload(&args)?;

    let layer = open_link_layer(&config).map_err(|err| link_error("open failed", err))?;
    layer
        .send(&payload, &args.next_hop)
        .map_err(|err| link_error("send failed", err))?;

    tracing::info!(next_hop = %args.next_hop, size = payload.len(), "datagram sent");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    use super::*;

    fn args(data: Option<&str>, file: Option<PathBuf>) -> SendArgs {
        SendArgs {
            config: PathBuf::from("/tmp/links.json"),
            next_hop: Ipv4Addr::new(10, 0, 0, 2),
            data: data.map(str::to_string),
            file,
        }
    }

    #[test]
    fn payload_from_data() {
        assert_eq!(resolve_payload(&args(Some("hi"), None)).unwrap(), b"hi");
    }

    #[test]
    fn payload_defaults_to_empty() {
        assert!(resolve_payload(&args(None, None)).unwrap().is_empty());
    }

    #[test]
    fn missing_payload_file_is_error() {
        let err = resolve_payload(&args(None, Some(PathBuf::from("/nonexistent/payload"))))
            .unwrap_err();
        assert_eq!(err.code, crate::exit::TRANSPORT_ERROR);
    }
}
