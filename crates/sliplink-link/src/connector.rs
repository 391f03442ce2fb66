use std::net::Ipv4Addr;

use sliplink_transport::{StreamLine, Transport};
use tracing::info;

use crate::config::{Endpoint, LinkConfig};
use crate::error::Result;
use crate::layer::LinkLayer;

/// Open the transport behind one endpoint.
pub fn open_endpoint(endpoint: &Endpoint) -> Result<StreamLine> {
    let line = match endpoint {
        Endpoint::Tcp(addr) => StreamLine::connect_tcp(addr.as_str())?,
        #[cfg(unix)]
        Endpoint::Unix(path) => StreamLine::connect_unix(path)?,
        #[cfg(not(unix))]
        Endpoint::Unix(path) => {
            return Err(sliplink_transport::TransportError::Connect {
                endpoint: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                ),
            }
            .into());
        }
        Endpoint::Serial(path) => StreamLine::open_serial(path)?,
    };
    Ok(line)
}

/// Open every configured link and build the layer over them.
pub fn open_link_layer(config: &LinkConfig) -> Result<LinkLayer<Ipv4Addr>> {
    config.validate()?;

    let mut channels: Vec<(Ipv4Addr, Box<dyn Transport>)> = Vec::with_capacity(config.links.len());
    for entry in &config.links {
        let line = open_endpoint(&entry.endpoint)?;
        info!(next_hop = %entry.next_hop, endpoint = %entry.endpoint, "link opened");
        channels.push((entry.next_hop, Box::new(line)));
    }

    Ok(LinkLayer::with_config(channels, config.frame_config())?
        .with_ignore_checksum(config.ignore_checksum))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use sliplink_frame::{encode, FrameReader};

    use super::*;
    use crate::config::LinkEntry;
    use crate::error::LinkError;

    #[test]
    fn opens_tcp_link_and_exchanges_datagrams() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let (datagram_tx, datagram_rx) = mpsc::channel();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            datagram_tx.send(reader.read_frame().unwrap()).unwrap();

            // Reply only after the layer has spoken, so its receiver is registered.
            stream.write_all(&encode(b"hello from peer")).unwrap();
        });

        let config = LinkConfig {
            ignore_checksum: true,
            max_frame_len: 1500,
            links: vec![LinkEntry {
                next_hop: Ipv4Addr::new(10, 0, 0, 2),
                endpoint: Endpoint::Tcp(addr.to_string()),
            }],
        };
        let layer = open_link_layer(&config).unwrap();
        assert!(layer.ignore_checksum());

        let (rx_tx, rx_rx) = mpsc::channel();
        layer.register_receiver(move |datagram| {
            rx_tx.send(datagram)?;
            Ok(())
        });

        layer
            .send(b"hello from layer", &Ipv4Addr::new(10, 0, 0, 2))
            .unwrap();

        let sent = datagram_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(sent.as_ref(), b"hello from layer");

        let received = rx_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received.as_ref(), b"hello from peer");

        peer.join().unwrap();
    }

    #[test]
    fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = open_endpoint(&Endpoint::Tcp(addr.to_string())).unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
    }

    #[test]
    fn invalid_config_is_rejected_before_opening() {
        let config = LinkConfig {
            ignore_checksum: false,
            max_frame_len: 1500,
            links: Vec::new(),
        };
        assert!(matches!(
            open_link_layer(&config),
            Err(LinkError::NoLinks)
        ));
    }
}
