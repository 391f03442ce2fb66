//! Two-link example: a router node with links to two neighbours.
//!
//! Run with:
//!   cargo run --example two-links
//!
//! Each link is an in-memory line pair. The router sends one datagram to each
//! neighbour, then both neighbours answer and the router prints what it got.

use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::time::Duration;

use sliplink::link::LinkLayer;
use sliplink::transport::MemoryLine;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let alpha = Ipv4Addr::new(10, 0, 0, 2);
    let beta = Ipv4Addr::new(10, 0, 0, 3);
    let router_addr = Ipv4Addr::new(10, 0, 0, 1);

    let (router_to_alpha, alpha_line) = MemoryLine::pair();
    let (router_to_beta, beta_line) = MemoryLine::pair();

    let router = LinkLayer::new([(alpha, router_to_alpha), (beta, router_to_beta)])?;
    let alpha_node = LinkLayer::new([(router_addr, alpha_line)])?;
    let beta_node = LinkLayer::new([(router_addr, beta_line)])?;

    let (tx, rx) = mpsc::channel();
    router.register_receiver(move |datagram| {
        tx.send(datagram)?;
        Ok(())
    });

    for (name, node) in [("alpha", &alpha_node), ("beta", &beta_node)] {
        node.register_receiver(move |datagram| {
            eprintln!(
                "[{name}] received {:?}",
                String::from_utf8_lossy(&datagram)
            );
            Ok(())
        });
    }

    // Payloads contain the SLIP reserved bytes on purpose.
    router.send(b"to alpha \xC0 end", &alpha)?;
    router.send(b"to beta \xDB esc", &beta)?;

    alpha_node.send(b"alpha says hi", &router_addr)?;
    beta_node.send(b"beta says hi", &router_addr)?;

    for _ in 0..2 {
        let datagram = rx.recv_timeout(Duration::from_secs(1))?;
        eprintln!("[router] received {:?}", String::from_utf8_lossy(&datagram));
    }

    for hop in router.next_hops() {
        if let Some(stats) = router.stats(hop) {
            eprintln!(
                "[router] link {hop}: sent {} frames, received {} frames",
                stats.frames_sent, stats.frames_received
            );
        }
    }

    Ok(())
}
