use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wrap one datagram (stdin or file) in a SLIP frame on stdout.
    Encode(EncodeArgs),
    /// Decode a SLIP byte stream (stdin or file) and print each datagram.
    Decode(DecodeArgs),
    /// Send one datagram to a next hop over the configured links.
    Send(SendArgs),
    /// Print datagrams arriving on any configured link.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Read the datagram from a file instead of stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Read the byte stream from a file instead of stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Largest datagram to accept, in bytes.
    #[arg(long)]
    pub max_frame_len: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Link configuration file (JSON).
    #[arg(long, short = 'c', env = "SLIPLINK_CONFIG")]
    pub config: PathBuf,
    /// Next hop to send to.
    #[arg(long)]
    pub next_hop: Ipv4Addr,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Link configuration file (JSON).
    #[arg(long, short = 'c', env = "SLIPLINK_CONFIG")]
    pub config: PathBuf,
    /// Exit after receiving N datagrams.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
