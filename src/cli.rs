use std::net::Ipv4Addr;

use log::LevelFilter;
use structopt::StructOpt;

const DEFAULT_SRC_PORT: u16 = 10000;
const DEFAULT_DST_PORT: u16 = 9995;

/// Cisco SCE RDR to NetFlow v5 converter.
#[derive(Debug, StructOpt)]
#[structopt(name = "rdr2netflow")]
pub struct Opts {
    /// Address to bind for listening
    #[structopt(short = "s", long = "src-addr", default_value = "0.0.0.0")]
    pub src_addr: Ipv4Addr,

    /// Port number to listen on
    #[structopt(short = "p", long = "src-port", default_value = "10000")]
    pub src_port: u16,

    /// Remote host to send NetFlow to
    #[structopt(short = "d", long = "dst-addr", default_value = "127.0.0.1")]
    pub dst_addr: Ipv4Addr,

    /// Remote NetFlow collector port
    #[structopt(short = "P", long = "dst-port", default_value = "9995")]
    pub dst_port: u16,

    /// RDR Repeater: send all incoming packets to this host/port, repeatable
    #[structopt(short = "R", long = "repeater")]
    pub repeater: Vec<String>,

    /// Comma-separated list of networks to exclude from export, repeatable
    #[structopt(short = "F", long = "filter")]
    pub filter: Vec<String>,

    /// Send/receive socket buffer size in bytes
    #[structopt(short = "b", long = "buffer-size")]
    pub buffer_size: Option<u32>,

    /// Verbose output level
    #[structopt(short = "V", long = "verbose", default_value = "1")]
    pub verbose: u32,

    /// Log level for the app logger, independent of -V's packet-dump verbosity
    #[structopt(long = "log", default_value = "Info")]
    pub log_level: LevelFilter,
}

impl Opts {
    pub fn src_socket_addr(&self) -> std::net::SocketAddrV4 {
        std::net::SocketAddrV4::new(self.src_addr, if self.src_port != 0 { self.src_port } else { DEFAULT_SRC_PORT })
    }

    pub fn dst_socket_addr(&self) -> std::net::SocketAddrV4 {
        std::net::SocketAddrV4::new(self.dst_addr, if self.dst_port != 0 { self.dst_port } else { DEFAULT_DST_PORT })
    }
}
