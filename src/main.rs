use log::{error, info};
use structopt::StructOpt;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate num_derive;

mod cli;
mod ipfilter;
mod logger;
mod netflow;
mod rdr;
mod reactor;
mod repeater;
mod session;

use cli::Opts;
use ipfilter::IpFilter;
use reactor::Reactor;
use repeater::Repeater;

fn main() {
    let opts = Opts::from_args();
    logger::init(opts.log_level);

    info!("Starting App");

    let mut ip_filter = IpFilter::new();
    for spec in &opts.filter {
        if let Err(e) = ip_filter.add_networks(spec) {
            error!("invalid filter '{}': {}", spec, e);
            std::process::exit(1);
        }
    }
    if !ip_filter.is_empty() {
        info!("Excluding networks from export: {}", ip_filter);
    }

    let mut repeater = Repeater::new();
    for spec in &opts.repeater {
        if let Err(e) = repeater.add_endpoint(spec) {
            error!("invalid repeater '{}': {}", spec, e);
            std::process::exit(1);
        }
    }

    let mut reactor = match Reactor::new(opts.src_socket_addr(), opts.dst_socket_addr(), repeater, ip_filter) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to initialize sockets: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = reactor.install_signal_handler() {
        error!("failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    reactor.start_repeater();

    if let Err(e) = reactor.run() {
        error!("event loop error: {}", e);
        std::process::exit(1);
    }
}
