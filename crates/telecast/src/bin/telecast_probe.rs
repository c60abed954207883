//! # Telecast Probe
//!
//! Sends a burst of numbered telemetry datagrams through a delivery session.
//!
//! ## Usage
//!
//! ```bash
//! telecast_probe --host 239.1.1.1 --port 4242 --mode multicast --ttl 2 --count 100
//! ```
//!
//! Without `--host`/`--mode` the probe starts lazily: the remembered endpoint
//! is used if one is stored, otherwise 127.0.0.1:4242.

use std::time::Duration;
use telecast::{ConfigStore, DeliveryMode, EndpointConfig, Supervisor, DEFAULT_HOST, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

fn parse_mode(raw: &str) -> Option<DeliveryMode> {
    match raw.to_ascii_lowercase().as_str() {
        "localhost" => Some(DeliveryMode::Localhost),
        "unicast" => Some(DeliveryMode::Unicast),
        "multicast" => Some(DeliveryMode::Multicast),
        _ => None,
    }
}

fn print_help() {
    println!("Usage: telecast_probe [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -H, --host <HOST>          Destination host or group");
    println!("  -p, --port <PORT>          Destination port (default: {DEFAULT_PORT})");
    println!("  -m, --mode <MODE>          localhost | unicast | multicast");
    println!("  -t, --ttl <HOPS>           Multicast TTL (default: 1)");
    println!("  -n, --count <NUM>          Datagrams to send (default: 10)");
    println!("  -i, --interval-ms <MS>     Pause between datagrams (default: 100)");
    println!("  -s, --save                 Remember this endpoint for later runs");
    println!("  -h, --help                 Show this help");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TELECAST PROBE                                           ║");
    println!("║         OUTBOUND UDP TELEMETRY                                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let mut host: Option<String> = None;
    let mut port = DEFAULT_PORT;
    let mut mode: Option<DeliveryMode> = None;
    let mut ttl: Option<u32> = None;
    let mut count = 10u32;
    let mut interval_ms = 100u64;
    let mut save = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-H" => {
                if i + 1 < args.len() {
                    host = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or(DEFAULT_PORT);
                    i += 1;
                }
            }
            "--mode" | "-m" => {
                if i + 1 < args.len() {
                    mode = parse_mode(&args[i + 1]);
                    if mode.is_none() {
                        eprintln!("unknown mode '{}', inferring from host", args[i + 1]);
                    }
                    i += 1;
                }
            }
            "--ttl" | "-t" => {
                if i + 1 < args.len() {
                    ttl = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--interval-ms" | "-i" => {
                if i + 1 < args.len() {
                    interval_ms = args[i + 1].parse().unwrap_or(100);
                    i += 1;
                }
            }
            "--save" | "-s" => save = true,
            "--help" | "-h" => {
                print_help();
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let supervisor = Supervisor::new(ConfigStore::per_user());
    let exit = supervisor.exit_guard();

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Config File:        {}", supervisor.store().path().display());
    println!("│ Datagrams:          {count}");
    println!("│ Interval:           {interval_ms} ms");

    let started = if host.is_some() || mode.is_some() {
        let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let config = match mode {
            Some(mode) => Ok(EndpointConfig::new(mode, host, port)),
            None => EndpointConfig::infer(&host, port),
        };
        config.and_then(|config| {
            let config = match ttl {
                Some(ttl) => config.with_ttl(ttl),
                None => config,
            };
            supervisor.configure_and_start(Some(config.remembered(save)), save)
        })
    } else {
        supervisor.ensure_started(DEFAULT_HOST, port)
    };

    if let Err(e) = started {
        println!("└──────────────────────────────────────────────────────────────────┘");
        eprintln!("failed to start delivery: {e}");
        drop(exit);
        std::process::exit(1);
    }

    if let Some(endpoint) = supervisor.endpoint() {
        println!("│ Endpoint:           {endpoint}");
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let interval = Duration::from_millis(interval_ms);
    let mut accepted = 0u32;
    for seq in 0..count {
        let payload = format!("telecast-probe seq={seq}");
        if supervisor.enqueue(payload.into_bytes()) {
            accepted += 1;
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    // Give the pump a moment to flush the tail before reporting
    std::thread::sleep(Duration::from_millis(50));

    println!("┌─ SESSION ───────────────────────────────────────────────────────┐");
    println!("│ Accepted:           {accepted}/{count}");
    if let Some(stats) = supervisor.stats() {
        println!("│ Epoch:              {}", stats.epoch);
        println!("│ Delivered:          {}", stats.delivered);
        println!("│ Failed:             {}", stats.failed);
        println!("│ Evicted:            {}", stats.queue.evicted);
        println!("│ Queue Depth:        {}/{}", stats.queue.depth, stats.queue.capacity);
    }
    println!("└──────────────────────────────────────────────────────────────────┘");

    drop(exit);
}
