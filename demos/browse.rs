//! Example: Browse a simulated remote registry lazily
//!
//! Usage:
//!   cargo run --example browse -- [--path HKEY_LOCAL_MACHINE/SOFTWARE] [--latency-ms 50]

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::process;
use std::time::Duration;

use hivemirror::{
    CacheHandle, ChildDescriptor, ListRequest, Payload, Responder, Transport, ValueEntry, ValueSet,
};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str =
    "Usage: cargo run --example browse -- [--path HIVE/KEY/...] [--latency-ms MILLIS]";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hivemirror=debug"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn usage_and_exit() -> ! {
    eprintln!("{USAGE}");
    process::exit(1);
}

/// In-process stand-in for a remote host: answers listings after a delay.
struct SimulatedHost {
    keys: BTreeMap<&'static str, Vec<&'static str>>,
    latency: Duration,
}

impl SimulatedHost {
    fn new(latency: Duration) -> Self {
        let keys = BTreeMap::from([
            ("", vec!["HKEY_LOCAL_MACHINE", "HKEY_CURRENT_USER"]),
            ("HKEY_LOCAL_MACHINE", vec!["HARDWARE", "SOFTWARE", "SYSTEM"]),
            ("HKEY_LOCAL_MACHINE/SOFTWARE", vec!["Classes", "Microsoft", "Vendor"]),
            ("HKEY_LOCAL_MACHINE/SOFTWARE/Vendor", vec!["App"]),
            ("HKEY_CURRENT_USER", vec!["Console", "Software"]),
        ]);
        Self { keys, latency }
    }
}

impl Transport for SimulatedHost {
    fn list_children(&mut self, request: ListRequest, responder: Responder) {
        let listing = self.keys.get(request.path.as_str());
        let children: Option<Vec<ChildDescriptor>> = listing.map(|names| {
            names
                .iter()
                .map(|name| {
                    if request.is_roots() {
                        return ChildDescriptor::named(*name);
                    }
                    let values = ValueSet::new(vec![ValueEntry {
                        name: "(Default)".to_string(),
                        data: format!("{}/{}", request.path, name),
                    }]);
                    ChildDescriptor::new(*name, Payload::Values(values))
                })
                .collect()
        });
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let res = match children {
                Some(children) => responder.children(children).await,
                None if request.path.matches('/').count() < 3 => {
                    responder.children(Vec::new()).await
                }
                None => responder.fail("access denied").await,
            };
            if let Err(e) = res {
                eprintln!("delivery for {} dropped: {}", request.path, e);
            }
        });
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let mut path = "HKEY_LOCAL_MACHINE/SOFTWARE/Vendor".to_string();
    let mut latency_ms = 50u64;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--path" => path = args.next().unwrap_or_else(|| usage_and_exit()),
            "--latency-ms" => {
                latency_ms = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return;
            }
            _ => usage_and_exit(),
        }
    }

    let cache = CacheHandle::spawn(SimulatedHost::new(Duration::from_millis(latency_ms)));
    match cache.load_roots().await {
        Ok(hives) => println!("{} hives", hives.len()),
        Err(e) => {
            eprintln!("Failed to list hives: {}", e);
            process::exit(1);
        }
    }

    // Expand every ancestor of the requested path, one level at a time.
    let segments = hivemirror::tree::split_path(&path);
    let mut expanded = HashSet::new();
    let mut current = String::new();
    for segment in segments {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);

        // Two concurrent expansions of the same key share one request.
        let (first, second) = futures::join!(cache.expand(&current), cache.expand(&current));
        match (first, second) {
            (Ok(children), Ok(_)) => {
                println!("{} -> {} subkeys", current, children.len());
                expanded.insert(current.clone());
            }
            (Err(e), _) | (_, Err(e)) => {
                eprintln!("Failed to expand {}: {}", current, e);
                break;
            }
        }
    }

    println!();
    match cache.visible_rows(&expanded).await {
        Ok(rows) => {
            for (depth, node) in rows {
                let marker = if node.expandable { "+" } else { " " };
                println!("{}{} {}", "  ".repeat(depth), marker, node.name);
            }
        }
        Err(e) => eprintln!("Failed to render tree: {}", e),
    }

    cache.shutdown().await;
}
