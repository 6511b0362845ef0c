use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_ospf::config::RouterConfig;
use sim_ospf::router::Router;
use sim_ospf::terminal;

#[derive(Parser)]
#[command(name = "sim-ospf", about = "Simulated link-state router")]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, required_unless_present = "config")]
    simulated_ip: Option<String>,

    #[arg(long)]
    process_ip: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    capacity: Option<usize>,
}

impl Cli {
    fn into_config(self) -> Result<RouterConfig> {
        let mut config = match &self.config {
            Some(path) => RouterConfig::load(path)?,
            None => RouterConfig::new(
                self.simulated_ip.clone().unwrap_or_default(),
                "127.0.0.1",
                0,
            ),
        };
        if let Some(simulated_ip) = self.simulated_ip {
            config.simulated_ip = simulated_ip;
        }
        if let Some(process_ip) = self.process_ip {
            config.process_ip = process_ip;
        }
        if let Some(port) = self.port {
            config.process_port = port;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config()?;

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let router = Router::start(&config)
            .await
            .with_context(|| format!("starting router {}", config.simulated_ip))?;
        println!(
            "Router {} listening on {}",
            router.identity().simulated_ip,
            router.identity().transport_addr()
        );
        println!("{}", terminal::usage());

        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            result = terminal::run(&router, stdin, tokio::io::stdout()) => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                router.quit().await;
            }
        }
        Ok(())
    })
}
