//! Line-oriented operator console.

use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::router::Router;

const USAGE: &str = "Commands:
  attach <process_ip> <process_port> <simulated_ip> <weight>
  start
  connect <process_ip> <process_port> <simulated_ip> <weight>
  disconnect <port>
  detect <simulated_ip>
  neighbors
  update <process_ip> <process_port> <simulated_ip> <weight>
  lsd
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerArgs {
    pub process_ip: String,
    pub process_port: u32,
    pub simulated_ip: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach(PeerArgs),
    Start,
    Connect(PeerArgs),
    Disconnect(usize),
    Detect(String),
    Neighbors,
    Update(PeerArgs),
    Lsd,
    Quit,
}

pub fn usage() -> &'static str {
    USAGE
}

/// Parses one console line. The error text is meant for the operator.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("attach", rest) => Command::Attach(peer_args(name, rest)?),
        ("connect", rest) => Command::Connect(peer_args(name, rest)?),
        ("update", rest) => Command::Update(peer_args(name, rest)?),
        ("start", []) => Command::Start,
        ("disconnect", [port]) => Command::Disconnect(
            port.parse()
                .map_err(|_| format!("disconnect: port must be a slot index, got {:?}", port))?,
        ),
        ("detect", [destination]) => Command::Detect(destination.to_string()),
        ("neighbors", []) => Command::Neighbors,
        ("lsd", []) => Command::Lsd,
        ("quit", []) => Command::Quit,
        ("start" | "disconnect" | "detect" | "neighbors" | "lsd" | "quit", _) => {
            return Err(format!("{}: wrong number of arguments", name));
        }
        _ => return Err(format!("unknown command {:?}", name)),
    };
    Ok(command)
}

fn peer_args(name: &str, args: &[&str]) -> Result<PeerArgs, String> {
    let [process_ip, process_port, simulated_ip, weight] = args else {
        return Err(format!(
            "{}: expected <process_ip> <process_port> <simulated_ip> <weight>",
            name
        ));
    };
    Ok(PeerArgs {
        process_ip: process_ip.to_string(),
        process_port: process_port
            .parse()
            .map_err(|_| format!("{}: invalid port {:?}", name, process_port))?,
        simulated_ip: simulated_ip.to_string(),
        weight: weight
            .parse()
            .map_err(|_| format!("{}: invalid weight {:?}", name, weight))?,
    })
}

/// Runs one command against the router and returns what to print.
pub async fn execute(router: &Router, command: Command) -> String {
    match command {
        Command::Attach(peer) => match router
            .attach_neighbor(&peer.process_ip, peer.process_port, &peer.simulated_ip, peer.weight)
            .await
        {
            Ok(slot) => format!("attached {} on port {}", peer.simulated_ip, slot),
            Err(e) => format!("attach failed: {}", e),
        },
        Command::Start => {
            let results = router.start_handshakes().await;
            if results.is_empty() {
                return "no links to start".to_string();
            }
            let mut output = String::new();
            for (peer, outcome) in results {
                let _ = match outcome {
                    Ok(()) => writeln!(output, "{}: TWO_WAY", peer),
                    Err(e) => writeln!(output, "{}: {}", peer, e),
                };
            }
            output.trim_end().to_string()
        }
        Command::Connect(peer) => match router
            .connect_neighbor(&peer.process_ip, peer.process_port, &peer.simulated_ip, peer.weight)
            .await
        {
            Ok(()) => format!("connected to {}", peer.simulated_ip),
            Err(e) => format!("connect failed: {}", e),
        },
        Command::Disconnect(slot) => match router.disconnect_slot(slot).await {
            Ok(()) => format!("port {} disconnected", slot),
            Err(e) => format!("disconnect failed: {}", e),
        },
        Command::Detect(destination) => router.shortest_path_to(&destination).await.to_string(),
        Command::Neighbors => {
            let neighbors = router.list_neighbors().await;
            if neighbors.is_empty() {
                return "no neighbors".to_string();
            }
            let mut output = String::new();
            let _ = writeln!(
                output,
                "{:<6} {:<16} {:<22} {:<7} {:<8} {}",
                "Port", "Simulated IP", "Process", "Weight", "State", "Since"
            );
            for (slot, link) in neighbors {
                let _ = writeln!(
                    output,
                    "{:<6} {:<16} {:<22} {:<7} {:<8} {}",
                    slot,
                    link.remote.simulated_ip,
                    link.remote.transport_addr(),
                    link.weight,
                    link.status.to_string(),
                    link.last_change.format("%H:%M:%S")
                );
            }
            output.trim_end().to_string()
        }
        Command::Update(peer) => match router
            .update_weight(&peer.process_ip, peer.process_port, &peer.simulated_ip, peer.weight)
            .await
        {
            Ok(()) => format!("weight to {} is now {}", peer.simulated_ip, peer.weight),
            Err(e) => format!("update failed: {}", e),
        },
        Command::Lsd => router.render_database().await.trim_end().to_string(),
        Command::Quit => {
            router.quit().await;
            "bye".to_string()
        }
    }
}

/// Reads commands until `quit` or end of input.
pub async fn run<R, W>(router: &Router, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match parse(&line) {
            Ok(command) => {
                let quit = command == Command::Quit;
                let reply = execute(router, command).await;
                if quit {
                    output.write_all(format!("{}\n", reply).as_bytes()).await?;
                    output.flush().await?;
                    return Ok(());
                }
                reply
            }
            Err(e) => format!("{}\n{}", e, USAGE),
        };
        output.write_all(format!("{}\n", reply).as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;

    fn peer(ip: &str, port: u32, sim: &str, weight: u32) -> PeerArgs {
        PeerArgs {
            process_ip: ip.to_string(),
            process_port: port,
            simulated_ip: sim.to_string(),
            weight,
        }
    }

    #[test]
    fn test_parse_peer_commands() {
        assert_eq!(
            parse("attach 127.0.0.1 5001 192.168.1.2 3"),
            Ok(Command::Attach(peer("127.0.0.1", 5001, "192.168.1.2", 3)))
        );
        assert_eq!(
            parse("  connect 127.0.0.1 5002 192.168.1.3 7 "),
            Ok(Command::Connect(peer("127.0.0.1", 5002, "192.168.1.3", 7)))
        );
        assert_eq!(
            parse("update 127.0.0.1 5002 192.168.1.3 1"),
            Ok(Command::Update(peer("127.0.0.1", 5002, "192.168.1.3", 1)))
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("start"), Ok(Command::Start));
        assert_eq!(parse("disconnect 2"), Ok(Command::Disconnect(2)));
        assert_eq!(parse("detect 10.0.0.3"), Ok(Command::Detect("10.0.0.3".to_string())));
        assert_eq!(parse("neighbors"), Ok(Command::Neighbors));
        assert_eq!(parse("lsd"), Ok(Command::Lsd));
        assert_eq!(parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse("").is_err());
        assert!(parse("fly away").unwrap_err().contains("unknown command"));
        assert!(parse("attach 127.0.0.1 5001 10.0.0.2").is_err());
        assert!(parse("attach 127.0.0.1 port 10.0.0.2 1").unwrap_err().contains("invalid port"));
        assert!(parse("connect 127.0.0.1 5001 10.0.0.2 -1").unwrap_err().contains("invalid weight"));
        assert!(parse("disconnect one").is_err());
        assert!(parse("start now").unwrap_err().contains("wrong number"));
        assert!(parse("detect").is_err());
    }

    #[tokio::test]
    async fn test_run_prints_usage_and_stops_on_quit() {
        let router = Router::start(&RouterConfig::new("10.0.0.1", "127.0.0.1", 0)).await.unwrap();
        let input = b"bogus\nattach 127.0.0.1 6000 10.0.0.2 4\ndetect 10.0.0.2\nquit\nlsd\n";
        let mut output = Vec::new();

        run(&router, &input[..], &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("unknown command"));
        assert!(text.contains("Commands:"));
        assert!(text.contains("attached 10.0.0.2 on port 0"));
        assert!(text.contains("no path"));
        assert!(text.trim_end().ends_with("bye"));
    }
}
