//! Wire probe for a running gateway.
//!
//! Connects, sends frames of random size and content, and checks that each
//! one comes back unchanged. Meant to run against the echo backend.

use clap::Parser;
use gate_shared::{read_frame, write_frame, MAX_INBOUND_PAYLOAD, MAX_OUTBOUND_PAYLOAD};
use rand::Rng;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Number of frames to send
    #[arg(short, long, default_value_t = 100)]
    count: usize,
    /// Largest payload to send
    #[arg(short, long, default_value_t = 1024)]
    max_size: usize,
    /// Seconds to wait for each echo
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let max_size = args.max_size.clamp(1, MAX_INBOUND_PAYLOAD);
    let timeout = Duration::from_secs(args.timeout);

    let mut stream = TcpStream::connect(args.server).await?;
    stream.set_nodelay(true)?;
    println!("Connected to {} from {}", args.server, stream.local_addr()?);

    let mut rng = rand::thread_rng();
    let started = Instant::now();
    let mut bytes = 0usize;

    for n in 0..args.count {
        let size = rng.gen_range(1..=max_size);
        let payload: Vec<u8> = (0..size).map(|_| rng.gen()).collect();

        write_frame(&mut stream, &payload, MAX_INBOUND_PAYLOAD, timeout).await?;
        match read_frame(&mut stream, MAX_OUTBOUND_PAYLOAD, timeout).await? {
            Some(echo) if echo == payload => bytes += size,
            Some(echo) => {
                return Err(format!(
                    "frame {}: sent {} bytes, got {} different bytes back",
                    n,
                    size,
                    echo.len()
                )
                .into());
            }
            None => return Err(format!("server closed the connection at frame {}", n).into()),
        }
    }

    let elapsed = started.elapsed();
    println!(
        "{} frames ({} bytes) echoed in {:?} ({:.1} frames/s)",
        args.count,
        bytes,
        elapsed,
        args.count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}
