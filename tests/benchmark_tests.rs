//! Performance benchmarks for the gateway hot paths

use gate_server::backend::Echo;
use gate_server::config::GatewayConfig;
use gate_server::link::Link;
use gate_server::registry::Registry;
use gate_server::router::Router;
use gate_server::{Packet, BROADCAST};
use gate_shared::{encode_frame, read_frame, MAX_OUTBOUND_PAYLOAD};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn bench_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

/// Benchmarks frame encoding
#[test]
fn benchmark_frame_encoding() {
    let payload = vec![7u8; 256];
    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = encode_frame(&payload, MAX_OUTBOUND_PAYLOAD).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Frame encoding: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks decoding a long stream of back-to-back frames
#[tokio::test]
async fn benchmark_frame_decoding() {
    let mut rng = rand::thread_rng();
    let frames = 10_000;
    let mut stream = Vec::new();
    for _ in 0..frames {
        let size = rng.gen_range(1..=512);
        stream.extend(encode_frame(&vec![1u8; size], MAX_OUTBOUND_PAYLOAD).unwrap());
    }

    let start = Instant::now();
    let mut reader = stream.as_slice();
    let mut decoded = 0;
    while let Some(payload) = read_frame(&mut reader, MAX_OUTBOUND_PAYLOAD, Duration::from_secs(1))
        .await
        .unwrap()
    {
        assert!(!payload.is_empty());
        decoded += 1;
    }

    let duration = start.elapsed();
    println!(
        "Frame decoding: {} frames ({} bytes) in {:?} ({:.2} μs/frame)",
        decoded,
        stream.len(),
        duration,
        duration.as_micros() as f64 / decoded as f64
    );

    assert_eq!(decoded, frames);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks registry insert and remove churn
#[tokio::test]
async fn benchmark_registry_churn() {
    let config = GatewayConfig::default();
    let registry = Arc::new(Registry::new(config.max_connections));
    let iterations = 10_000;
    let start = Instant::now();

    for id in 1..=iterations {
        let (link, _rx) = Link::new(id, bench_addr(), &registry, &config);
        registry.put(id, link).await.unwrap();
    }
    assert_eq!(registry.len().await, iterations as usize);

    for id in 1..=iterations {
        assert!(registry.remove(id).await);
    }

    let duration = start.elapsed();
    println!(
        "Registry churn: {} put/remove pairs in {:?} ({:.2} μs/pair)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(registry.is_empty().await);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks broadcast fan-out to many links
#[tokio::test]
async fn benchmark_broadcast_fanout() {
    let config = GatewayConfig {
        outbound_queue_capacity: 16,
        ..Default::default()
    };
    let registry = Arc::new(Registry::new(config.max_connections));
    let router = Router::new(Arc::clone(&registry), Arc::new(Echo));

    let links = 1_000;
    let mut receivers = Vec::with_capacity(links as usize);
    for id in 1..=links {
        let (link, rx) = Link::new(id, bench_addr(), &registry, &config);
        registry.put(id, link).await.unwrap();
        receivers.push(rx);
    }

    let rounds = 10;
    let start = Instant::now();
    for _ in 0..rounds {
        router
            .route_out(Packet::new(BROADCAST, vec![9u8; 64]))
            .await
            .unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Broadcast: {} rounds to {} links in {:?} ({:.2} μs/delivery)",
        rounds,
        links,
        duration,
        duration.as_micros() as f64 / (rounds * links) as f64
    );

    for rx in receivers.iter_mut() {
        for _ in 0..rounds {
            assert_eq!(rx.try_recv().unwrap().len(), 64);
        }
    }
    assert!(duration.as_millis() < 2000);
}
