//! Demonstration of the watch telemetry pipeline.
//!
//! This example shows how to:
//! 1. Start a throwaway local collector (TCP line sink)
//! 2. Subscribe to the simulated sensor stream
//! 3. Start the pipeline and forward samples
//! 4. Observe status events and final statistics
//!
//! Run with: cargo run --example forward_demo

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use watch_telemetry_agent::{
    ForwarderConfig, Pipeline, ServerAddress, SessionContext, SimulatedSensors, StatusEvent,
};

fn main() {
    println!("Watch Telemetry Agent - Forwarding Demo");
    println!("=======================================");
    println!();

    // Throwaway local collector: accepts one connection and prints lines.
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind local collector");
    let port = listener.local_addr().expect("local addr").port();
    println!("Local collector listening on 127.0.0.1:{port}");

    let collector = thread::spawn(move || {
        let (socket, peer) = listener.accept().expect("accept");
        println!("[collector] connection from {peer}");
        let reader = BufReader::new(socket);
        let mut received = 0u64;
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    received += 1;
                    if received <= 10 || received % 50 == 0 {
                        println!("[collector] {line}");
                    }
                }
                Err(_) => break,
            }
        }
        println!("[collector] connection closed after {received} lines");
        received
    });

    // Subscribe to two sensors at 25 Hz.
    let source = SimulatedSensors::new();
    let ids = source.select("accelerometer,gyroscope").expect("selection");
    let mut subscription = source.subscribe(&ids, 25).expect("subscribe");

    // Start the pipeline against the local collector.
    let session = SessionContext::new("demo-user", ServerAddress::new("127.0.0.1", port));
    let pipeline =
        Pipeline::start(session, ForwarderConfig::default()).expect("Failed to start pipeline");

    println!();
    println!("Forwarding for 10 seconds (Ctrl+C to stop early)...");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let start = Instant::now();
    let samples = subscription.samples().clone();

    while running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(10) {
        match samples.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                pipeline.submit(&sample);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        for event in pipeline.status_events().try_iter() {
            if let StatusEvent::ConnectionChanged(state) = event {
                println!("[pipeline] connection {state}");
            }
        }
    }

    println!();
    println!("Stopping...");
    subscription.stop();
    let final_stats = pipeline.stop();

    let received = collector.join().expect("collector thread");
    println!();
    println!("{}", final_stats.summary());
    println!();
    println!("Collector received {received} lines");
    println!("Demo complete!");
}
