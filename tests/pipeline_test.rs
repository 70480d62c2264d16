//! End-to-end pipeline tests against a real localhost collector socket.

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};
use watch_telemetry_agent::{
    ForwarderConfig, Pipeline, Sample, ServerAddress, SessionContext,
};

/// Forwarder tuned so failure paths resolve in milliseconds, not seconds.
fn fast_config() -> ForwarderConfig {
    ForwarderConfig {
        queue_capacity: 64,
        max_retries: 2,
        backoff_base: Duration::from_millis(5),
        backoff_cap: Duration::from_millis(20),
        dial_attempts: 1,
        dial_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_millis(500),
    }
}

fn session_for(port: u16) -> SessionContext {
    SessionContext::new("u1", ServerAddress::new("127.0.0.1", port))
}

#[test]
fn test_forwards_samples_in_enqueue_order() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let collector = thread::spawn(move || {
        let (socket, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(socket);
        let mut lines = Vec::new();
        for _ in 0..2 {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read line");
            lines.push(line);
        }
        lines
    });

    let pipeline = Pipeline::start(session_for(port), fast_config()).expect("start");
    pipeline.submit(&Sample::new(1, "Accelerometer", 1111, &[1.0, 2.0, 3.0]));
    pipeline.submit(&Sample::new(4, "Gyroscope", 2222, &[0.1, 0.2, 0.3]));

    let lines = collector.join().expect("collector thread");
    assert_eq!(lines[0], "smartwatch,u1,Accelerometer,1111,1.0,2.0,3.0\n");
    assert_eq!(lines[1], "smartwatch,u1,Gyroscope,2222,0.1,0.2,0.3\n");

    let final_stats = pipeline.stop();
    assert_eq!(final_stats.delivered, 2);
    assert_eq!(final_stats.undeliverable, 0);
}

#[test]
fn test_stop_unblocks_idle_forwarder() {
    // Collector exists but is never dialed: nothing is submitted, so the
    // forwarder sits blocked on the empty queue.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let pipeline = Pipeline::start(session_for(port), fast_config()).expect("start");
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    let final_stats = pipeline.stop();
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "stop took {:?}",
        start.elapsed()
    );
    assert_eq!(final_stats.enqueued, 0);
    drop(listener);
}

#[test]
fn test_unreachable_collector_drops_after_bounded_retries() {
    // Bind then drop to get a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let pipeline = Pipeline::start(session_for(port), fast_config()).expect("start");
    pipeline.submit(&Sample::new(1, "Accelerometer", 1, &[0.0; 3]));

    // Poll until the message is given up on.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = pipeline.snapshot();
        if snapshot.undeliverable == 1 {
            assert_eq!(snapshot.delivered, 0);
            assert!(snapshot.connect_failures >= 1);
            assert!(snapshot.retries >= 1);
            break;
        }
        assert!(
            Instant::now() < deadline,
            "message was never dropped: {snapshot:?}"
        );
        thread::sleep(Duration::from_millis(10));
    }

    pipeline.stop();
}

#[test]
fn test_single_axis_sensor_delivers_padded_line() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let pipeline = Pipeline::start(session_for(port), fast_config()).expect("start");
    pipeline.submit(&Sample::new(5, "Light", 10, &[120.0]));

    let collector = thread::spawn(move || {
        let (socket, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        reader.read_line(&mut line).expect("read line");
        line
    });

    let line = collector.join().expect("collector thread");
    assert_eq!(line, "smartwatch,u1,Light,10,120.0,0.0,0.0\n");

    let final_stats = pipeline.stop();
    assert_eq!(final_stats.delivered, 1);
    assert_eq!(final_stats.queue_depth, 0);
}

#[test]
fn test_reconnects_after_connection_loss() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let collector = thread::spawn(move || {
        // First connection: read one line, then drop it.
        let (socket, _) = listener.accept().expect("accept");
        {
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).expect("read line");
        }
        // Second connection: read whatever arrives next.
        let (socket, _) = listener.accept().expect("accept second");
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        reader.read_line(&mut line).expect("read line");
        line
    });

    let config = ForwarderConfig {
        max_retries: 10,
        ..fast_config()
    };
    let pipeline = Pipeline::start(session_for(port), config).expect("start");
    pipeline.submit(&Sample::new(1, "Accelerometer", 1, &[1.0, 1.0, 1.0]));

    // Keep submitting until a write lands on the re-dialed connection. Some
    // messages may be lost in the dead socket's buffer (at-most-once).
    let mut ts = 2u64;
    let line = loop {
        pipeline.submit(&Sample::new(4, "Gyroscope", ts, &[0.5, 0.5, 0.5]));
        ts += 1;
        if collector.is_finished() {
            break collector.join().expect("collector thread");
        }
        assert!(ts < 2_000, "collector never saw a second connection");
        thread::sleep(Duration::from_millis(5));
    };

    assert!(
        line.starts_with("smartwatch,u1,"),
        "unexpected line: {line:?}"
    );

    let final_stats = pipeline.stop();
    assert!(final_stats.delivered >= 2);
    assert!(final_stats.write_failures >= 1);
}
