use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

use simple_factors::{
    ClientConfig, Code, Driver, Error, FactorLog, FactorRequest, FactorService, FactorerClient,
    ServerInstance, TcpServer, FAILED,
};

static INIT: Once = Once::new();

fn log_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "simple_factors_it_{}_{}.log",
        std::process::id(),
        name
    ));
    std::fs::remove_file(&path).ok();
    path
}

fn spawn_server(name: &str) -> (ServerInstance, PathBuf) {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
    let path = log_path(name);
    let log = Arc::new(FactorLog::new(&path));
    let server = FactorService::new(log).start("127.0.0.1:0").unwrap();
    (server, path)
}

fn client_config(tries: u64, quiet: bool) -> ClientConfig {
    ClientConfig {
        target: String::new(),
        tries,
        quiet,
        time: false,
        forever: false,
        timeout_ms: None,
    }
}

fn factor(client: &FactorerClient, target: i32) -> Result<Vec<i32>, Error> {
    client
        .factor(FactorRequest { target })
        .map(|reply| reply.factors)
}

#[test]
fn factors_over_the_wire() {
    let (server, path) = spawn_server("wire");
    let mut client = FactorerClient::connect(server.local_addr()).unwrap();
    client.set_timeout(Duration::from_secs(5));

    assert_eq!(factor(&client, 2).unwrap(), vec![2]);
    assert_eq!(factor(&client, 17).unwrap(), vec![17]);
    assert_eq!(factor(&client, 97).unwrap(), vec![97]);
    assert_eq!(factor(&client, 360).unwrap(), vec![2, 2, 2, 3, 3, 5]);
    assert_eq!(factor(&client, 1).unwrap(), Vec::<i32>::new());
    assert_eq!(factor(&client, 0).unwrap(), Vec::<i32>::new());
    assert_eq!(factor(&client, i32::MAX).unwrap(), vec![i32::MAX]);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("Factor 2: 2\nFactor 17: 17\nFactor 97: 97\n"));
    assert!(content.contains("Factor 360: 2 2 2 3 3 5\n"));
    assert!(content.contains("Factor 0:\n"));

    server.shutdown();
    std::fs::remove_file(&path).ok();
}

#[test]
fn negative_target_fails_with_invalid_argument() {
    let (server, path) = spawn_server("negative");
    let client = FactorerClient::connect(server.local_addr()).unwrap();

    match factor(&client, -360) {
        Err(Error::Status(status)) => {
            assert_eq!(status.code(), Code::InvalidArgument);
            assert!(status.message().contains("-360"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // the connection survives a failed call
    assert_eq!(factor(&client, 12).unwrap(), vec![2, 2, 3]);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "Factor -360: invalid argument\nFactor 12: 2 2 3\n");
    std::fs::remove_file(&path).ok();
}

#[test]
fn concurrent_clients_keep_results_and_log_apart() {
    const CLIENTS: i32 = 6;
    const CALLS: i32 = 50;

    let (server, path) = spawn_server("concurrent");
    let addr = server.local_addr();

    let handles: Vec<_> = (0..CLIENTS)
        .map(|c| {
            std::thread::spawn(move || {
                let client = FactorerClient::connect(addr).unwrap();
                for i in 0..CALLS {
                    let target = 1_000 * (c + 1) + i;
                    let factors = factor(&client, target).unwrap();
                    assert_eq!(factors, simple_factors::prime_factors(target).unwrap());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let mut targets: Vec<i32> = content
        .lines()
        .map(|line| {
            let (head, factors) = line.split_once(':').unwrap();
            let target: i32 = head.strip_prefix("Factor ").unwrap().parse().unwrap();
            let logged: Vec<i32> = factors
                .split_whitespace()
                .map(|f| f.parse().unwrap())
                .collect();
            assert_eq!(logged, simple_factors::prime_factors(target).unwrap(), "{line}");
            target
        })
        .collect();
    targets.sort_unstable();

    let mut expected: Vec<i32> = (0..CLIENTS)
        .flat_map(|c| (0..CALLS).map(move |i| 1_000 * (c + 1) + i))
        .collect();
    expected.sort_unstable();
    assert_eq!(targets, expected);

    drop(server);
    std::fs::remove_file(&path).ok();
}

#[test]
fn one_channel_shared_between_coroutines() {
    let (server, path) = spawn_server("shared");
    let client = Arc::new(FactorerClient::connect(server.local_addr()).unwrap());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let client = client.clone();
            may::go!(move || {
                let target = 2 * 3 * 5 * 7 * (i + 1);
                let factors = factor(&client, target).unwrap();
                assert_eq!(factors.iter().product::<i32>(), target);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 20);
    std::fs::remove_file(&path).ok();
}

#[test]
fn driver_issues_exactly_tries_calls() {
    let (server, path) = spawn_server("driver");
    let client = FactorerClient::connect(server.local_addr()).unwrap();

    let mut targets = vec![97, 360, 17].into_iter().cycle();
    let mut driver = Driver::new(client, &client_config(7, false), Vec::new());
    let report = driver.run(|| targets.next().unwrap()).unwrap();
    assert_eq!(report.calls, 7);
    assert_eq!(report.failures, 0);

    let out = String::from_utf8(driver.into_output()).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], "Factor 97: 97 ");
    assert_eq!(lines[1], "Factor 360: 2 2 2 3 3 5 ");

    let logged = std::fs::read_to_string(&path).unwrap();
    assert_eq!(logged.lines().count(), 7);
    std::fs::remove_file(&path).ok();
}

#[test]
fn quiet_driver_still_reports_failures() {
    let (server, path) = spawn_server("quiet");
    let client = FactorerClient::connect(server.local_addr()).unwrap();

    let mut driver = Driver::new(client, &client_config(3, true), Vec::new());
    assert_eq!(driver.factor(-4).unwrap(), FAILED);
    assert_eq!(driver.factor(360).unwrap(), 6);

    let report = driver.run_batch(|| 12).unwrap();
    assert_eq!(report.calls, 3);
    assert_eq!(report.failures, 0);

    let out = String::from_utf8(driver.into_output()).unwrap();
    assert_eq!(out, "3: Unable to factor -4: target must not be negative\n");
    std::fs::remove_file(&path).ok();
}

#[test]
fn timed_batch_prints_duration() {
    let (server, path) = spawn_server("timed");
    let client = FactorerClient::connect(server.local_addr()).unwrap();

    let mut config = client_config(4, true);
    config.time = true;
    let mut driver = Driver::new(client, &config, Vec::new());
    driver.run_batch(|| 1_000_000).unwrap();

    let out = String::from_utf8(driver.into_output()).unwrap();
    assert!(out.starts_with("Duration for 4 runs = "), "{out}");
    assert!(out.ends_with("ms\n"), "{out}");
    std::fs::remove_file(&path).ok();
}

fn closed_port() -> std::net::SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
    // the listener is closed here, nothing accepts on the port anymore
}

#[test]
fn unreachable_server_is_a_connect_error() {
    let err = FactorerClient::connect(closed_port()).unwrap_err();
    assert_eq!(Error::from(err).to_status().code(), Code::Unavailable);
}

#[test]
fn unreachable_server_fails_every_try() {
    let client = FactorerClient::lazy(closed_port().to_string());
    let mut driver = Driver::new(client, &client_config(3, true), Vec::new());
    let report = driver.run(|| 360).unwrap();
    assert_eq!(report.calls, 3);
    assert_eq!(report.failures, 3);

    let out = String::from_utf8(driver.into_output()).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 3, "{out}");
    assert!(lines.iter().all(|l| l.starts_with("14: ")), "{out}");
}

#[test]
fn lazy_client_connects_on_first_call() {
    let (server, path) = spawn_server("lazy");
    let client = FactorerClient::lazy(server.local_addr().to_string());
    assert_eq!(factor(&client, 360).unwrap(), vec![2, 2, 2, 3, 3, 5]);
    assert_eq!(factor(&client, 97).unwrap(), vec![97]);
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    std::fs::remove_file(&path).ok();
}

#[test]
fn calls_fail_once_the_peer_closes() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // accept the connection and close it without answering
    let peer = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let client = FactorerClient::connect(addr).unwrap();
    peer.join().unwrap();

    let mut driver = Driver::new(client, &client_config(2, true), Vec::new());
    let report = driver.run_batch(|| 97).unwrap();
    assert_eq!(report.failures, 2);
    let out = String::from_utf8(driver.into_output()).unwrap();
    assert!(out.lines().all(|l| l.starts_with("14: ")), "{out}");
}

#[test]
fn shutdown_with_live_client_returns() {
    let (server, path) = spawn_server("shutdown");
    let client = FactorerClient::connect(server.local_addr()).unwrap();
    assert_eq!(factor(&client, 12).unwrap(), vec![2, 2, 3]);

    // the client still holds its connection open
    server.shutdown();

    match factor(&client, 12) {
        Err(Error::Io(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn shutdown_right_after_client_goes_away() {
    let (server, path) = spawn_server("shutdown_closed");
    {
        let client = FactorerClient::connect(server.local_addr()).unwrap();
        assert_eq!(factor(&client, 17).unwrap(), vec![17]);
    }
    server.shutdown();
    std::fs::remove_file(&path).ok();
}

/// accepts output until it has been flushed `batches` times
struct Batches {
    batches: usize,
    flushed: usize,
}

impl Write for Batches {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushed += 1;
        if self.flushed >= self.batches {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"));
        }
        Ok(())
    }
}

#[test]
fn forever_repeats_batches_until_output_fails() {
    let (server, path) = spawn_server("forever");
    let client = FactorerClient::connect(server.local_addr()).unwrap();

    let mut config = client_config(4, true);
    config.forever = true;
    let out = Batches {
        batches: 3,
        flushed: 0,
    };
    let mut driver = Driver::new(client, &config, out);
    let err = driver.run(|| 360).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(driver.into_output().flushed, 3);

    let logged = std::fs::read_to_string(&path).unwrap();
    assert_eq!(logged.lines().count(), 3 * 4);
    assert!(logged.lines().all(|l| l == "Factor 360: 2 2 2 3 3 5"));
    std::fs::remove_file(&path).ok();
}
