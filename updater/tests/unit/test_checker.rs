//! Periodic checker tests

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vox_updater::utils::Backoff;
use vox_updater::workers::checker::{self, Options};

use crate::fixtures::{tree, FakeRemote, Harness, HarnessOptions};

/// Run the checker with an instant sleep and return the first `rounds` requested delays
async fn requested_delays(harness: &Harness, rounds: usize) -> Vec<Duration> {
    let options = Options {
        interval: Duration::from_secs(3600),
        initial_delay: Duration::from_secs(30),
        backoff: Backoff {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
            factor: 2.0,
        },
    };

    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();
    let sleep_fn = move |d: Duration| {
        let n = {
            let mut delays = recorded.lock().unwrap();
            delays.push(d);
            delays.len()
        };
        async move {
            if n > rounds {
                std::future::pending::<()>().await;
            }
        }
    };
    let watched = delays.clone();
    let shutdown = Box::pin(async move {
        loop {
            let done = watched.lock().unwrap().len() > rounds;
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    checker::run(&options, &harness.orchestrator, sleep_fn, shutdown).await;
    let mut delays = delays.lock().unwrap().clone();
    delays.truncate(rounds);
    delays
}

#[tokio::test]
async fn test_failures_back_off_exponentially() {
    let remote = FakeRemote::new();
    remote.push("r1", "initial", tree(&[("app/server.py", "v1")]));
    remote.unavailable.store(true, Ordering::SeqCst);
    let harness = Harness::new(remote, HarnessOptions::default());

    let delays = requested_delays(&harness, 4).await;
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(30),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ]
    );
}

#[tokio::test]
async fn test_success_waits_full_interval_and_never_applies() {
    let remote = FakeRemote::new();
    remote.push("r1", "initial", tree(&[("app/server.py", "v1")]));
    remote.push("r2", "next", tree(&[("app/server.py", "v2")]));
    let harness = Harness::new(remote, HarnessOptions::default());

    let delays = requested_delays(&harness, 3).await;
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(30),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        ]
    );

    let status = harness.orchestrator.status().await;
    assert_eq!(status.last_check.map(|c| c.remote_revision), Some("r2".to_string()));
    assert!(status.session.is_none());
    assert_eq!(harness.marker(), "r1");
}
