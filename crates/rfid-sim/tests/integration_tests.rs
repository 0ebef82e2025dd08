//! Integration tests for the reader simulator
//!
//! These tests drive sessions end to end over in-memory links:
//! - Fan-out of one frame to every reader, with per-reader failures
//! - Operator-driven and generated runs through the session loop
//! - Decoding of what the timing client receives
//! - Real pseudo-terminal links when the bridging helper is installed

use std::time::Duration;

use rfid_protocol::{ProtocolCodec, RfidCodec};
use rfid_sim::{
    load_roster, DeviceFanout, DeviceHandle, FixtureRoster, GeneratorTrigger, InteractiveTrigger,
    KeyAction, Selector, Session, SimError, TagGenerator,
};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use tokio::io::AsyncWrite;

    use super::*;

    /// Link that optionally rejects writes and records whether it was shut down
    pub struct TestLink {
        pub fail_writes: bool,
        pub written: Vec<u8>,
        pub shut_down: Arc<AtomicBool>,
    }

    impl TestLink {
        pub fn new(fail_writes: bool) -> (Self, Arc<AtomicBool>) {
            let shut_down = Arc::new(AtomicBool::new(false));
            let link = Self {
                fail_writes,
                written: Vec::new(),
                shut_down: shut_down.clone(),
            };
            (link, shut_down)
        }
    }

    impl AsyncWrite for TestLink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_writes {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shut_down.store(true, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    pub fn was_shut_down(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }

    /// Session over `n` duplex links, returning the client ends
    pub fn duplex_session(n: usize) -> (Session<DuplexStream>, Vec<DuplexStream>) {
        let mut devices = Vec::new();
        let mut clients = Vec::new();
        for index in 0..n {
            let (ours, client) = tokio::io::duplex(4096);
            devices.push(DeviceHandle::new(index, ours));
            clients.push(client);
        }
        let roster = load_roster(&FixtureRoster, 3).unwrap();
        (
            Session::from_parts(roster, DeviceFanout::new(devices)),
            clients,
        )
    }

    /// Decode every complete frame readable from `client` right now
    pub async fn received_tags(client: &mut DuplexStream) -> Vec<Vec<String>> {
        let mut codec = RfidCodec::new();
        let mut buf = [0u8; 4096];
        loop {
            match tokio::time::timeout(Duration::from_millis(20), client.read(&mut buf)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => codec.push_bytes(&buf[..n]),
                Ok(Err(e)) => panic!("client read failed: {e}"),
            }
        }

        let mut batches = Vec::new();
        while let Some(frame) = codec.next_command() {
            batches.push(frame.tag_ids());
        }
        batches
    }

    pub fn operator(lines: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.try_send(line.to_string()).unwrap();
        }
        rx
    }
}

use helpers::*;

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_failing_reader_does_not_block_others() {
    let (ok_link, ok_closed) = TestLink::new(false);
    let (bad_link, bad_closed) = TestLink::new(true);
    let mut fanout = DeviceFanout::new(vec![
        DeviceHandle::new(0, ok_link),
        DeviceHandle::new(1, bad_link),
    ]);

    let report = fanout.broadcast(&["E200001111"]).await.unwrap();
    assert!(report.outcomes[0].result.is_ok());
    assert!(matches!(
        report.outcomes[1].result,
        Err(SimError::Write { index: 1, .. })
    ));
    assert_eq!(report.delivered(), 1);
    assert!(!fanout.devices()[0].link().unwrap().written.is_empty());

    fanout.close_all().await;
    assert!(was_shut_down(&ok_closed));
    assert!(was_shut_down(&bad_closed));
}

// ============================================================================
// Session run loop
// ============================================================================

#[tokio::test]
async fn test_operator_run_reaches_every_client() {
    let (mut session, mut clients) = duplex_session(2);
    assert_eq!(session.roster().len(), 4);

    // send Smith, move down twice, send Svoboda, quit
    let input = operator(&["", "j", "j", "send", "q"]);
    let mut trigger = InteractiveTrigger::new(Selector::new(session.roster().clone()), input);

    let summary = session.run(&mut trigger, std::future::pending()).await;
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.frames_written, 4);
    assert_eq!(summary.failed_writes, 0);
    assert!(!summary.interrupted);

    for client in &mut clients {
        assert_eq!(
            received_tags(client).await,
            vec![vec!["E200001111".to_string()], vec!["E200003333".to_string()]]
        );
    }

    session.close().await;
    assert!(session.fanout().devices().iter().all(|d| !d.is_open()));
}

#[tokio::test]
async fn test_reset_clears_sent_marks_during_run() {
    let (mut session, _clients) = duplex_session(1);
    let input = operator(&["", "j", "", "r"]);
    let mut trigger = InteractiveTrigger::new(Selector::new(session.roster().clone()), input);

    session.run(&mut trigger, std::future::pending()).await;
    // input closed after the reset, which ends the run
    assert!(trigger.selector().is_quit());
    assert!((0..4).all(|i| !trigger.selector().is_sent(i)));
}

#[tokio::test]
async fn test_malformed_roster_tag_is_rejected() {
    let (mut session, mut clients) = duplex_session(1);
    let roster = rfid_sim::Roster::from_participants(vec![rfid_sim::Participant {
        id: 1,
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        start_number: Some(1),
        categories: vec![],
        tag_id: Some("1234".to_string()),
        track: rfid_sim::Track {
            id: 25,
            name: "10 Km".to_string(),
            description: String::new(),
        },
    }]);
    let mut trigger = InteractiveTrigger::new(Selector::new(roster), operator(&["", "q"]));

    let summary = session.run(&mut trigger, std::future::pending()).await;
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.frames_written, 0);
    assert!(received_tags(&mut clients[0]).await.is_empty());
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_generator_run_until_shutdown() {
    let (mut session, mut clients) = duplex_session(2);
    let mut trigger = GeneratorTrigger::new(TagGenerator::new(0x07), Duration::from_secs(1));

    let shutdown = tokio::time::sleep(Duration::from_millis(2500));
    let summary = session.run(&mut trigger, shutdown).await;
    assert!(summary.interrupted);
    assert_eq!(summary.batches, 3);
    session.close().await;

    for client in &mut clients {
        assert_eq!(
            received_tags(client).await,
            vec![
                vec!["0700C0FFEE".to_string()],
                vec!["0701C0FFEE".to_string()],
                vec!["0702C0FFEE".to_string()],
            ]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_stalled_reader() {
    // nobody reads the client end, so the pipe fills and writes stall
    let (ours, _client) = tokio::io::duplex(64);
    let device = DeviceHandle::new(0, ours).with_write_timeout(Duration::from_secs(3600));
    let roster = load_roster(&FixtureRoster, 3).unwrap();
    let mut session = Session::from_parts(roster, DeviceFanout::new(vec![device]));
    let mut trigger = GeneratorTrigger::new(TagGenerator::new(0x01), Duration::from_millis(10));

    let shutdown = tokio::time::sleep(Duration::from_millis(200));
    let summary = tokio::time::timeout(Duration::from_secs(3), session.run(&mut trigger, shutdown))
        .await
        .expect("run must return after shutdown");
    assert!(summary.interrupted);
    assert!(summary.frames_written > 0);

    session.close().await;
    assert!(!session.fanout().devices()[0].is_open());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_reader_times_out_while_others_receive() {
    let (stalled, _stalled_client) = tokio::io::duplex(64);
    let (healthy, mut healthy_client) = tokio::io::duplex(4096);
    let mut fanout = DeviceFanout::new(vec![
        DeviceHandle::new(0, stalled).with_write_timeout(Duration::from_millis(50)),
        DeviceHandle::new(1, healthy).with_write_timeout(Duration::from_millis(50)),
    ]);

    let mut timeouts = 0;
    for _ in 0..8 {
        let report = fanout.broadcast(&["E200004444"]).await.unwrap();
        assert!(report.outcomes[1].result.is_ok());
        if matches!(
            report.outcomes[0].result,
            Err(SimError::WriteTimeout { index: 0, .. })
        ) {
            timeouts += 1;
        }
    }
    assert!(timeouts > 0);

    fanout.close_all().await;
    assert_eq!(received_tags(&mut healthy_client).await.len(), 8);
}

#[test]
fn test_key_actions_cover_operator_commands() {
    for (line, action) in [
        ("", KeyAction::Confirm),
        ("up", KeyAction::Up),
        ("s", KeyAction::Down),
        ("reset", KeyAction::Reset),
        ("exit", KeyAction::Quit),
    ] {
        assert_eq!(KeyAction::parse(line), Some(action));
    }
}

// ============================================================================
// Real links
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_pty_link_when_helper_installed() {
    use rfid_sim::{provision, LinkConfig};
    use tokio_serial::SerialPortBuilderExt;

    let installed = std::process::Command::new("socat")
        .arg("-V")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if !installed {
        eprintln!("socat not installed, skipping");
        return;
    }

    let tmp = tempfile::tempdir().unwrap();
    let config = LinkConfig {
        dir: tmp.path().to_path_buf(),
        ..Default::default()
    };
    let link = provision(&config, 0).await.unwrap();
    let mut client = tokio_serial::new(link.paths.device.to_string_lossy(), 115_200)
        .open_native_async()
        .unwrap();

    let mut device = DeviceHandle::from_provisioned(link);
    device.send_tags(&["E200004444"]).await.unwrap();

    let mut codec = RfidCodec::new();
    let mut buf = [0u8; 256];
    let frame = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let n = client.read(&mut buf).await.unwrap();
            codec.push_bytes(&buf[..n]);
            if let Some(frame) = codec.next_command() {
                return frame;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(frame.tag_ids(), vec!["E200004444"]);

    device.close().await;
}
