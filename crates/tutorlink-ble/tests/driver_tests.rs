//! Session driver tests against a recording mock transport

mod test_utils;

use std::time::Duration;

use test_utils::{PeerBehaviour, TestSession, PEER};
use tokio_test::{assert_err, assert_ok};
use tutorlink_ble::BleTransportError;
use tutorlink_core::{
    DisconnectReason, GattStatus, LinkState, Notice, SessionConfig, SessionError, SessionState,
    StatusNotice, TransportCommand, TransportEvent,
};

async fn ready_session(config: SessionConfig) -> TestSession {
    let mut harness = TestSession::spawn(config, PeerBehaviour::Responsive);
    assert_ok!(harness.session.connect(PEER).await);
    harness.settle().await;
    assert!(harness.session.is_ready().await.unwrap());
    assert_eq!(
        harness.drain_notices(),
        vec![Notice::Status(StatusNotice::Connected {
            address: PEER.to_string()
        })]
    );
    harness
}

// ----------------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_scan_window_reports_deduplicated_peers() {
    let mut harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::Silent);
    harness.session.start_scan().await.unwrap();

    harness.inject(TransportEvent::ScanResult {
        address: PEER.into(),
        name: None,
    });
    harness.inject(TransportEvent::ScanResult {
        address: "24:0A:C4:AB:CD:EF".into(),
        name: Some("Metronome".into()),
    });
    harness.inject(TransportEvent::ScanResult {
        address: PEER.into(),
        name: Some("GuitarTutor".into()),
    });

    // Paused clock auto-advances to the end of the window
    let notice = harness.notices.recv().await.unwrap();
    let Notice::PeerListReady(peers) = notice else {
        panic!("expected peer list, got {:?}", notice);
    };
    let labels: Vec<_> = peers.iter().map(|p| p.to_string()).collect();
    assert_eq!(
        labels,
        [
            format!("GuitarTutor / {}", PEER),
            "Metronome / 24:0A:C4:AB:CD:EF".to_string()
        ]
    );
    assert_eq!(
        harness.commands(),
        vec![TransportCommand::StartScan, TransportCommand::StopScan]
    );
    assert_eq!(harness.session.peers().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_scan_reports_no_peers() {
    let mut harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::Silent);
    harness.session.start_scan().await.unwrap();

    let notice = harness.notices.recv().await.unwrap();
    assert_eq!(notice, Notice::Status(StatusNotice::NoPeersFound));
}

#[tokio::test]
async fn test_scan_without_adapter_reports_transport_unavailable() {
    let mut harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::AdapterOff);
    harness.session.start_scan().await.unwrap();
    harness.settle().await;

    assert!(matches!(
        harness.drain_notices().as_slice(),
        [Notice::Status(StatusNotice::TransportUnavailable { .. })]
    ));
    assert_eq!(harness.commands(), vec![TransportCommand::StartScan]);
}

#[tokio::test(start_paused = true)]
async fn test_restarted_scan_gets_a_full_window() {
    let config = SessionConfig::new().with_scan_duration(Duration::from_millis(500));
    let mut harness = TestSession::spawn(config, PeerBehaviour::Silent);

    harness.session.start_scan().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.session.stop_scan().await.unwrap();
    assert_eq!(
        harness.drain_notices(),
        vec![Notice::Status(StatusNotice::NoPeersFound)]
    );

    harness.session.start_scan().await.unwrap();
    let started = tokio::time::Instant::now();
    harness.inject(TransportEvent::ScanResult {
        address: PEER.into(),
        name: None,
    });

    let notice = harness.notices.recv().await.unwrap();
    assert!(matches!(notice, Notice::PeerListReady(ref peers) if peers.len() == 1));
    assert!(started.elapsed() >= Duration::from_millis(500));
}

// ----------------------------------------------------------------------------
// Connection Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_walks_through_discovery() {
    let harness = ready_session(SessionConfig::default()).await;

    let commands = harness.commands();
    assert!(matches!(
        commands.as_slice(),
        [
            TransportCommand::Connect { .. },
            TransportCommand::DiscoverServices,
            TransportCommand::Subscribe { .. },
        ]
    ));
}

#[tokio::test]
async fn test_unreachable_peer_tears_down() {
    let mut harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::Unreachable);
    harness.session.connect(PEER).await.unwrap();

    let state = harness.session.state().await.unwrap();
    assert!(matches!(
        state,
        SessionState::Disconnected {
            reason: Some(DisconnectReason::ConnectionFailed { .. })
        }
    ));
    assert!(matches!(
        harness.commands().as_slice(),
        [TransportCommand::Connect { .. }, TransportCommand::Release]
    ));
    assert!(matches!(
        harness.drain_notices().as_slice(),
        [Notice::Status(StatusNotice::Disconnected { .. })]
    ));
}

#[tokio::test]
async fn test_connect_without_adapter_reports_transport_unavailable() {
    let mut harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::AdapterOff);
    harness.session.connect(PEER).await.unwrap();

    assert!(matches!(
        harness.session.state().await.unwrap(),
        SessionState::Disconnected {
            reason: Some(DisconnectReason::ConnectionFailed { .. })
        }
    ));
    assert!(matches!(
        harness.drain_notices().as_slice(),
        [
            Notice::Status(StatusNotice::TransportUnavailable { .. }),
            Notice::Status(StatusNotice::Disconnected { .. }),
        ]
    ));
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let harness = ready_session(SessionConfig::default()).await;
    let err = assert_err!(harness.session.connect("24:0A:C4:AB:CD:EF").await);
    assert!(matches!(
        err,
        BleTransportError::Session(SessionError::AlreadyConnected { .. })
    ));
}

#[tokio::test]
async fn test_link_loss_drops_handle() {
    let mut harness = ready_session(SessionConfig::default()).await;

    harness.inject(TransportEvent::ConnectionStateChanged {
        status: GattStatus::Success,
        state: LinkState::Disconnected,
    });
    harness.settle().await;

    assert_eq!(
        harness.session.state().await.unwrap(),
        SessionState::Disconnected {
            reason: Some(DisconnectReason::LinkLost)
        }
    );
    assert_eq!(
        harness.drain_notices(),
        vec![Notice::Status(StatusNotice::Disconnected {
            reason: DisconnectReason::LinkLost
        })]
    );
    assert_err!(harness.session.send("still there?").await);
}

#[tokio::test]
async fn test_events_from_released_link_are_dropped() {
    let harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::Silent);
    let connected = || TransportEvent::ConnectionStateChanged {
        status: GattStatus::Success,
        state: LinkState::Connected,
    };

    // First attempt is link 1, abandoned before it came up
    harness.session.connect(PEER).await.unwrap();
    harness.session.disconnect().await.unwrap();
    harness.session.connect("24:0A:C4:AB:CD:EF").await.unwrap();

    harness.inject_for(1, connected());
    harness.settle().await;
    assert_eq!(harness.session.state().await.unwrap().name(), "Connecting");
    assert!(matches!(
        harness.commands().as_slice(),
        [
            TransportCommand::Connect { .. },
            TransportCommand::Release,
            TransportCommand::Connect { .. },
        ]
    ));

    harness.inject_for(2, connected());
    harness.settle().await;
    assert_eq!(
        harness.session.state().await.unwrap().name(),
        "DiscoveringServices"
    );
}

#[tokio::test]
async fn test_stale_link_loss_does_not_tear_down_new_link() {
    let mut harness = ready_session(SessionConfig::default()).await;
    harness.session.disconnect().await.unwrap();
    harness.session.connect(PEER).await.unwrap();
    harness.settle().await;
    assert!(harness.session.is_ready().await.unwrap());
    harness.drain_notices();

    harness.inject_for(
        1,
        TransportEvent::ConnectionStateChanged {
            status: GattStatus::failure("status 8"),
            state: LinkState::Disconnected,
        },
    );
    harness.inject_for(
        1,
        TransportEvent::CharacteristicChanged {
            value: b"old news".to_vec(),
        },
    );
    harness.settle().await;

    assert!(harness.session.is_ready().await.unwrap());
    assert!(harness.drain_notices().is_empty());
}

// ----------------------------------------------------------------------------
// Transfer
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_long_message_is_paced_by_peer() {
    let harness = ready_session(SessionConfig::default()).await;
    let text = "q".repeat(649);

    harness.session.send(text.clone()).await.unwrap();
    harness.settle().await;

    let writes = harness.writes();
    let sizes: Vec<_> = writes.iter().map(Vec::len).collect();
    assert_eq!(sizes, [300, 300, 50]);
    assert_eq!(writes.concat(), format!("{}$", text).into_bytes());

    // Idle again: the next message goes straight out
    harness.session.send("Hello").await.unwrap();
    harness.settle().await;
    assert_eq!(harness.writes().last(), Some(&b"Hello$".to_vec()));
}

#[tokio::test]
async fn test_ready_notification_ahead_of_write_complete_drives_once() {
    let config = SessionConfig::new().with_max_chunk_len(4);
    let harness = TestSession::spawn(config, PeerBehaviour::RacingAck);
    harness.session.connect(PEER).await.unwrap();
    harness.settle().await;
    assert!(harness.session.is_ready().await.unwrap());

    harness.session.send("abcdefghij").await.unwrap();
    harness.settle().await;

    assert_eq!(
        harness.writes(),
        vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij$".to_vec()]
    );
    assert!(!harness.session.is_transferring().await.unwrap());
}

#[tokio::test]
async fn test_one_ready_notification_per_chunk() {
    let config = SessionConfig::new().with_max_chunk_len(4);
    let mut harness = TestSession::spawn(config, PeerBehaviour::Silent);
    harness.session.connect(PEER).await.unwrap();
    harness.inject_for(
        1,
        TransportEvent::ConnectionStateChanged {
            status: GattStatus::Success,
            state: LinkState::Connected,
        },
    );
    harness.inject_for(
        1,
        TransportEvent::ServicesDiscovered {
            status: GattStatus::Success,
            services: test_utils::tutor_services(),
        },
    );
    harness.inject_for(
        1,
        TransportEvent::SubscriptionConfigured {
            notifications_enabled: true,
            descriptor_written: true,
        },
    );
    harness.settle().await;
    harness.drain_notices();

    harness.session.send("abcdefghij").await.unwrap();
    for expected in 2..=3 {
        harness.inject_for(
            1,
            TransportEvent::CharacteristicWrite {
                status: GattStatus::Success,
            },
        );
        harness.inject_for(1, TransportEvent::CharacteristicChanged { value: Vec::new() });
        harness.settle().await;
        assert_eq!(harness.writes().len(), expected);
    }
    assert_eq!(harness.writes().concat(), b"abcdefghij$".to_vec());
    assert!(harness.session.is_transferring().await.unwrap());

    harness.inject_for(
        1,
        TransportEvent::CharacteristicWrite {
            status: GattStatus::Success,
        },
    );
    harness.settle().await;
    assert!(!harness.session.is_transferring().await.unwrap());
    assert!(harness.drain_notices().is_empty());
}

#[tokio::test]
async fn test_send_while_disconnected_is_rejected() {
    let mut harness = TestSession::spawn(SessionConfig::default(), PeerBehaviour::Responsive);

    let err = assert_err!(harness.session.send("Hello").await);
    assert!(matches!(
        err,
        BleTransportError::Session(SessionError::NotConnected)
    ));
    assert_eq!(
        harness.drain_notices(),
        vec![Notice::Status(StatusNotice::NotConnected)]
    );
    assert!(harness.commands().is_empty());
}

#[tokio::test]
async fn test_send_while_in_flight_reports_busy() {
    let config = SessionConfig::new().with_max_chunk_len(4);
    let mut harness = TestSession::spawn(config, PeerBehaviour::Silent);
    harness.session.connect(PEER).await.unwrap();
    harness.inject(TransportEvent::ConnectionStateChanged {
        status: GattStatus::Success,
        state: LinkState::Connected,
    });
    harness.inject(TransportEvent::ServicesDiscovered {
        status: GattStatus::Success,
        services: test_utils::tutor_services(),
    });
    harness.inject(TransportEvent::SubscriptionConfigured {
        notifications_enabled: true,
        descriptor_written: true,
    });
    harness.settle().await;
    harness.drain_notices();

    harness.session.send("abcdefgh").await.unwrap();
    assert!(harness.session.is_transferring().await.unwrap());
    let err = harness.session.send("second").await.unwrap_err();
    assert!(matches!(
        err,
        BleTransportError::Session(SessionError::MessageInFlight)
    ));
    assert_eq!(
        harness.drain_notices(),
        vec![Notice::Status(StatusNotice::Busy)]
    );
    assert_eq!(harness.writes(), vec![b"abcd".to_vec()]);
}

#[tokio::test]
async fn test_inbound_messages_reach_handler() {
    let mut harness = ready_session(SessionConfig::default()).await;

    harness.inject(TransportEvent::CharacteristicChanged {
        value: b"Play A minor".to_vec(),
    });
    harness.settle().await;

    assert_eq!(
        harness.drain_notices(),
        vec![Notice::MessageReceived("Play A minor".into())]
    );
}

#[tokio::test]
async fn test_ready_greeting_is_sent() {
    let harness = ready_session(SessionConfig::new().with_ready_greeting("O")).await;
    assert_eq!(harness.writes(), vec![b"O$".to_vec()]);
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_releases_link() {
    let harness = ready_session(SessionConfig::default()).await;
    harness.session.shutdown().await.unwrap();

    assert_eq!(harness.commands().last(), Some(&TransportCommand::Release));
    assert!(matches!(
        harness.session.state().await,
        Err(BleTransportError::DriverClosed)
    ));
}
