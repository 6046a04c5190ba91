//! Session slot lifecycle: lazy open, reuse, invalidation and single reconnect.

#![allow(clippy::expect_used)]

use std::path::Path;

use bosflash_cli::application::services::transport::SessionSlot;
use bosflash_cli::domain::error::TransportError;

use crate::mocks::{Journal, MockConnector, MockSession};

const ADDRESS: &str = "10.0.0.1";

#[tokio::test]
async fn test_session_opened_lazily_and_reused() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal);
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();
    assert!(!slot.is_live());
    assert_eq!(connector.opened(), 0);

    slot.run_command(&connector, ADDRESS, "uname").await.expect("run");
    slot.upload_file(&connector, ADDRESS, Path::new("local/file"), "/tmp/file")
        .await
        .expect("upload");
    slot.run_command(&connector, ADDRESS, "uptime").await.expect("run");

    assert!(slot.is_live());
    assert_eq!(connector.opened(), 1);
    assert_eq!(slot.opened(), 1);
    assert_eq!(
        journal.matching("s"),
        ["s1 run uname", "s1 upload file -> /tmp/file", "s1 run uptime"]
    );
}

#[tokio::test]
async fn test_invalidate_closes_and_next_operation_reopens() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal);
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    slot.run_command(&connector, ADDRESS, "true").await.expect("run");
    slot.invalidate().await;
    assert!(!slot.is_live());
    slot.run_command(&connector, ADDRESS, "true").await.expect("run");

    assert_eq!(
        journal.entries(),
        [
            "open s1 10.0.0.1",
            "s1 run true",
            "close s1",
            "open s2 10.0.0.1",
            "s2 run true",
        ]
    );
}

#[tokio::test]
async fn test_invalidate_without_session_is_noop() {
    let journal = Journal::default();
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();
    slot.invalidate().await;
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_stale_session_reconnects_exactly_once() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal).with_script(|s| s.disconnect_next = 1);
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let output = slot
        .run_command(&connector, ADDRESS, "uname")
        .await
        .expect("retried run");

    assert!(output.success());
    assert_eq!(connector.opened(), 2);
    assert_eq!(
        journal.entries(),
        [
            "open s1 10.0.0.1",
            "s1 run uname",
            "close s1",
            "open s2 10.0.0.1",
            "s2 run uname",
        ]
    );
}

#[tokio::test]
async fn test_second_disconnect_is_returned() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal).with_script(|s| s.disconnect_next = 2);
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let err = slot
        .upload_directory(&connector, ADDRESS, Path::new("install"), "/tmp/firmware")
        .await
        .expect_err("should fail");

    assert!(matches!(err, TransportError::Disconnected(_)));
    assert_eq!(connector.opened(), 2);
}

#[tokio::test]
async fn test_command_failure_is_not_retried() {
    let journal = Journal::default();
    let connector =
        MockConnector::new(&journal).with_script(|s| s.failing_command = Some("missing".into()));
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let output = slot
        .run_command(&connector, ADDRESS, "missing-tool")
        .await
        .expect("delivered");

    assert_eq!(output.exit_code, Some(1));
    assert_eq!(connector.opened(), 1);
}

#[tokio::test]
async fn test_connect_error_is_returned() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal)
        .with_script(|s| s.refuse_connect = Some(TransportError::Connect("auth".into())));
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let err = slot
        .run_command(&connector, ADDRESS, "true")
        .await
        .expect_err("should fail");

    assert_eq!(err, TransportError::Connect("auth".into()));
    assert!(!slot.is_live());
}

#[tokio::test]
async fn test_run_disconnecting_treats_drop_as_success_without_retry() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal);
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let output = slot
        .run_disconnecting(&connector, ADDRESS, "/tmp/firmware/stage1.sh && reboot")
        .await
        .expect("expected drop");

    assert_eq!(output, None);
    assert_eq!(connector.opened(), 1);
    assert!(slot.is_live(), "caller invalidates explicitly");
}

#[tokio::test]
async fn test_download_reuses_session() {
    let journal = Journal::default();
    let connector = MockConnector::new(&journal);
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    slot.run_command(&connector, ADDRESS, "true").await.expect("run");
    slot.download_file(&connector, ADDRESS, "/etc/bosminer.toml", Path::new("backup/x.toml"))
        .await
        .expect("download");

    assert_eq!(connector.opened(), 1);
    assert!(journal.entries().contains(&"s1 download /etc/bosminer.toml -> x.toml".to_string()));
}

#[tokio::test]
async fn test_local_timeout_of_reboot_command_is_an_error() {
    let journal = Journal::default();
    let connector =
        MockConnector::new(&journal).with_script(|s| s.timing_out_command = Some("stage1".into()));
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let err = slot
        .run_disconnecting(&connector, ADDRESS, "/tmp/firmware/stage1.sh && reboot")
        .await
        .expect_err("timeout is not a reboot");

    assert!(matches!(err, TransportError::Timeout(_)));
    assert_eq!(connector.opened(), 1);
}

#[tokio::test]
async fn test_local_timeout_is_not_retried() {
    let journal = Journal::default();
    let connector =
        MockConnector::new(&journal).with_script(|s| s.timing_out_command = Some("opkg".into()));
    let mut slot: SessionSlot<MockSession> = SessionSlot::new();

    let err = slot
        .run_command(&connector, ADDRESS, "opkg install /tmp/referral.ipk && /etc/init.d/bosminer restart")
        .await
        .expect_err("should fail");

    assert!(matches!(err, TransportError::Timeout(_)));
    assert_eq!(connector.opened(), 1);
    assert_eq!(journal.matching("s1 run opkg").len(), 1);
    assert!(journal.matching("s2").is_empty());
}
