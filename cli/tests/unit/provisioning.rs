//! Provisioning state machine against mocked network, sessions and unlock.
//!
//! All tests run on a paused clock so tick, settle and reboot delays elapse
//! instantly and in order.

#![allow(clippy::expect_used)]

use std::pin::pin;
use std::time::Duration;

use bosflash_cli::application::services::device::{Device, DeviceHandle};
use bosflash_cli::application::services::probe::{DeviceInfo, HTTP_PORT, SSH_PORT};
use bosflash_cli::application::services::provisioning::Provisioner;
use bosflash_cli::domain::config::FleetConfig;
use bosflash_cli::domain::error::{ProbeError, ProvisionError, TransportError};
use bosflash_common::DeviceState;
use tempfile::TempDir;

use crate::mocks::{
    Journal, MockConnector, MockNetwork, MockSession, MockUnlock, RecordingSink,
    bosminer_version, fixture_files, stock_version, test_config,
};

const ADDRESS: &str = "10.0.0.1";

struct Harness {
    journal: Journal,
    network: MockNetwork,
    connector: MockConnector,
    unlock: MockUnlock,
    sink: RecordingSink,
    config: FleetConfig,
    _dir: TempDir,
}

impl Harness {
    fn new(
        with_referral: bool,
        network: impl FnOnce(MockNetwork) -> MockNetwork,
        unlock: impl FnOnce(&Journal) -> MockUnlock,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::default();
        Self {
            network: network(MockNetwork::new(&journal)),
            connector: MockConnector::new(&journal),
            unlock: unlock(&journal),
            sink: RecordingSink::default(),
            config: test_config(fixture_files(dir.path(), with_referral)),
            journal,
            _dir: dir,
        }
    }

    fn provisioner(&self) -> Provisioner<'_, MockNetwork, MockConnector, MockUnlock, RecordingSink> {
        Provisioner {
            network: &self.network,
            connector: &self.connector,
            unlock: &self.unlock,
            sink: &self.sink,
            config: &self.config,
        }
    }
}

fn device(state: DeviceState) -> (Device<MockSession>, DeviceHandle) {
    let (device, handle) = Device::new(DeviceInfo::new(1, ADDRESS));
    device.set_state(state);
    (device, handle)
}

/// The fixed install sequence as it reaches the session.
fn assert_install_order(journal: &Journal, session: &str) {
    let ops = journal.matching(&format!("{session} "));
    let expected_prefix = [
        "run rm -fr /tmp/firmware && mkdir -p /tmp/firmware",
        "upload ld-linux-armhf.so.3 -> /lib/ld-linux-armhf.so.3",
        "run chmod +x /lib/ld-linux-armhf.so.3",
        "upload sftp-server -> /usr/lib/openssh/sftp-server",
        "run chmod +x /usr/lib/openssh/sftp-server",
        "upload fw_printenv -> /usr/sbin/fw_printenv",
        "run chmod +x /usr/sbin/fw_printenv",
        "run ln -fs /usr/sbin/fw_printenv /usr/sbin/fw_setenv",
        "upload-dir install -> /tmp/firmware",
        "run chmod +x /tmp/firmware/stage1.sh",
    ]
    .map(|op| format!("{session} {op}"));
    assert_eq!(ops.len(), expected_prefix.len() + 1, "ops: {ops:#?}");
    assert_eq!(ops[..expected_prefix.len()], expected_prefix);
    let stage1 = &ops[expected_prefix.len()];
    assert!(
        stage1.starts_with(&format!("{session} run /tmp/firmware/stage1.sh ")),
        "got: {stage1}"
    );
    assert!(
        stage1.ends_with(" UpstreamDataInc.test 8 yes cond no no no && reboot"),
        "got: {stage1}"
    );
}

// ── START ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_start_down_device_stays_in_start() {
    let h = Harness::new(false, |n| n, MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Start);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Start);
    assert_eq!(h.journal.entries(), ["connect 10.0.0.1:80"]);
    assert_eq!(h.sink.messages(), ["Down..."]);
}

#[tokio::test(start_paused = true)]
async fn test_start_upgraded_firmware_moves_to_update() {
    let h = Harness::new(
        false,
        |n| {
            n.port(HTTP_PORT, Ok(()))
                .port(SSH_PORT, Ok(()))
                .exchange_once(Ok(bosminer_version()))
        },
        MockUnlock::unused,
    );
    let (mut device, _handle) = device(DeviceState::Start);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Update);
    assert!(h.sink.contains("SSH Connected..."));
    assert!(h.sink.contains("Version is bosminer 0.2.0..."));
    assert_eq!(h.connector.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_stock_firmware_moves_to_install_after_settle() {
    let h = Harness::new(
        false,
        |n| {
            n.port(HTTP_PORT, Ok(()))
                .port(SSH_PORT, Ok(()))
                .exchange_once(Ok(stock_version()))
        },
        MockUnlock::unused,
    );
    let (mut device, _handle) = device(DeviceState::Start);
    let before = tokio::time::Instant::now();

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Install);
    assert!(before.elapsed() >= h.config.timings.settle());
}

#[tokio::test(start_paused = true)]
async fn test_start_identity_timeout_still_installs() {
    let h = Harness::new(
        false,
        |n| {
            n.port(HTTP_PORT, Ok(()))
                .port(SSH_PORT, Ok(()))
                .exchange_always(Err(ProbeError::Timeout))
        },
        MockUnlock::unused,
    );
    let (mut device, _handle) = device(DeviceState::Start);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Install);
    assert!(h.sink.contains("Get version failed..."));
}

#[tokio::test(start_paused = true)]
async fn test_start_locked_ssh_unlocks_and_installs() {
    let h = Harness::new(
        false,
        |n| n.port(HTTP_PORT, Ok(())),
        |j| MockUnlock::new(j, Ok(true)),
    );
    let (mut device, _handle) = device(DeviceState::Start);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Install);
    assert_eq!(h.journal.matching("unlock"), ["unlock 10.0.0.1"]);
    assert!(h.sink.contains("SSH Down..."));
    assert!(h.sink.contains("SSH unlock success..."));
}

#[tokio::test(start_paused = true)]
async fn test_start_unlock_needing_reset_waits_for_disconnect() {
    let h = Harness::new(
        false,
        // detect, then two polls while waiting for the disconnect
        |n| n.once(HTTP_PORT, Ok(())).once(HTTP_PORT, Ok(())).once(HTTP_PORT, Ok(())),
        |j| MockUnlock::new(j, Ok(false)),
    );
    let (mut device, _handle) = device(DeviceState::Start);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Start);
    let messages = h.sink.messages();
    let failed = messages
        .iter()
        .position(|m| m == "SSH unlock failed, please reset miner with reset button...")
        .expect("failure notice");
    let waiting = messages
        .iter()
        .position(|m| m == "Waiting for disconnect...")
        .expect("wait notice");
    assert!(failed < waiting);
    assert_eq!(messages.last().map(String::as_str), Some("Disconnected..."));
    assert_eq!(h.journal.matching("connect 10.0.0.1:80").len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_start_unlock_helper_error_waits_for_disconnect() {
    let h = Harness::new(
        false,
        |n| n.once(HTTP_PORT, Ok(())),
        |j| MockUnlock::new(j, Err("helper missing")),
    );
    let (mut device, _handle) = device(DeviceState::Start);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Start);
    assert!(h.sink.contains("Disconnected..."));
}

// ── INSTALL ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_install_runs_fixed_plan_on_one_session() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Install);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Referral);
    assert_eq!(h.connector.opened(), 1);
    assert!(!device.session.is_live());
    assert_install_order(&h.journal, "s1");
}

#[tokio::test(start_paused = true)]
async fn test_install_closes_session_before_waiting_for_reboot() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Install);

    h.provisioner().step(&mut device).await.expect("step");

    let reboot = h.journal.position("&& reboot").expect("reboot command");
    let close = h.journal.position("close s1").expect("close");
    let poll = h
        .journal
        .entries()
        .iter()
        .rposition(|e| e == "connect 10.0.0.1:80")
        .expect("reboot poll");
    assert!(reboot < close && close < poll, "journal: {:#?}", h.journal.entries());

    let messages = h.sink.messages();
    let progress: Vec<&String> = messages.iter().filter(|m| m.starts_with("Rebooting...")).collect();
    assert_eq!(
        progress,
        ["Rebooting... 25%", "Rebooting... 50%", "Rebooting... 75%", "Rebooting... 100%"]
    );
    assert_eq!(messages.last().map(String::as_str), Some("Miner is back up..."));
}

#[tokio::test(start_paused = true)]
async fn test_install_order_holds_under_slow_operations() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    h.connector
        .script
        .lock()
        .expect("lock")
        .delay = Duration::from_secs(7);
    let (mut device, _handle) = device(DeviceState::Install);

    h.provisioner().step(&mut device).await.expect("step");

    assert_install_order(&h.journal, "s1");
}

#[tokio::test(start_paused = true)]
async fn test_install_reconnects_once_on_stale_session() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    h.connector.script.lock().expect("lock").disconnect_next = 1;
    let (mut device, _handle) = device(DeviceState::Install);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(h.connector.opened(), 2);
    assert_eq!(h.journal.matching("s1 "), ["s1 run rm -fr /tmp/firmware && mkdir -p /tmp/firmware"]);
    assert_install_order(&h.journal, "s2");
}

#[tokio::test(start_paused = true)]
async fn test_install_failure_stalls_device() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    h.connector.script.lock().expect("lock").failing_command =
        Some("chmod +x /lib/ld-linux-armhf.so.3".to_string());
    let (mut device, handle) = device(DeviceState::Install);

    let err = h.provisioner().run(&mut device).await;

    assert!(
        matches!(err, ProvisionError::Transport(TransportError::CommandFailed { .. })),
        "got: {err:?}"
    );
    assert!(device.is_stalled());
    assert!(handle.status().stalled);
    assert_eq!(handle.status().state, DeviceState::Install);
    assert!(h.journal.position("sftp-server").is_none());
    assert!(h.journal.position("close s1").is_some());
    let last = h.sink.messages().pop().expect("notice");
    assert!(last.ends_with("Reset the miner and restart bosflash..."), "got: {last}");
}

#[tokio::test(start_paused = true)]
async fn test_install_stage1_timeout_stalls_instead_of_awaiting_reboot() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    h.connector.script.lock().expect("lock").timing_out_command = Some("stage1.sh ".to_string());
    let (mut device, handle) = device(DeviceState::Install);

    let err = h.provisioner().run(&mut device).await;

    assert!(
        matches!(err, ProvisionError::Transport(TransportError::Timeout(_))),
        "got: {err:?}"
    );
    assert!(handle.status().stalled);
    assert_eq!(handle.status().state, DeviceState::Install);
    assert_eq!(h.connector.opened(), 1);
    assert_eq!(h.journal.matching("s1 run /tmp/firmware/stage1.sh ").len(), 1);
    assert!(!h.sink.messages().iter().any(|m| m.starts_with("Rebooting...")));
    let last = h.sink.messages().pop().expect("notice");
    assert!(last.ends_with("Reset the miner and restart bosflash..."), "got: {last}");
}

#[tokio::test(start_paused = true)]
async fn test_install_missing_local_file_stalls_before_upload() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    std::fs::remove_file(&h.config.files.ld_linux).expect("remove fixture");
    let (mut device, _handle) = device(DeviceState::Install);

    let err = h.provisioner().step(&mut device).await.expect_err("should fail");

    assert!(matches!(err, ProvisionError::MissingLocalFile(_)), "got: {err:?}");
    assert!(h.journal.position("upload").is_none());
}

// ── UPDATE ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_update_uploads_archive_and_waits_for_reboot() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Update);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Referral);
    assert_eq!(
        h.journal.matching("s1 "),
        [
            "s1 upload system_upgrade.tar -> /tmp/system_upgrade.tar",
            "s1 run sysupgrade /tmp/system_upgrade.tar",
        ]
    );
    assert!(h.journal.position("close s1").is_some());
    assert!(h.sink.contains("Rebooting... 100%"));
    assert!(h.sink.contains("Miner is back up..."));
}

#[tokio::test(start_paused = true)]
async fn test_update_backs_up_config_first_when_configured() {
    let mut h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    h.config.files.backup_dir = Some(h._dir.path().join("backups"));
    let (mut device, _handle) = device(DeviceState::Update);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(
        h.journal.matching("s1 ").first().map(String::as_str),
        Some("s1 download /etc/bosminer.toml -> 10.0.0.1-bosminer.toml")
    );
    assert!(h.sink.contains("File copied..."));
}

// ── REFERRAL / DONE ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_referral_absent_package_skips_to_done() {
    let h = Harness::new(false, |n| n, MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Referral);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Done);
    assert_eq!(h.connector.opened(), 0);
    assert_eq!(h.sink.messages(), ["Referral package not found, skipping..."]);
}

#[tokio::test(start_paused = true)]
async fn test_referral_present_package_is_installed() {
    let h = Harness::new(true, |n| n, MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Referral);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Done);
    assert_eq!(
        h.journal.matching("s1 "),
        [
            "s1 upload referral.ipk -> /tmp/referral.ipk",
            "s1 upload bosminer.toml -> /etc/bosminer.toml",
            "s1 run opkg install /tmp/referral.ipk && /etc/init.d/bosminer restart",
        ]
    );
    assert!(h.sink.contains("Sending referral IPK to 10.0.0.1..."));
    assert!(h.sink.contains("Referral configuration completed..."));
}

#[tokio::test(start_paused = true)]
async fn test_referral_install_timeout_is_not_repeated() {
    let h = Harness::new(true, |n| n, MockUnlock::unused);
    h.connector.script.lock().expect("lock").timing_out_command = Some("opkg".to_string());
    let (mut device, _handle) = device(DeviceState::Referral);

    let err = h.provisioner().step(&mut device).await.expect_err("should fail");

    assert!(matches!(err, ProvisionError::Transport(TransportError::Timeout(_))), "got: {err:?}");
    assert_eq!(h.journal.matching("s1 run opkg").len(), 1);
    assert_eq!(h.connector.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_done_waits_for_unplug_then_restarts() {
    let h = Harness::new(false, |n| n.once(HTTP_PORT, Ok(())), MockUnlock::unused);
    let (mut device, _handle) = device(DeviceState::Done);

    h.provisioner().step(&mut device).await.expect("step");

    assert_eq!(device.state(), DeviceState::Start);
    assert_eq!(
        h.sink.messages(),
        [
            "Provisioning complete, unplug the miner...",
            "Waiting for disconnect...",
            "Connected to port 80...",
            "Disconnected...",
        ]
    );
}

// ── Pause gate ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_paused_device_does_not_probe_until_resumed() {
    let h = Harness::new(false, |n| n, MockUnlock::unused);
    let (mut device, handle) = device(DeviceState::Start);
    handle.gate.pause();

    let provisioner = h.provisioner();
    let mut step = pin!(provisioner.step(&mut device));
    let pending = tokio::time::timeout(Duration::from_secs(300), &mut step).await;
    assert!(pending.is_err(), "step must block while paused");
    assert!(h.journal.entries().is_empty());
    assert_eq!(h.sink.messages(), ["Paused..."]);

    handle.gate.resume();
    step.await.expect("step");

    assert_eq!(h.journal.entries(), ["connect 10.0.0.1:80"]);
    assert_eq!(h.sink.messages(), ["Paused...", "Down..."]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_mid_install_neither_skips_nor_repeats_steps() {
    let h = Harness::new(false, |n| n.port(HTTP_PORT, Ok(())), MockUnlock::unused);
    h.connector.script.lock().expect("lock").delay = Duration::from_secs(10);
    let (mut device, handle) = device(DeviceState::Install);

    let provisioner = h.provisioner();
    let mut step = pin!(provisioner.step(&mut device));

    // Two operations complete; the third is in flight when the pause lands.
    let running = tokio::time::timeout(Duration::from_secs(25), &mut step).await;
    assert!(running.is_err());
    handle.gate.pause();

    let paused = tokio::time::timeout(Duration::from_secs(600), &mut step).await;
    assert!(paused.is_err());
    let frozen = h.journal.matching("s1 ");
    assert_eq!(frozen.len(), 3, "in-flight operation completes: {frozen:#?}");

    let still = tokio::time::timeout(Duration::from_secs(600), &mut step).await;
    assert!(still.is_err());
    assert_eq!(h.journal.matching("s1 "), frozen);

    handle.gate.resume();
    step.await.expect("step");

    assert_install_order(&h.journal, "s1");
    assert!(h.sink.contains("Paused..."));
}
