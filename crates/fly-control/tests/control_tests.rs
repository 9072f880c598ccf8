use std::sync::Arc;
use std::time::Duration;

use fly_control::{pid, ControlConfig, ControlDispatcher, PidSettings, StickPosition};
use fly_link::{LinkConfig, UdpLink};
use fly_proto::commander::{parse_setpoint, stop_packet, CommandFrame};
use fly_proto::config::ConfigFrame;
use fly_proto::crtp::{decode, NULL_PACKET};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

async fn setup() -> (UdpSocket, Arc<UdpLink>) {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let link = Arc::new(UdpLink::new(LinkConfig {
        remote_host: "127.0.0.1".into(),
        remote_port: peer.local_addr().unwrap().port(),
        local_port: 0,
        recv_timeout_ms: 50,
        ..LinkConfig::default()
    }));
    (peer, link)
}

/// Everything the peer receives until it has been quiet for `quiet`.
async fn drain(peer: &UdpSocket, quiet: Duration) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 128];
    while let Ok(Ok((n, _))) = timeout(quiet, peer.recv_from(&mut buf)).await {
        out.push(buf[..n].to_vec());
    }
    out
}

fn cfg() -> ControlConfig {
    ControlConfig { period_ms: 20, stop_burst: 3, stop_burst_gap_ms: 5, ..ControlConfig::default() }
}

#[tokio::test]
async fn idle_while_disconnected() {
    let (_peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.start();

    sleep(Duration::from_millis(80)).await;
    assert_eq!(ctl.ticks_sent(), 0);
    assert_eq!(link.queued(), 0);
}

#[tokio::test]
async fn streams_latest_frame_at_fixed_cadence() {
    let (peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.set_frame(CommandFrame::hover(35_000));
    ctl.start();
    link.connect().await.unwrap();

    sleep(Duration::from_millis(300)).await;
    let sent = ctl.ticks_sent();
    // 50 Hz over 300 ms is ~15; 10 Hz or 100 Hz must fail
    assert!(sent >= 6, "only {} ticks", sent);
    assert!(sent <= 20, "{} ticks, faster than 50 Hz", sent);

    let got = drain(&peer, Duration::from_millis(100)).await;
    assert_eq!(got[0], NULL_PACKET.to_vec());
    for pkt in &got[1..] {
        let p = decode(pkt).unwrap();
        assert_eq!(p.port, 0x3);
        assert_eq!(parse_setpoint(&p.payload).unwrap().3, 35_000);
    }

    link.disconnect().await;
}

#[tokio::test]
async fn stick_updates_show_up_in_the_stream() {
    let (peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.start();
    link.connect().await.unwrap();

    ctl.update_attitude(StickPosition::new(1.0, 0.5));
    ctl.update_throttle(0.5);
    assert_eq!(ctl.frame(), CommandFrame { roll_deg: 30.0, pitch_deg: 15.0, yaw_rate_deg_s: 0.0, thrust: 30_000 });

    sleep(Duration::from_millis(100)).await;
    let got = drain(&peer, Duration::from_millis(60)).await;
    let last = decode(got.last().unwrap()).unwrap();
    let (roll, pitch, _, thrust) = parse_setpoint(&last.payload).unwrap();
    assert_eq!((roll, pitch, thrust), (30.0, -15.0, 30_000));

    link.disconnect().await;
}

#[tokio::test]
async fn stops_when_link_drops() {
    let (_peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.start();
    link.connect().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    link.disconnect().await;
    sleep(Duration::from_millis(30)).await;
    let after = ctl.ticks_sent();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(ctl.ticks_sent(), after);
    assert_eq!(link.queued(), 0);
}

#[tokio::test]
async fn emergency_stop_bursts_and_halts() {
    let (peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.hover();
    ctl.start();
    link.connect().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(ctl.emergency_stop().await, 3);
    assert_eq!(ctl.frame(), CommandFrame::stop());
    assert!(!ctl.is_armed());

    let got = drain(&peer, Duration::from_millis(120)).await;
    let first_stop = got.iter().position(|p| *p == stop_packet()).expect("stop frame");
    // once stopping, only stop frames follow
    assert!(got[first_stop..].iter().all(|p| *p == stop_packet()));
    assert!(got.len() - first_stop >= 3);

    let halted = ctl.ticks_sent();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(ctl.ticks_sent(), halted);

    ctl.resume();
    sleep(Duration::from_millis(100)).await;
    assert!(ctl.ticks_sent() > halted);

    link.disconnect().await;
}

#[tokio::test]
async fn reconnect_rearms_after_emergency_stop() {
    let (_peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.start();
    link.connect().await.unwrap();
    ctl.emergency_stop().await;
    link.disconnect().await;

    link.connect().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(ctl.is_armed());
    let before = ctl.ticks_sent();
    sleep(Duration::from_millis(100)).await;
    assert!(ctl.ticks_sent() > before);

    link.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fast_reconnect_after_emergency_stop_always_rearms() {
    let (_peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.start();

    for round in 0..30 {
        link.connect().await.unwrap();
        ctl.emergency_stop().await;
        link.disconnect().await;
        link.connect().await.unwrap();

        let before = ctl.ticks_sent();
        sleep(Duration::from_millis(60)).await;
        assert!(ctl.ticks_sent() > before, "round {}: no setpoints after reconnect", round);
        assert!(ctl.is_armed());
        link.disconnect().await;
    }
}

#[tokio::test]
async fn emergency_stop_right_after_connect_stays_stopped() {
    let (_peer, link) = setup().await;
    let ctl = ControlDispatcher::new(link.clone(), cfg());
    ctl.start();
    link.connect().await.unwrap();
    ctl.emergency_stop().await;

    sleep(Duration::from_millis(50)).await;
    assert!(!ctl.is_armed());
    let halted = ctl.ticks_sent();
    sleep(Duration::from_millis(60)).await;
    assert_eq!(ctl.ticks_sent(), halted);

    link.disconnect().await;
}

#[tokio::test]
async fn pid_push_and_query_reach_the_device() {
    let (peer, link) = setup().await;
    link.connect().await.unwrap();

    let settings = PidSettings::default();
    assert_eq!(pid::push_all(&link, &settings, Duration::from_millis(2)).await, 6);
    assert!(pid::query(&link));

    let got = drain(&peer, Duration::from_millis(100)).await;
    assert_eq!(got[0], NULL_PACKET.to_vec());
    let frames: Vec<ConfigFrame> = got[1..].iter().map(|b| ConfigFrame::parse(b).unwrap()).collect();
    assert_eq!(frames.len(), 7);
    assert_eq!(got[1..7].to_vec(), settings.frames());
    assert_eq!(frames[6].data, Vec::<u8>::new());

    link.disconnect().await;
    assert!(!pid::query(&link));
}
