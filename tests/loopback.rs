use std::{
    net::UdpSocket,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use tello_follow::{
    ChannelSource, CommandLink, CommandSender, Endpoint, Reply, SessionConfig, TelemetryLink,
    TelloError, TelloSession,
};

const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Fake vehicle answering every command with `answer(cmd)`.
fn fake_vehicle(answer: fn(&str) -> Option<String>) -> (Endpoint, thread::JoinHandle<Vec<String>>) {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let port = sock.local_addr().unwrap().port();
    let h = thread::spawn(move || {
        let mut seen = Vec::new();
        let mut buff = [0u8; 1024];
        while let Ok((n, peer)) = sock.recv_from(&mut buff) {
            let cmd = String::from_utf8_lossy(&buff[..n]).to_string();
            if let Some(reply) = answer(&cmd) {
                sock.send_to(reply.as_bytes(), peer).unwrap();
            }
            seen.push(cmd);
        }
        seen
    });
    (Endpoint::new("127.0.0.1", port), h)
}

fn local() -> Endpoint {
    Endpoint::new("127.0.0.1", 0)
}

fn loopback_config(vehicle: Endpoint) -> SessionConfig {
    SessionConfig {
        command: vehicle,
        command_bind: local(),
        telemetry: local(),
        video: local(),
        image_size: (8, 6),
        tick: Duration::from_millis(5),
        reply_timeout: Duration::from_millis(100),
        read_timeout: READ_TIMEOUT,
        keepalive_period: 2,
        connect_retries: 2,
        offline: false,
    }
}

#[test]
fn command_link_round_trip() {
    let (vehicle, h) = fake_vehicle(|cmd| match cmd {
        "battery?" => Some("87\r\n".to_owned()),
        _ => None,
    });
    let link = CommandLink::bind(&local(), &vehicle, READ_TIMEOUT).unwrap();
    link.start().unwrap();

    let reply = link.send_and_wait("battery?", Duration::from_millis(300));
    assert_eq!(reply, Reply::Text("87\r\n".to_owned()));
    // unanswered command times out instead of reusing the previous reply
    let reply = link.send_and_wait("speed?", Duration::from_millis(100));
    assert_eq!(reply, Reply::NoReply);
    link.send("rc 0 0 0 0");

    link.stop();
    link.join();
    let seen = h.join().unwrap();
    assert_eq!(seen, vec!["battery?", "speed?", "rc 0 0 0 0"]);
}

#[test]
fn telemetry_link_keeps_latest_frame() {
    let link = TelemetryLink::bind(&local(), READ_TIMEOUT).unwrap();
    let addr = link.local_addr().unwrap();
    link.start().unwrap();
    let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();

    vehicle.send_to(b"mid:0;x:100;y:200;bat:80;\r\n", addr).unwrap();
    vehicle.send_to(&[0xff, 0xfe], addr).unwrap();
    vehicle.send_to(b"mid:0;x:100;y:200;bat:75;\r\n", addr).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while link.latest().get("bat") != Some("75") && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    link.stop();
    link.join();
    let frame = link.latest();
    assert_eq!(frame.get("bat"), Some("75"));
    assert_eq!(frame.get("y"), Some("200"));
}

#[test]
fn telemetry_frame_is_replaced_not_merged() {
    let link = TelemetryLink::bind(&local(), READ_TIMEOUT).unwrap();
    let addr = link.local_addr().unwrap();
    link.start().unwrap();
    let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();

    let wait_for = |key: &str| {
        let deadline = Instant::now() + Duration::from_secs(2);
        while link.latest().get(key).is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    };
    vehicle.send_to(b"a:1;b:2;", addr).unwrap();
    wait_for("a");
    assert_eq!(link.latest().get("b"), Some("2"));
    vehicle.send_to(b"c:3;", addr).unwrap();
    wait_for("c");

    link.stop();
    link.join();
    let frame = link.latest();
    assert_eq!(frame.get("c"), Some("3"));
    assert_eq!(frame.get("a"), None);
    assert_eq!(frame.get("b"), None);
}

#[test]
fn session_connects_and_polls() {
    let (vehicle, h) = fake_vehicle(|cmd| match cmd {
        "command" => Some("ok".to_owned()),
        "wifi?" => Some("90\r\n".to_owned()),
        _ => None,
    });
    let (_tx, rx) = mpsc::channel();
    let session =
        TelloSession::with_video_source(loopback_config(vehicle), Box::new(ChannelSource::new(rx)))
            .unwrap();
    session.connect().unwrap();
    session.register_periodic("wifi?", 3, "Wifi");
    session.start().unwrap();
    session.start().unwrap();
    session.start_video().unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    while session.periodic_entries()[1].last_reply.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let entries = session.periodic_entries();
    assert_eq!(entries[1].label, "Wifi");
    assert_eq!(entries[1].last_reply, "90");

    session.stop();
    assert!(session.latest_frame().is_none());
    let seen = h.join().unwrap();
    assert_eq!(seen[0], "command");
    assert!(seen.contains(&"streamon".to_owned()));
    assert_eq!(seen.last().map(String::as_str), Some("streamoff"));
}

#[test]
fn session_reports_unreachable_vehicle() {
    let (vehicle, h) = fake_vehicle(|_| None);
    let (_tx, rx) = mpsc::channel();
    let session =
        TelloSession::with_video_source(loopback_config(vehicle), Box::new(ChannelSource::new(rx)))
            .unwrap();
    let err = session.connect().unwrap_err();
    assert!(matches!(err, TelloError::NotConnected { attempts: 2 }));
    session.stop();
    assert_eq!(h.join().unwrap(), vec!["command", "command"]);
}

#[test]
fn offline_session_skips_handshake() {
    let (vehicle, h) = fake_vehicle(|_| None);
    let (_tx, rx) = mpsc::channel();
    let config = SessionConfig {
        offline: true,
        ..loopback_config(vehicle)
    };
    let session = TelloSession::with_video_source(config, Box::new(ChannelSource::new(rx))).unwrap();
    session.connect().unwrap();
    session.send_async("land");
    session.start_video().unwrap();
    session.stop_video();
    assert!(matches!(session.start_video(), Err(TelloError::WorkerStopped(_))));
    session.stop();
    assert_eq!(h.join().unwrap(), vec!["land", "streamon", "streamoff"]);
}
