use std::{
    io::{self, BufRead},
    sync::mpsc,
    thread,
    time::Duration,
};

use tello_follow::{
    BoundingBox, Detections, DistanceMetric, FollowConfig, FollowController, Frame, SessionConfig,
    TelloSession,
};

/// Stand-in for a real detector: box around strongly red pixels.
fn red_blob(frame: &Frame) -> tello_follow::Result<Detections> {
    let img = frame.image();
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0, 0);
    for (x, y, p) in img.enumerate_pixels() {
        let [r, g, b] = p.0;
        if r > 180 && g < 80 && b < 80 {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    if x0 > x1 {
        return Ok(Detections::none());
    }
    Ok(Detections::from_boxes(vec![BoundingBox::new(
        x0 as i32,
        y0 as i32,
        (x1 - x0) as i32,
        (y1 - y0) as i32,
    )]))
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let session = match TelloSession::new(SessionConfig::default()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("can't open tello session: {e}");
            return;
        }
    };
    if let Err(e) = session.connect() {
        tracing::error!("{e}");
        session.stop();
        return;
    }
    session.register_periodic("battery?", 50, "Battery");
    session.register_periodic("wifi?", 40, "Wifi");
    if let Err(e) = session.start().and_then(|_| session.start_video()) {
        tracing::error!("can't start tello session: {e}");
        session.stop();
        return;
    }

    let follower = FollowController::new(
        FollowConfig::default(),
        DistanceMetric::BoxHeight,
        Box::new(red_blob),
        session.commands(),
    );
    if let Err(e) = follower.start() {
        tracing::error!("can't start follower: {e}");
    }

    // t: takeoff, l: land, q: quit
    let (key_tx, key_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if key_tx.send(line.trim().to_owned()).is_err() {
                break;
            }
        }
    });

    tracing::info!("following, type q to quit");
    loop {
        if let Some(frame) = session.latest_frame_timeout(Duration::from_millis(100)) {
            follower.set_image(frame);
        }
        match key_rx.try_recv().as_deref() {
            Ok("t") => session.takeoff(),
            Ok("l") => session.land(),
            Ok("q") => break,
            _ => {}
        }
        if let Some(det) = follower.last_detection() {
            tracing::debug!("tracking {:?}", det.boxes.first());
        }
    }

    follower.stop();
    follower.join();
    session.stop();
    for entry in session.periodic_entries() {
        tracing::info!("{} {}", entry.label, entry.last_reply);
    }
}
