use std::{
    io::Read,
    process::{Child, ChildStdout, Command, Stdio},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};

use image::{imageops, RgbImage};

use crate::{
    command::CommandSender,
    config::Endpoint,
    error::{Result, TelloError},
    slot::SingleSlot,
    worker::{CyclicWorker, WorkerState},
};

const IDLE_WAIT: Duration = Duration::from_millis(10);
const DECODED_BACKLOG: usize = 2;

/// Decoded camera image. Cloning shares the pixels, frames are never mutated.
#[derive(Debug, Clone)]
pub struct Frame {
    seq: u64,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            image: Arc::new(image),
        }
    }

    /// Arrival order, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Produces decoded images. `Ok(None)` means nothing is ready yet, a call
/// should come back within a read timeout so the capture loop can be stopped.
pub trait FrameSource: Send {
    /// Prepares the source before the vehicle starts streaming.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Releases the decoder once the capture loop is stopped.
    fn shutdown(&mut self) {}
}

/// Frames pushed by an in-process decoder.
pub struct ChannelSource {
    rx: Receiver<RgbImage>,
    wait: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<RgbImage>) -> Self {
        Self {
            rx,
            wait: Duration::from_millis(100),
        }
    }
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.rx.recv_timeout(self.wait) {
            Ok(img) => Ok(Some(img)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(self.wait);
                Ok(None)
            }
        }
    }
}

/// Running decoder process. Its stdout is drained by a reader thread so a
/// silent stream never blocks the capture loop.
struct Decoder {
    child: Child,
    frames: ChannelSource,
}

impl Decoder {
    fn attach(mut child: Child, size: (u32, u32)) -> Result<Self> {
        let stdout = child.stdout.take().ok_or_else(|| {
            TelloError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "can't open decoder stdout",
            ))
        })?;
        let (tx, rx) = mpsc::sync_channel(DECODED_BACKLOG);
        thread::Builder::new()
            .name("tello-video-read".to_owned())
            .spawn(move || read_frames(stdout, size, tx))?;
        Ok(Self {
            child,
            frames: ChannelSource::new(rx),
        })
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_frames(mut stdout: ChildStdout, size: (u32, u32), tx: SyncSender<RgbImage>) {
    let method_name = "video_read";
    let (w, h) = size;
    loop {
        let mut buff = vec![0u8; (w * h * 3) as usize];
        if let Err(e) = stdout.read_exact(&mut buff) {
            tracing::debug!(method_name, "decoder output closed: {e}");
            return;
        }
        let Some(img) = RgbImage::from_raw(w, h, buff) else {
            tracing::warn!(method_name, "short rgb24 frame");
            return;
        };
        if tx.send(img).is_err() {
            return;
        }
    }
}

/// Decodes the vehicle's H.264 stream with an external `ffmpeg` process that
/// writes raw rgb24 frames of a fixed size to its stdout. The process is
/// spawned by [`FrameSource::open`] and killed by [`FrameSource::shutdown`].
pub struct FfmpegSource {
    stream: Endpoint,
    size: (u32, u32),
    decoder: Option<Decoder>,
}

impl FfmpegSource {
    pub fn new(stream: Endpoint, size: (u32, u32)) -> Self {
        Self {
            stream,
            size,
            decoder: None,
        }
    }

    fn spawn(&self) -> Result<Decoder> {
        let method_name = "ffmpeg_spawn";
        let input = format!("udp://@{}", self.stream.addr());
        let scale = format!("{}x{}", self.size.0, self.size.1);
        let child = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-fflags", "nobuffer", "-i", &input])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &scale, "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                tracing::warn!(method_name, "can't execute ffmpeg: {}", e);
                e
            })?;
        tracing::info!(method_name, input = input.as_str(), scale = scale.as_str(), "decoder started");
        Decoder::attach(child, self.size)
    }
}

impl FrameSource for FfmpegSource {
    fn open(&mut self) -> Result<()> {
        if self.decoder.is_none() {
            self.decoder = Some(self.spawn()?);
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.decoder.as_mut() {
            Some(decoder) => decoder.frames.next_frame(),
            None => {
                thread::sleep(IDLE_WAIT);
                Ok(None)
            }
        }
    }

    fn shutdown(&mut self) {
        if self.decoder.take().is_some() {
            tracing::info!(method_name = "ffmpeg_shutdown", "decoder stopped");
        }
    }
}

/// Video channel: pulls frames from a source, scales them and keeps only the
/// newest one for consumers.
pub struct VideoLink {
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    slot: Arc<SingleSlot<Frame>>,
    size: (u32, u32),
    seq: Arc<AtomicU64>,
    commands: Arc<dyn CommandSender>,
    capture: CyclicWorker,
}

impl VideoLink {
    pub fn new(source: Box<dyn FrameSource>, size: (u32, u32), commands: Arc<dyn CommandSender>) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            slot: Arc::new(SingleSlot::new()),
            size,
            seq: Arc::new(AtomicU64::new(0)),
            commands,
            capture: CyclicWorker::new("tello-video"),
        }
    }

    /// Opens the source, asks the vehicle to stream and starts capturing.
    /// A stopped link can't be started again.
    pub fn start(&self) -> Result<()> {
        match self.capture.state() {
            WorkerState::Running => return Ok(()),
            WorkerState::Stopped => {
                return Err(TelloError::WorkerStopped(self.capture.name().to_owned()))
            }
            WorkerState::Idle => {}
        }
        self.source().open()?;
        self.commands.send("streamon");
        let source = self.source.clone();
        let slot = self.slot.clone();
        let seq = self.seq.clone();
        let size = self.size;
        self.capture.start(move || {
            let img = {
                let mut src = source.lock().unwrap_or_else(|p| p.into_inner());
                src.next_frame()?
            };
            match img {
                Some(img) => publish(&slot, &seq, size, img),
                None => thread::sleep(IDLE_WAIT),
            }
            Ok(())
        })
    }

    /// Stops the stream, shuts the decoder down and releases anyone blocked
    /// in [`VideoLink::get_frame`]. Waits at most for one pending read.
    pub fn stop(&self) {
        if self.capture.is_running() {
            self.commands.send("streamoff");
        }
        self.capture.stop();
        self.slot.close();
        self.source().shutdown();
    }

    fn source(&self) -> MutexGuard<'_, Box<dyn FrameSource>> {
        self.source.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn join(&self) {
        self.capture.join();
    }

    /// Blocks until a frame newer than the last one taken arrives. Returns
    /// `None` once the link is stopped.
    pub fn get_frame(&self) -> Option<Frame> {
        self.slot.take()
    }

    pub fn get_frame_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.slot.take_timeout(timeout)
    }

    pub fn try_frame(&self) -> Option<Frame> {
        self.slot.try_take()
    }

    /// Frames overwritten before anybody took them.
    pub fn dropped_frames(&self) -> u64 {
        self.slot.dropped()
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, img: RgbImage) {
        publish(&self.slot, &self.seq, self.size, img);
    }
}

fn publish(slot: &SingleSlot<Frame>, seq: &AtomicU64, size: (u32, u32), img: RgbImage) {
    let img = if img.dimensions() != size {
        imageops::resize(&img, size.0, size.1, imageops::FilterType::Triangle)
    } else {
        img
    };
    let n = seq.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(method_name = "video_publish", seq = n, "frame ready");
    slot.publish(Frame::new(n, img));
}

impl Drop for VideoLink {
    fn drop(&mut self) {
        self.capture.stop();
        self.slot.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use image::Rgb;

    use super::*;
    use crate::command::tests::RecordingSender;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn test_latest_frame_wins() {
        let (_tx, rx) = mpsc::channel();
        let cmds = Arc::new(RecordingSender::default());
        let link = VideoLink::new(Box::new(ChannelSource::new(rx)), (8, 6), cmds);
        link.publish(solid(8, 6, 1));
        link.publish(solid(8, 6, 2));
        let frame = link.get_frame().unwrap();
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([2, 2, 2]));
        assert_eq!(frame.seq(), 1);
        assert!(link.try_frame().is_none());
        assert_eq!(link.dropped_frames(), 1);
    }

    #[test]
    fn test_frames_are_resized() {
        let (_tx, rx) = mpsc::channel();
        let cmds = Arc::new(RecordingSender::default());
        let link = VideoLink::new(Box::new(ChannelSource::new(rx)), (8, 6), cmds);
        link.publish(solid(32, 24, 9));
        assert_eq!(link.get_frame().unwrap().size(), (8, 6));
    }

    #[test]
    fn test_capture_loop_and_stream_commands() {
        let (tx, rx) = mpsc::channel();
        let cmds = Arc::new(RecordingSender::default());
        let link = VideoLink::new(Box::new(ChannelSource::new(rx)), (4, 4), cmds.clone());
        link.start().unwrap();
        link.start().unwrap();
        tx.send(solid(4, 4, 10)).unwrap();
        tx.send(solid(4, 4, 20)).unwrap();
        thread::sleep(Duration::from_millis(150));
        let frame = link.get_frame().unwrap();
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([20, 20, 20]));
        link.stop();
        link.join();
        assert_eq!(link.get_frame().map(|f| f.seq()), None);
        assert_eq!(cmds.fired(), vec!["streamon".to_owned(), "streamoff".to_owned()]);
    }

    #[test]
    fn test_stopped_link_refuses_restart() {
        let (_tx, rx) = mpsc::channel();
        let cmds = Arc::new(RecordingSender::default());
        let link = VideoLink::new(Box::new(ChannelSource::new(rx)), (4, 4), cmds.clone());
        link.start().unwrap();
        link.stop();
        link.join();
        assert!(matches!(link.start(), Err(TelloError::WorkerStopped(_))));
        link.stop();
        assert_eq!(cmds.fired(), vec!["streamon".to_owned(), "streamoff".to_owned()]);
    }

    #[test]
    fn test_decoder_is_not_spawned_before_open() {
        let mut source = FfmpegSource::new(Endpoint::new("127.0.0.1", 0), (4, 4));
        assert!(source.decoder.is_none());
        assert!(source.next_frame().unwrap().is_none());
        source.shutdown();
        assert!(source.decoder.is_none());
    }

    #[test]
    fn test_silent_decoder_does_not_block_stop() {
        // `cat` with an idle stdin never writes a frame
        let child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let source = FfmpegSource {
            stream: Endpoint::new("127.0.0.1", 0),
            size: (4, 4),
            decoder: Some(Decoder::attach(child, (4, 4)).unwrap()),
        };
        let cmds = Arc::new(RecordingSender::default());
        let link = Arc::new(VideoLink::new(Box::new(source), (4, 4), cmds.clone()));
        link.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = mpsc::channel();
        let l = link.clone();
        thread::spawn(move || {
            l.stop();
            l.join();
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());
        assert!(link.try_frame().is_none());
        assert_eq!(cmds.fired(), vec!["streamon".to_owned(), "streamoff".to_owned()]);
    }

    #[test]
    fn test_decoder_frames_reach_the_slot() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let mut stdin = child.stdin.take().unwrap();
        let source = FfmpegSource {
            stream: Endpoint::new("127.0.0.1", 0),
            size: (2, 2),
            decoder: Some(Decoder::attach(child, (2, 2)).unwrap()),
        };
        let cmds = Arc::new(RecordingSender::default());
        let link = VideoLink::new(Box::new(source), (2, 2), cmds);
        link.start().unwrap();
        std::io::Write::write_all(&mut stdin, &[7u8; 12]).unwrap();
        let frame = link.get_frame_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.image().get_pixel(1, 1), &Rgb([7, 7, 7]));
        link.stop();
        link.join();
    }
}
