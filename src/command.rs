use std::{
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use crate::{
    config::Endpoint,
    error::{Result, TelloError},
    utils,
    worker::CyclicWorker,
};

/// Outcome of a blocking command. A missing reply is routine data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    NoReply,
}

impl Reply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Text(t) => Some(t),
            Reply::NoReply => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Reply::Text(_))
    }
}

/// Anything that can put a text command on the wire.
pub trait CommandSender: Send + Sync {
    /// Sends `cmd` and waits up to `timeout` for the vehicle to answer.
    fn send_and_wait(&self, cmd: &str, timeout: Duration) -> Reply;
    /// Fire and forget, failures are only logged.
    fn send(&self, cmd: &str);
}

/// Request/acknowledge channel to the vehicle.
///
/// Replies are matched to requests only by timing: the reply slot holds the
/// last datagram received after the last blocking send. Two overlapping
/// `send_and_wait` callers may get each other's reply, so blocking sends
/// should stay on one thread (the scheduler).
#[derive(Debug)]
pub struct CommandLink {
    remote: SocketAddr,
    sock: Arc<UdpSocket>,
    reply: Arc<ReplySlot>,
    receiver: CyclicWorker,
}

#[derive(Debug, Default)]
struct ReplySlot {
    text: Mutex<Option<String>>,
    arrived: Condvar,
}

impl ReplySlot {
    fn clear(&self) {
        *self.text.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    fn store(&self, text: String) {
        *self.text.lock().unwrap_or_else(|p| p.into_inner()) = Some(text);
        self.arrived.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<String> {
        let g = self.text.lock().unwrap_or_else(|p| p.into_inner());
        let (mut g, _) = self
            .arrived
            .wait_timeout_while(g, timeout, |t| t.is_none())
            .unwrap_or_else(|p| p.into_inner());
        g.take()
    }
}

impl CommandLink {
    pub fn bind(local: &Endpoint, remote: &Endpoint, read_timeout: Duration) -> Result<Self> {
        let sock = utils::udp_sock(local, read_timeout)?;
        let remote = remote.addr().to_socket_addrs()?.next().ok_or_else(|| {
            TelloError::Transport(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("can't resolve {remote}"),
            ))
        })?;
        Ok(Self {
            remote,
            sock: Arc::new(sock),
            reply: Arc::new(ReplySlot::default()),
            receiver: CyclicWorker::new("tello-cmd-recv"),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }

    /// Starts the receive loop. Safe to call repeatedly.
    pub fn start(&self) -> Result<()> {
        let sock = self.sock.clone();
        let reply = self.reply.clone();
        let mut buff = [0u8; 2048];
        self.receiver.start(move || {
            let method_name = "cmd_recv";
            let nread = match sock.recv(&mut buff) {
                Ok(n) => n,
                Err(e) => {
                    let e = TelloError::from(e);
                    return if e.is_timeout() { Ok(()) } else { Err(e) };
                }
            };
            let text = utils::datagram_text(&buff[..nread])
                .ok_or_else(|| TelloError::Decode("non utf-8 command reply".to_owned()))?;
            tracing::debug!(method_name, nread, "reply: {}", text.trim_end());
            reply.store(text);
            Ok(())
        })
    }

    pub fn stop(&self) {
        self.receiver.stop();
    }

    pub fn join(&self) {
        self.receiver.join();
    }

    fn transmit(&self, cmd: &str) -> Result<()> {
        self.sock.send_to(cmd.as_bytes(), self.remote)?;
        Ok(())
    }
}

impl CommandSender for CommandLink {
    fn send_and_wait(&self, cmd: &str, timeout: Duration) -> Reply {
        let method_name = "send_and_wait";
        self.reply.clear();
        if let Err(e) = self.transmit(cmd) {
            tracing::warn!(method_name, cmd, "unable to send command: {e}");
            return Reply::NoReply;
        }
        match self.reply.wait(timeout) {
            Some(text) => Reply::Text(text),
            None => {
                tracing::debug!(method_name, cmd, "no reply within {:?}", timeout);
                Reply::NoReply
            }
        }
    }

    fn send(&self, cmd: &str) {
        let method_name = "send";
        tracing::debug!(method_name, cmd, "send");
        if let Err(e) = self.transmit(cmd) {
            tracing::warn!(method_name, cmd, "unable to send command: {e}");
        }
    }
}

impl Drop for CommandLink {
    fn drop(&mut self) {
        self.receiver.stop();
    }
}
