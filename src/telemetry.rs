use std::{collections::HashMap, net::UdpSocket, sync::Arc, time::Duration};

use chrono::{DateTime, Local};

use crate::{
    config::Endpoint,
    error::{Result, TelloError},
    slot::Latest,
    utils,
    worker::CyclicWorker,
};

/// One decoded state datagram, e.g. `mid:0;x:100;y:200;bat:75;`.
///
/// Fields are kept both positionally (the record flattened on `;` and `:`)
/// and as a key/value map built from consecutive pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFrame {
    fields: Vec<String>,
    values: HashMap<String, String>,
    pub received_at: Option<DateTime<Local>>,
}

impl TelemetryFrame {
    pub fn parse(record: &str) -> Result<Self> {
        let record = record.trim_end();
        if record.is_empty() {
            return Err(TelloError::Decode("empty state record".to_owned()));
        }
        let fields: Vec<String> = record
            .replace(';', ":")
            .split(':')
            .map(|f| f.trim().to_owned())
            .collect();

        let mut values = HashMap::new();
        for field in record.split(';') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let Some((key, value)) = field.split_once(':') else {
                return Err(TelloError::Decode(format!("state field without value: {field}")));
            };
            if key.is_empty() {
                return Err(TelloError::Decode(format!("state field without key: {field}")));
            }
            values.insert(key.to_owned(), value.to_owned());
        }

        Ok(Self {
            fields,
            values,
            received_at: Some(Local::now()),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn at(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|v| v.as_str())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Receives the unsolicited state stream and keeps only the newest frame.
#[derive(Debug)]
pub struct TelemetryLink {
    sock: Arc<UdpSocket>,
    latest: Arc<Latest<TelemetryFrame>>,
    receiver: CyclicWorker,
}

impl TelemetryLink {
    pub fn bind(local: &Endpoint, read_timeout: Duration) -> Result<Self> {
        Ok(Self {
            sock: Arc::new(utils::udp_sock(local, read_timeout)?),
            latest: Arc::new(Latest::new()),
            receiver: CyclicWorker::new("tello-state-recv"),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.sock.local_addr()?)
    }

    pub fn start(&self) -> Result<()> {
        let sock = self.sock.clone();
        let latest = self.latest.clone();
        let mut buff = [0u8; 1024];
        self.receiver.start(move || {
            let method_name = "state_recv";
            let nread = match sock.recv(&mut buff) {
                Ok(n) => n,
                Err(e) => {
                    let e = TelloError::from(e);
                    return if e.is_timeout() { Ok(()) } else { Err(e) };
                }
            };
            let decoded = utils::datagram_text(&buff[..nread])
                .ok_or_else(|| TelloError::Decode("non utf-8 state record".to_owned()))
                .and_then(|text| TelemetryFrame::parse(&text));
            match decoded {
                Ok(frame) => {
                    tracing::trace!(method_name, nread, "state frame: {:?}", frame.fields());
                    latest.publish(frame);
                }
                Err(e) => tracing::debug!(method_name, "dropping state record: {e}"),
            }
            Ok(())
        })
    }

    pub fn stop(&self) {
        self.receiver.stop();
    }

    pub fn join(&self) {
        self.receiver.join();
    }

    /// Newest frame, empty until the first datagram arrives.
    pub fn latest(&self) -> Arc<TelemetryFrame> {
        self.latest.get().unwrap_or_default()
    }
}

impl Drop for TelemetryLink {
    fn drop(&mut self) {
        self.receiver.stop();
    }
}
