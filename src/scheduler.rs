use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    thread,
    time::Duration,
};

use chrono::{DateTime, Local};

use crate::{command::CommandSender, error::Result, worker::CyclicWorker};

pub const KEEPALIVE_CMD: &str = "command";

/// A command re-sent every `period` scheduler ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicEntry {
    pub command: String,
    pub period: u64,
    pub label: String,
    /// Trimmed text of the last reply, empty until one arrives.
    pub last_reply: String,
    pub updated_at: Option<DateTime<Local>>,
}

impl PeriodicEntry {
    fn new(command: &str, period: u64, label: &str) -> Self {
        Self {
            command: command.to_owned(),
            period: period.max(1),
            label: label.to_owned(),
            last_reply: String::new(),
            updated_at: None,
        }
    }

    fn is_due(&self, tick: u64) -> bool {
        tick % self.period == 0
    }
}

/// Fires registered commands on their cadence, one blocking send at a time.
pub struct CommandScheduler {
    entries: Arc<RwLock<Vec<PeriodicEntry>>>,
    ticks: Arc<AtomicU64>,
    commands: Arc<dyn CommandSender>,
    tick: Duration,
    reply_timeout: Duration,
    worker: CyclicWorker,
}

impl CommandScheduler {
    /// Starts with the keep-alive entry already registered.
    pub fn new(
        commands: Arc<dyn CommandSender>,
        tick: Duration,
        reply_timeout: Duration,
        keepalive_period: u64,
    ) -> Self {
        let keepalive = PeriodicEntry::new(KEEPALIVE_CMD, keepalive_period, "");
        Self {
            entries: Arc::new(RwLock::new(vec![keepalive])),
            ticks: Arc::new(AtomicU64::new(1)),
            commands,
            tick,
            reply_timeout,
            worker: CyclicWorker::new("tello-scheduler"),
        }
    }

    /// Appends an entry, picked up on the next tick.
    pub fn register(&self, command: &str, period: u64, label: &str) {
        tracing::info!(method_name = "register", command, period, label, "periodic command");
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(PeriodicEntry::new(command, period, label));
    }

    pub fn entries(&self) -> Vec<PeriodicEntry> {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of the next tick to run, starting at 1.
    pub fn next_tick(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Runs one tick without sleeping. Returns how many commands fired.
    pub fn tick(&self) -> usize {
        run_tick(&self.entries, &self.ticks, self.commands.as_ref(), self.reply_timeout)
    }

    pub fn start(&self) -> Result<()> {
        let entries = self.entries.clone();
        let ticks = self.ticks.clone();
        let commands = self.commands.clone();
        let (tick, reply_timeout) = (self.tick, self.reply_timeout);
        self.worker.start(move || {
            run_tick(&entries, &ticks, commands.as_ref(), reply_timeout);
            thread::sleep(tick);
            Ok(())
        })
    }

    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn join(&self) {
        self.worker.join();
    }
}

fn run_tick(
    entries: &RwLock<Vec<PeriodicEntry>>,
    ticks: &AtomicU64,
    commands: &dyn CommandSender,
    reply_timeout: Duration,
) -> usize {
    let method_name = "scheduler_tick";
    let tick = ticks.fetch_add(1, Ordering::Relaxed);
    let due: Vec<(usize, String)> = entries
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_due(tick))
        .map(|(i, e)| (i, e.command.clone()))
        .collect();

    for (idx, cmd) in &due {
        let reply = commands.send_and_wait(cmd, reply_timeout);
        let text = reply.text().map(|t| t.trim_end().to_owned()).unwrap_or_default();
        tracing::debug!(method_name, tick, cmd = cmd.as_str(), reply = text.as_str(), "periodic command");
        let mut g = entries.write().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = g.get_mut(*idx) {
            entry.last_reply = text;
            entry.updated_at = Some(Local::now());
        }
    }
    due.len()
}
