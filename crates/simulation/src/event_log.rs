//! Text event log of a simulation run.
//!
//! Each line reads `<time> <TAG> <message>`. `EXTERNALIZE` and `ADOPT` lines
//! carry the node, the slot and the full transaction-hash set of the value.

use std::fmt;
use std::io::{self, Write};

use scpsim_common::{Hash256, NodeId};
use scpsim_scp::{
    transactions_to_str, value_to_str, Stage, Step, Transaction, Transition, TransitionRecord,
};

/// Category of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogTag {
    Mine,
    Nominate,
    Prepare,
    Commit,
    Externalize,
    /// Externalized by adopting the quorum's announced value.
    Adopt,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Mine => "MINE",
            LogTag::Nominate => "NOMINATE",
            LogTag::Prepare => "PREPARE",
            LogTag::Commit => "COMMIT",
            LogTag::Externalize => "EXTERNALIZE",
            LogTag::Adopt => "ADOPT",
        }
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub time: f64,
    pub tag: LogTag,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} {} {}", self.time, self.tag, self.message)
    }
}

/// Append-only log of everything notable that happened in a run.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: f64, tag: LogTag, message: impl Into<String>) {
        self.entries.push(LogEntry {
            time,
            tag,
            message: message.into(),
        });
    }

    /// Log a freshly mined transaction.
    pub fn record_mined(&mut self, time: f64, miner: NodeId, tx: &Transaction) {
        self.push(
            time,
            LogTag::Mine,
            format!("node={} tx={} fee={}", miner.0, tx.hash.to_hex(), tx.fee),
        );
    }

    /// Log a protocol transition reported by a node.
    pub fn record_transition(&mut self, record: &TransitionRecord) {
        match &record.transition {
            Transition::Phase {
                stage,
                step,
                value,
                transactions,
                counter,
            } => {
                let tag = match stage {
                    Stage::Nomination => LogTag::Nominate,
                    Stage::Prepare => LogTag::Prepare,
                    Stage::Commit => LogTag::Commit,
                };
                let mut message = format!(
                    "node={} slot={} step={} value={}[{}]",
                    record.node.0,
                    record.slot,
                    step_name(*step),
                    value.short(),
                    transactions
                );
                if *stage != Stage::Nomination {
                    message.push_str(&format!(" counter={counter}"));
                }
                self.push(record.time, tag, message);
            }
            Transition::Externalized {
                slot,
                value,
                adopted,
            } => {
                let tag = if *adopted {
                    LogTag::Adopt
                } else {
                    LogTag::Externalize
                };
                self.push(
                    record.time,
                    tag,
                    format!(
                        "node={} slot={} value={} txs={}",
                        record.node.0,
                        slot,
                        value_to_str(value),
                        transactions_to_str(value)
                    ),
                );
            }
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with `tag`, in log order.
    pub fn with_tag(&self, tag: LogTag) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |entry| entry.tag == tag)
    }

    /// Finalization lines (own or adopted) whose value holds `tx`.
    pub fn finalizations_of<'a>(&'a self, tx: &'a Hash256) -> impl Iterator<Item = &'a LogEntry> {
        let needle = tx.to_hex();
        self.entries.iter().filter(move |entry| {
            matches!(entry.tag, LogTag::Externalize | LogTag::Adopt)
                && entry.message.contains(&needle)
        })
    }

    /// Write every line to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for entry in &self.entries {
            writeln!(writer, "{entry}")?;
        }
        writer.flush()
    }
}

fn step_name(step: Step) -> &'static str {
    match step {
        Step::Voted => "voted",
        Step::Accepted => "accepted",
        Step::Confirmed => "confirmed",
        Step::Aborted => "aborted",
    }
}
