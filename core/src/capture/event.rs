use crate::capture::layout::CaptureLayout;
use crate::prelude::{Address, PipelineError, PipelineResult, SequenceNumber, Timestamp};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A transmit timestamp the sender reports about one of its own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReport {
    pub time: u64,
    pub seq: SequenceNumber,
}

/// A reception the sender reports about a message it heard from `tx_addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxReport {
    pub tx_addr: Address,
    pub rx_time: u64,
    pub rx_seq: SequenceNumber,
}

/// One decoded sniffer capture line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnifferEvent {
    pub system_time: Timestamp,
    pub src_addr: Address,
    pub seq: SequenceNumber,
    pub filter_flag: u16,
    /// Most recent completed transmission of the sender (`Tx0`).
    pub last_tx: TxReport,
    /// Older entries of the sender's Tx pool, newest first.
    pub tx_history: Vec<TxReport>,
    pub last_rx: Vec<RxReport>,
}

impl SnifferEvent {
    /// Parses a body row. `line_number` is only used for error reporting.
    pub fn parse(line: &str, layout: &CaptureLayout, line_number: usize) -> PipelineResult<Self> {
        if layout.tx_count == 0 {
            return Err(PipelineError::InvalidInput(
                "capture layout has no Tx columns".into(),
            ));
        }

        let trimmed = line.trim();
        let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed);
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();

        if fields.len() != layout.field_count() {
            return Err(PipelineError::malformed(
                line_number,
                format!(
                    "expected {} fields, found {}",
                    layout.field_count(),
                    fields.len()
                ),
            ));
        }

        let field = |idx: usize| Field {
            raw: fields[idx],
            index: idx,
            line: line_number,
        };

        let mut tx_reports = (0..layout.tx_count)
            .map(|i| {
                let base = 5 + 2 * i;
                Ok(TxReport {
                    time: field(base).parse()?,
                    seq: field(base + 1).parse()?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        let last_tx = tx_reports.remove(0);

        let last_rx = (0..layout.rx_count)
            .map(|i| {
                let base = layout.rx_offset(i);
                Ok(RxReport {
                    tx_addr: field(base).parse()?,
                    rx_time: field(base + 1).parse()?,
                    rx_seq: field(base + 2).parse()?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            system_time: field(0).parse()?,
            src_addr: field(1).parse()?,
            seq: field(2).parse()?,
            filter_flag: field(4).parse()?,
            last_tx,
            tx_history: tx_reports,
            last_rx,
        })
    }
}

struct Field<'a> {
    raw: &'a str,
    index: usize,
    line: usize,
}

impl Field<'_> {
    fn parse<T: FromStr>(&self) -> PipelineResult<T> {
        self.raw.parse().map_err(|_| {
            PipelineError::malformed(
                self.line,
                format!("field {} is not a valid number: {:?}", self.index, self.raw),
            )
        })
    }
}
