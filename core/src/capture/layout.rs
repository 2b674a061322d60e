use crate::capture::event::SnifferEvent;
use crate::prelude::{Address, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Number of fixed columns preceding the Tx pool in every capture row:
/// system time, source address, sequence, message length, filter.
pub const FIXED_COLUMNS: usize = 5;

/// Column layout of a raw sniffer capture, decoded from its header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureLayout {
    pub tx_count: usize,
    pub rx_count: usize,
}

impl CaptureLayout {
    pub fn new(tx_count: usize, rx_count: usize) -> Self {
        Self { tx_count, rx_count }
    }

    /// Reads the `Tx{i}_seq` / `Rx{i}_seq` columns of a capture header.
    pub fn from_header(header: &str) -> PipelineResult<Self> {
        let mut tx_count = 0;
        let mut rx_count = 0;

        for column in header.trim().split(',').map(str::trim) {
            if let Some(index) = indexed_column(column, "Tx") {
                tx_count = tx_count.max(index + 1);
            } else if let Some(index) = indexed_column(column, "Rx") {
                rx_count = rx_count.max(index + 1);
            }
        }

        if tx_count == 0 {
            return Err(PipelineError::InvalidInput(
                "capture header declares no Tx columns".into(),
            ));
        }

        Ok(Self { tx_count, rx_count })
    }

    /// Number of fields a well-formed body row carries.
    pub fn field_count(&self) -> usize {
        FIXED_COLUMNS + 2 * self.tx_count + 3 * self.rx_count
    }

    pub(crate) fn rx_offset(&self, rx_index: usize) -> usize {
        FIXED_COLUMNS + 2 * self.tx_count + 3 * rx_index
    }
}

fn indexed_column(column: &str, prefix: &str) -> Option<usize> {
    column
        .strip_prefix(prefix)?
        .strip_suffix("_seq")?
        .parse()
        .ok()
}

/// Distinct sender addresses in first-appearance order over the first
/// `scan_lines` events.
pub fn detect_participants(events: &[SnifferEvent], scan_lines: usize) -> Vec<Address> {
    let mut addresses = Vec::new();
    for event in events.iter().take(scan_lines) {
        if !addresses.contains(&event.src_addr) {
            addresses.push(event.src_addr);
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_pool_and_one_receiver() {
        let header = "system_time,src_addr,msg_seq,msg_len,filter,\
                      Tx0_time,Tx0_seq,Tx1_time,Tx1_seq,Tx2_time,Tx2_seq,\
                      Rx0_addr,Rx0_time,Rx0_seq,";
        let layout = CaptureLayout::from_header(header).unwrap();
        assert_eq!(layout, CaptureLayout::new(3, 1));
        assert_eq!(layout.field_count(), 5 + 6 + 3);
        assert_eq!(layout.rx_offset(0), 11);
    }

    #[test]
    fn header_without_tx_columns_is_rejected() {
        let err = CaptureLayout::from_header("system_time,src_addr,Rx0_seq").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn participants_follow_first_appearance() {
        let layout = CaptureLayout::new(1, 0);
        let events: Vec<SnifferEvent> = ["5,3,1,0,0,0,0", "6,2,1,0,0,0,0", "7,3,2,0,0,0,0"]
            .iter()
            .enumerate()
            .map(|(idx, line)| SnifferEvent::parse(line, &layout, idx + 2).unwrap())
            .collect();

        assert_eq!(detect_participants(&events, 50), vec![3, 2]);
        assert_eq!(detect_participants(&events, 1), vec![3]);
    }
}
