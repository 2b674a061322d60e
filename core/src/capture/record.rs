use crate::prelude::{Address, PipelineError, PipelineResult, SequenceNumber, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Reception of a message by one expected peer. `rx_time == 0` means the
/// reception was never reported inside the correlation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReception {
    pub peer_addr: Address,
    pub rx_time: u64,
}

/// Reconstructed timing record for a single transmitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub system_time: Timestamp,
    pub src_addr: Address,
    pub seq: SequenceNumber,
    pub filter_flag: u16,
    pub tx_time: u64,
    pub rx: Vec<PeerReception>,
}

impl MessageRecord {
    pub fn new(
        system_time: Timestamp,
        src_addr: Address,
        seq: SequenceNumber,
        filter_flag: u16,
        peers: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            system_time,
            src_addr,
            seq,
            filter_flag,
            tx_time: 0,
            rx: peers
                .into_iter()
                .map(|peer_addr| PeerReception {
                    peer_addr,
                    rx_time: 0,
                })
                .collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tx_time != 0
    }

    /// Receive time recorded by the peer in column `column`, if that column exists.
    pub fn rx_time(&self, column: usize) -> Option<u64> {
        self.rx.get(column).map(|reception| reception.rx_time)
    }

    pub fn csv_header(peer_count: usize) -> String {
        let mut header = String::from("system_time,src_addr,msg_seq,filter,Tx_time");
        for i in 0..peer_count {
            let _ = write!(header, ",Rx{i}_addr,Rx{i}_time");
        }
        header
    }

    pub fn to_csv_row(&self) -> String {
        let mut row = format!(
            "{},{},{},{},{}",
            self.system_time, self.src_addr, self.seq, self.filter_flag, self.tx_time
        );
        for reception in &self.rx {
            let _ = write!(row, ",{},{}", reception.peer_addr, reception.rx_time);
        }
        row
    }

    /// Parses a row written by [`MessageRecord::to_csv_row`].
    pub fn from_csv_row(line: &str, line_number: usize) -> PipelineResult<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() < 5 || (fields.len() - 5) % 2 != 0 {
            return Err(PipelineError::malformed(
                line_number,
                format!("record row has {} fields", fields.len()),
            ));
        }

        let number = |idx: usize| -> PipelineResult<u64> {
            fields[idx].parse().map_err(|_| {
                PipelineError::malformed(line_number, format!("field {idx} is not a number"))
            })
        };
        let narrow = |idx: usize| -> PipelineResult<u16> {
            u16::try_from(number(idx)?).map_err(|_| {
                PipelineError::malformed(line_number, format!("field {idx} exceeds 16 bits"))
            })
        };

        let rx = (5..fields.len())
            .step_by(2)
            .map(|idx| {
                Ok(PeerReception {
                    peer_addr: narrow(idx)?,
                    rx_time: number(idx + 1)?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            system_time: number(0)?,
            src_addr: narrow(1)?,
            seq: narrow(2)?,
            filter_flag: narrow(3)?,
            tx_time: number(4)?,
            rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lists_every_peer_column() {
        assert_eq!(
            MessageRecord::csv_header(2),
            "system_time,src_addr,msg_seq,filter,Tx_time,Rx0_addr,Rx0_time,Rx1_addr,Rx1_time"
        );
    }

    #[test]
    fn row_parses_back_into_record() {
        let mut record = MessageRecord::new(500, 2, 9, 1, [3, 4]);
        record.tx_time = 7000;
        record.rx[1].rx_time = 7100;

        let row = record.to_csv_row();
        assert_eq!(row, "500,2,9,1,7000,3,0,4,7100");
        assert_eq!(MessageRecord::from_csv_row(&row, 2).unwrap(), record);
    }

    #[test]
    fn odd_peer_columns_are_rejected() {
        assert!(MessageRecord::from_csv_row("500,2,9,1,7000,3", 4).is_err());
    }
}
