use crate::capture::{detect_participants, CaptureLayout, MessageRecord, SnifferEvent};
use crate::config::CorrelatorConfig;
use crate::prelude::{Address, PipelineError, PipelineResult};
use crate::processing::ring::RingSlots;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorStats {
    pub processed: usize,
    pub emitted: usize,
    pub dropped: usize,
}

/// Fixed-lag join of sniffer events into per-message timing records.
///
/// Every event allocates a record at the write cursor and back-patches the
/// transmit and receive times of records still inside the window. Once a
/// full generation of `P` events has been written, the oldest `P` slots are
/// flushed: complete records are emitted, the rest are dropped.
pub struct Correlator {
    participants: Vec<Address>,
    ring: RingSlots,
    cursor: usize,
    stats: CorrelatorStats,
    logger: LogManager,
}

impl Correlator {
    pub fn new(participants: Vec<Address>, window_factor: usize) -> PipelineResult<Self> {
        if participants.len() < 2 {
            return Err(PipelineError::Configuration(format!(
                "at least two participants are required, got {:?}",
                participants
            )));
        }
        if window_factor < 2 {
            return Err(PipelineError::Configuration(format!(
                "window_factor {window_factor} is below 2"
            )));
        }
        let ring = RingSlots::with_capacity(window_factor * participants.len())?;
        Ok(Self {
            participants,
            ring,
            cursor: 0,
            stats: CorrelatorStats::default(),
            logger: LogManager::new("correlator"),
        })
    }

    pub fn participants(&self) -> &[Address] {
        &self.participants
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    pub fn ring(&self) -> &RingSlots {
        &self.ring
    }

    fn expected_peers(&self, src: Address) -> impl Iterator<Item = Address> + '_ {
        self.participants
            .iter()
            .copied()
            .filter(move |&addr| addr != src)
            .take(self.participants.len() - 1)
    }

    /// Feeds one event and returns the records flushed by it, oldest first.
    pub fn push(&mut self, event: &SnifferEvent) -> Vec<MessageRecord> {
        let record = MessageRecord::new(
            event.system_time,
            event.src_addr,
            event.seq,
            event.filter_flag,
            self.expected_peers(event.src_addr),
        );
        self.ring.insert(self.cursor, record);
        self.stats.processed += 1;

        for position in self.ring.lookup(event.src_addr, event.last_tx.seq) {
            if let Some(sent) = self.ring.get_mut(position) {
                sent.tx_time = event.last_tx.time;
            }
        }

        for report in &event.last_rx {
            for position in self.ring.lookup(report.tx_addr, report.rx_seq) {
                if let Some(heard) = self.ring.get_mut(position) {
                    for reception in heard
                        .rx
                        .iter_mut()
                        .filter(|reception| reception.peer_addr == event.src_addr)
                    {
                        reception.rx_time = report.rx_time;
                    }
                }
            }
        }

        let count = self.participant_count();
        let mut flushed = Vec::new();
        if (self.cursor + 1) % count == 0 && self.ring.is_live(2 * count - 1) {
            for offset in 0..count {
                if let Some(record) = self.ring.take(self.cursor + 1 + offset) {
                    self.route(record, &mut flushed);
                }
            }
        }

        self.cursor = (self.cursor + 1) % self.ring.capacity();
        flushed
    }

    /// Empties the window, emitting the complete records oldest first.
    pub fn finish(&mut self) -> Vec<MessageRecord> {
        let mut flushed = Vec::new();
        for record in self.ring.drain_from(self.cursor) {
            self.route(record, &mut flushed);
        }
        flushed
    }

    fn route(&mut self, record: MessageRecord, flushed: &mut Vec<MessageRecord>) {
        if record.is_complete() {
            self.stats.emitted += 1;
            flushed.push(record);
        } else {
            self.stats.dropped += 1;
            self.logger.detail(&format!(
                "dropping message {}#{} with no observed transmission",
                record.src_addr, record.seq
            ));
        }
    }
}

/// Result of correlating a whole capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationOutput {
    pub layout: CaptureLayout,
    pub participants: Vec<Address>,
    pub records: Vec<MessageRecord>,
    pub stats: CorrelatorStats,
}

impl CorrelationOutput {
    pub fn peer_count(&self) -> usize {
        self.participants.len().saturating_sub(1)
    }
}

/// Correlates a complete capture: header line followed by body rows.
pub fn correlate_capture(capture: &str, config: &CorrelatorConfig) -> PipelineResult<CorrelationOutput> {
    config.validate()?;
    let logger = LogManager::new("correlator");

    let mut lines = capture
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| PipelineError::InvalidInput("capture has no header line".into()))?;
    let layout = CaptureLayout::from_header(header)?;
    logger.record(&format!(
        "capture layout: {} Tx, {} Rx columns",
        layout.tx_count, layout.rx_count
    ));

    let events = lines
        .map(|(number, line)| SnifferEvent::parse(line, &layout, number))
        .collect::<PipelineResult<Vec<_>>>()?;

    let detected = detect_participants(&events, config.address_scan_lines);
    let count = config.participant_count.unwrap_or(detected.len());
    if detected.len() < count {
        return Err(PipelineError::Configuration(format!(
            "expected {count} participants but the capture only shows {:?}",
            detected
        )));
    }
    let participants = detected[..count].to_vec();
    logger.record(&format!("participants {:?}", participants));

    let mut correlator = Correlator::new(participants.clone(), config.window_factor)?;
    let mut records = Vec::new();
    for event in &events {
        records.extend(correlator.push(event));
    }
    if config.drain_tail {
        records.extend(correlator.finish());
    }

    let stats = correlator.stats();
    logger.record(&format!(
        "processed {} lines, emitted {} records, dropped {}",
        stats.processed, stats.emitted, stats.dropped
    ));

    Ok(CorrelationOutput {
        layout,
        participants,
        records,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{RxReport, TxReport};

    fn event(
        system_time: u64,
        src_addr: Address,
        seq: u16,
        last_tx: (u64, u16),
        last_rx: Option<(Address, u64, u16)>,
    ) -> SnifferEvent {
        SnifferEvent {
            system_time,
            src_addr,
            seq,
            filter_flag: 0,
            last_tx: TxReport {
                time: last_tx.0,
                seq: last_tx.1,
            },
            tx_history: Vec::new(),
            last_rx: last_rx
                .map(|(tx_addr, rx_time, rx_seq)| RxReport {
                    tx_addr,
                    rx_time,
                    rx_seq,
                })
                .into_iter()
                .collect(),
        }
    }

    fn tx_time(addr: Address, seq: u16) -> u64 {
        10_000 * seq as u64 + addr as u64
    }

    fn rx_time(addr: Address, seq: u16) -> u64 {
        20_000 * seq as u64 + addr as u64
    }

    /// Two nodes alternating: each line reports the sender's previous
    /// transmission and its reception of the peer's latest message.
    fn alternating(lines: usize) -> Vec<SnifferEvent> {
        (0..lines)
            .map(|i| {
                let (src, peer) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                let seq = (i / 2 + 1) as u16;
                let peer_seq = if src == 1 { seq - 1 } else { seq };
                event(
                    100 + i as u64,
                    src,
                    seq,
                    (tx_time(src, seq - 1), seq - 1),
                    Some((peer, rx_time(src, peer_seq), peer_seq)),
                )
            })
            .collect()
    }

    #[test]
    fn in_window_reports_complete_records() {
        let mut correlator = Correlator::new(vec![1, 2], 5).unwrap();
        let mut emitted = Vec::new();
        for (i, e) in alternating(12).iter().enumerate() {
            let flushed = correlator.push(e);
            if i < 9 {
                assert!(flushed.is_empty(), "nothing flushes before the window fills");
            }
            emitted.extend(flushed);
        }

        assert_eq!(emitted.len(), 4);
        let first = &emitted[0];
        assert_eq!((first.src_addr, first.seq, first.system_time), (1, 1, 100));
        assert_eq!(first.tx_time, tx_time(1, 1));
        assert_eq!(first.rx.len(), 1);
        assert_eq!(first.rx[0].peer_addr, 2);
        assert_eq!(first.rx[0].rx_time, rx_time(2, 1));

        let second = &emitted[1];
        assert_eq!((second.src_addr, second.seq), (2, 1));
        assert_eq!(second.tx_time, tx_time(2, 1));
        assert_eq!(second.rx[0].peer_addr, 1);
        assert_eq!(second.rx[0].rx_time, rx_time(1, 1));

        assert_eq!((emitted[2].src_addr, emitted[2].seq), (1, 2));
        assert_eq!((emitted[3].src_addr, emitted[3].seq), (2, 2));
        assert_eq!(correlator.stats().emitted, 4);
        assert_eq!(correlator.stats().dropped, 0);
    }

    #[test]
    fn late_report_falls_outside_window() {
        let mut events = alternating(14);
        // node 1 never reports sending seq 1 in time
        events[2].last_tx = TxReport { time: 0, seq: 0 };
        // a report arriving after the record was flushed matches nothing
        events[12].last_tx = TxReport {
            time: tx_time(1, 1),
            seq: 1,
        };

        let mut correlator = Correlator::new(vec![1, 2], 5).unwrap();
        let emitted: Vec<_> = events.iter().flat_map(|e| correlator.push(e)).collect();

        assert!(emitted.iter().all(|r| !(r.src_addr == 1 && r.seq == 1)));
        assert_eq!(correlator.stats().dropped, 1);
        assert!(correlator.ring().lookup(1, 1).is_empty());
    }

    #[test]
    fn flushed_slots_are_null_and_never_shared() {
        let mut correlator = Correlator::new(vec![1, 2], 5).unwrap();
        for (i, e) in alternating(10).iter().enumerate() {
            correlator.push(e);
            assert!(correlator.ring().live_count() <= correlator.ring().capacity());
            if i == 9 {
                assert!(!correlator.ring().is_live(0));
                assert!(!correlator.ring().is_live(1));
            }
        }
        assert_eq!(correlator.ring().live_count(), 8);
    }

    #[test]
    fn reception_only_patches_expected_peer() {
        let mut correlator = Correlator::new(vec![1, 2, 3], 5).unwrap();
        correlator.push(&event(1, 1, 5, (0, 0), None));
        correlator.push(&event(2, 3, 9, (0, 0), Some((1, 777, 5))));

        let slot = correlator.ring().lookup(1, 5)[0];
        let record = correlator.ring().get(slot).unwrap();
        assert_eq!(record.rx[0].peer_addr, 2);
        assert_eq!(record.rx[0].rx_time, 0);
        assert_eq!(record.rx[1].peer_addr, 3);
        assert_eq!(record.rx[1].rx_time, 777);
    }

    #[test]
    fn finish_drains_complete_records_oldest_first() {
        let mut correlator = Correlator::new(vec![1, 2], 5).unwrap();
        for e in alternating(4) {
            assert!(correlator.push(&e).is_empty());
        }
        let tail = correlator.finish();
        // the last two messages never had their transmission reported
        assert_eq!(
            tail.iter().map(|r| (r.src_addr, r.seq)).collect::<Vec<_>>(),
            vec![(1, 1), (2, 1)]
        );
        assert_eq!(correlator.stats().dropped, 2);
        assert_eq!(correlator.ring().live_count(), 0);
    }

    #[test]
    fn single_participant_is_rejected() {
        assert!(matches!(
            Correlator::new(vec![1], 5),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn capture_text_is_correlated_end_to_end() {
        let mut capture = String::from(
            "system_time,src_addr,msg_seq,msg_len,filter,Tx0_time,Tx0_seq,Rx0_addr,Rx0_time,Rx0_seq,\n",
        );
        for e in alternating(12) {
            let rx = e.last_rx[0];
            capture.push_str(&format!(
                "{},{},{},40,0,{},{},{},{},{},\n",
                e.system_time, e.src_addr, e.seq, e.last_tx.time, e.last_tx.seq, rx.tx_addr,
                rx.rx_time, rx.rx_seq
            ));
        }

        let output = correlate_capture(&capture, &CorrelatorConfig::default()).unwrap();
        assert_eq!(output.participants, vec![1, 2]);
        assert_eq!(output.layout, CaptureLayout::new(1, 1));
        assert_eq!(output.records.len(), 4);
        assert_eq!(output.stats.processed, 12);
    }

    #[test]
    fn missing_participants_is_a_configuration_error() {
        let capture = "system_time,src_addr,msg_seq,msg_len,filter,Tx0_time,Tx0_seq\n\
                       1,1,1,0,0,0,0\n2,2,1,0,0,0,0\n";
        let config = CorrelatorConfig {
            participant_count: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            correlate_capture(capture, &config),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn malformed_body_row_is_fatal() {
        let capture = "system_time,src_addr,msg_seq,msg_len,filter,Tx0_time,Tx0_seq\n\
                       1,1,1,0,0,0,0\n2,2,1,0\n";
        assert!(matches!(
            correlate_capture(capture, &CorrelatorConfig::default()),
            Err(PipelineError::MalformedLine { line: 3, .. })
        ));
    }
}
