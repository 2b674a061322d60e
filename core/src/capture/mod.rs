pub mod event;
pub mod layout;
pub mod record;

pub use event::{RxReport, SnifferEvent, TxReport};
pub use layout::{detect_participants, CaptureLayout};
pub use record::{MessageRecord, PeerReception};
