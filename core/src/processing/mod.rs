pub mod aligner;
pub mod calibration;
pub mod compensation;
pub mod correlator;
pub mod evaluator;
pub mod optimizer;
pub mod ring;

pub use aligner::{common_valid_times, join_on_common_times, AlignmentMode, StreamAligner};
pub use calibration::{apply_offset, estimate_offset, window_mean};
pub use compensation::{
    CompensationFilter, DynamicCompensation, DynamicParams, FilterState, StaticCompensation, StaticParams,
};
pub use correlator::{correlate_capture, CorrelationOutput, Correlator, CorrelatorStats};
pub use evaluator::{summarize_rates, CommonEvaluation, ErrorEvaluator, ErrorMetrics, RateSummary};
pub use optimizer::{optimize_dynamic, optimize_static, DynamicGrid, GridSearch, ParamRange, SearchResult, StaticGrid};
pub use ring::RingSlots;
