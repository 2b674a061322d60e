use std::sync::Mutex;

/// Progress counters for long-running stages, safe to share across workers.
pub struct ProgressRecorder {
    inner: Mutex<Progress>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub evaluated: usize,
    pub rejected: usize,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Progress::default()),
        }
    }

    pub fn record_evaluated(&self, count: usize) {
        if let Ok(mut progress) = self.inner.lock() {
            progress.evaluated += count;
        }
    }

    pub fn record_rejected(&self, count: usize) {
        if let Ok(mut progress) = self.inner.lock() {
            progress.rejected += count;
        }
    }

    pub fn snapshot(&self) -> Progress {
        self.inner
            .lock()
            .map(|progress| *progress)
            .unwrap_or_default()
    }
}

impl Default for ProgressRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let recorder = ProgressRecorder::new();
        recorder.record_evaluated(3);
        recorder.record_evaluated(2);
        recorder.record_rejected(1);
        assert_eq!(
            recorder.snapshot(),
            Progress {
                evaluated: 5,
                rejected: 1
            }
        );
    }
}
