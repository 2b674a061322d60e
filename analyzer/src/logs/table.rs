use anyhow::{bail, Context};
use rangecore::capture::MessageRecord;
use rangecore::prelude::Timestamp;
use rangecore::series::{AlignedSample, Series};
use std::fs;
use std::path::Path;

const TIME_COLUMN: &str = "TIME";

pub fn render_records(records: &[MessageRecord], peer_count: usize) -> String {
    let mut out = MessageRecord::csv_header(peer_count);
    out.push('\n');
    for record in records {
        out.push_str(&record.to_csv_row());
        out.push('\n');
    }
    out
}

pub fn write_records(path: &Path, records: &[MessageRecord], peer_count: usize) -> anyhow::Result<()> {
    write_file(path, &render_records(records, peer_count))
}

/// Parses a reconstructed-records CSV, header included.
pub fn parse_records(text: &str) -> anyhow::Result<Vec<MessageRecord>> {
    text.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| MessageRecord::from_csv_row(line, idx + 1).map_err(anyhow::Error::from))
        .collect()
}

pub fn read_records(path: &Path) -> anyhow::Result<Vec<MessageRecord>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading records {}", path.display()))?;
    parse_records(&text).with_context(|| format!("parsing records {}", path.display()))
}

/// Aligned series joined on their common-valid times, one column per series
/// followed by the ground-truth column and `TIME`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangingLog {
    pub series_names: Vec<String>,
    pub truth_name: String,
    pub times: Vec<Timestamp>,
    pub columns: Vec<Vec<f64>>,
    pub truth: Vec<f64>,
}

impl RangingLog {
    pub fn from_aligned(rows: &[AlignedSample], series_names: &[String], truth_name: &str) -> Self {
        let columns = series_names
            .iter()
            .map(|name| {
                rows.iter()
                    .map(|row| row.value(name).unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();
        Self {
            series_names: series_names.to_vec(),
            truth_name: truth_name.to_string(),
            times: rows.iter().map(|row| row.system_time).collect(),
            columns,
            truth: rows
                .iter()
                .map(|row| row.value(truth_name).unwrap_or(f64::NAN))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.series_names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// A logged column as a series on the system-time base.
    pub fn series(&self, name: &str) -> Option<Series> {
        self.column(name)
            .map(|values| Series::from_pairs(name, self.times.iter().copied().zip(values.iter().copied())))
    }

    pub fn render(&self) -> String {
        let mut header: Vec<&str> = self.series_names.iter().map(String::as_str).collect();
        header.push(&self.truth_name);
        header.push(TIME_COLUMN);

        let mut out = header.join(",");
        out.push('\n');
        for (row, time) in self.times.iter().enumerate() {
            for column in &self.columns {
                out.push_str(&format!("{},", column[row]));
            }
            out.push_str(&format!("{},{}\n", self.truth[row], time));
        }
        out
    }

    /// Parses a rendered log. The column named `truth_name` becomes the
    /// ground truth, `TIME` the timestamps, the rest series in file order.
    pub fn parse(text: &str, truth_name: &str) -> anyhow::Result<Self> {
        let mut lines = text.lines().enumerate().filter(|(_, line)| !line.trim().is_empty());
        let Some((_, header)) = lines.next() else {
            bail!("ranging log is empty");
        };
        let header: Vec<&str> = header.split(',').map(str::trim).collect();
        let time_idx = header
            .iter()
            .position(|h| *h == TIME_COLUMN)
            .context("ranging log has no TIME column")?;
        let truth_idx = header
            .iter()
            .position(|h| *h == truth_name)
            .with_context(|| format!("ranging log has no {truth_name} column"))?;
        let series_idx: Vec<usize> = (0..header.len())
            .filter(|&i| i != time_idx && i != truth_idx)
            .collect();

        let mut log = Self {
            series_names: series_idx.iter().map(|&i| header[i].to_string()).collect(),
            truth_name: truth_name.to_string(),
            times: Vec::new(),
            columns: vec![Vec::new(); series_idx.len()],
            truth: Vec::new(),
        };

        for (idx, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != header.len() {
                bail!(
                    "line {}: expected {} fields, found {}",
                    idx + 1,
                    header.len(),
                    fields.len()
                );
            }
            let value = |i: usize| -> anyhow::Result<f64> {
                fields[i]
                    .parse()
                    .with_context(|| format!("line {}: bad value {:?}", idx + 1, fields[i]))
            };
            log.times.push(
                fields[time_idx]
                    .parse()
                    .with_context(|| format!("line {}: bad TIME {:?}", idx + 1, fields[time_idx]))?,
            );
            log.truth.push(value(truth_idx)?);
            for (column, &i) in log.columns.iter_mut().zip(&series_idx) {
                column.push(value(i)?);
            }
        }
        Ok(log)
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        write_file(path, &self.render())
    }

    pub fn read(path: &Path, truth_name: &str) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading ranging log {}", path.display()))?;
        Self::parse(&text, truth_name).with_context(|| format!("parsing ranging log {}", path.display()))
    }
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}
