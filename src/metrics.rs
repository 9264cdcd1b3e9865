use crate::counters::TransmissionRoutes;
use crate::error::{Result, SimError};
use crate::intervention::Phase;
use csv::Writer;
use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRecord {
    pub run: usize,
    pub day: i32,
    pub infections: u64,
    pub new_infections: u64,
    pub current_infections: u64,
    pub deaths: u64,
    pub new_deaths: u64,
    pub tests: u64,
    pub new_tests: u64,
    pub infectious: u64,
    pub seroconversions: u64,
    pub quarantines: u64,
    pub town_new_infections: u64,
    pub village_new_infections: u64,
    pub town_rate: f64,
    pub village_rate: f64,
    pub overall_rate: f64,
    pub effective_town_population: f64,
    pub phase: Phase,
    #[serde(skip)]
    pub routes: TransmissionRoutes,
    #[serde(skip)]
    pub village_new: Vec<u64>,
    #[serde(skip)]
    pub village_cumulative: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run: usize,
    pub days: i32,
    pub realized_r0: f64,
    pub mean_time_to_death: f64,
    pub mean_time_to_recovery: f64,
    pub mean_time_to_test: f64,
    pub mean_time_to_seroconversion: f64,
    pub town_rate: f64,
    pub village_rate: f64,
    pub overall_rate: f64,
    pub infections: u64,
    pub deaths: u64,
    pub stopped_early: bool,
    pub doubling_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub runs: usize,
    pub true_r0_town: f64,
    pub true_r0_village: f64,
    pub mean_town_rate: f64,
    pub mean_village_rate: f64,
    pub mean_overall_rate: f64,
    /// Only over runs that stopped early.
    pub mean_infections_at_stop: Option<f64>,
    pub mean_deaths_at_stop: Option<f64>,
    pub mean_doubling_time: Option<f64>,
}

pub trait MetricsSink {
    fn record_day(&mut self, record: &DayRecord) -> Result<()>;
    fn record_run(&mut self, summary: &RunSummary) -> Result<()>;
    fn record_batch(&mut self, summary: &BatchSummary) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub days: Vec<DayRecord>,
    pub runs: Vec<RunSummary>,
    pub batch: Option<BatchSummary>,
}

impl MetricsSink for MemorySink {
    fn record_day(&mut self, record: &DayRecord) -> Result<()> {
        self.days.push(record.clone());
        Ok(())
    }

    fn record_run(&mut self, summary: &RunSummary) -> Result<()> {
        self.runs.push(summary.clone());
        Ok(())
    }

    fn record_batch(&mut self, summary: &BatchSummary) -> Result<()> {
        self.batch = Some(summary.clone());
        Ok(())
    }
}

pub struct CsvSink {
    daily: Writer<File>,
    villages: Writer<File>,
    villages_cumulative: Writer<File>,
    runs: Writer<File>,
    batch: Writer<File>,
    village_headers_written: bool,
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|e| SimError::io(parent, e))?;
    }
    File::create(path).map_err(|e| SimError::io(path, e))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl CsvSink {
    pub fn create(prefix: &Path) -> Result<CsvSink> {
        let open = |suffix: &str| -> Result<Writer<File>> {
            Ok(Writer::from_writer(create_file(&with_suffix(prefix, suffix))?))
        };
        Ok(CsvSink {
            daily: open("_daily.csv")?,
            villages: open("_villages.csv")?,
            villages_cumulative: open("_villages_cumulative.csv")?,
            runs: open("_runs.csv")?,
            batch: open("_batch.csv")?,
            village_headers_written: false,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        for writer in [
            &mut self.daily,
            &mut self.villages,
            &mut self.villages_cumulative,
            &mut self.runs,
            &mut self.batch,
        ] {
            writer.flush().map_err(|e| SimError::Csv(e.into()))?;
        }
        Ok(())
    }
}

impl MetricsSink for CsvSink {
    fn record_day(&mut self, record: &DayRecord) -> Result<()> {
        self.daily.serialize(record)?;

        if !self.village_headers_written {
            let villages = (0..record.village_new.len()).map(|k| format!("village_{}", k));
            let header: Vec<String> = ["run", "day", "town_rate", "village_rate", "town"]
                .iter()
                .map(|s| s.to_string())
                .chain(villages)
                .collect();
            self.villages.write_record(&header)?;
            self.villages_cumulative.write_record(&header)?;
            self.village_headers_written = true;
        }
        let leading = [
            record.run.to_string(),
            record.day.to_string(),
            format!("{:.4}", record.town_rate),
            format!("{:.4}", record.village_rate),
        ];
        let new_row = leading
            .iter()
            .cloned()
            .chain(std::iter::once(record.town_new_infections.to_string()))
            .chain(record.village_new.iter().map(u64::to_string));
        self.villages.write_record(new_row)?;
        let town_cumulative = record
            .infections
            .saturating_sub(record.village_cumulative.iter().sum::<u64>());
        let cumulative_row = leading
            .iter()
            .cloned()
            .chain(std::iter::once(town_cumulative.to_string()))
            .chain(record.village_cumulative.iter().map(u64::to_string));
        self.villages_cumulative.write_record(cumulative_row)?;
        Ok(())
    }

    fn record_run(&mut self, summary: &RunSummary) -> Result<()> {
        self.runs.serialize(summary)?;
        self.runs.flush().map_err(|e| SimError::Csv(e.into()))?;
        Ok(())
    }

    fn record_batch(&mut self, summary: &BatchSummary) -> Result<()> {
        self.batch.serialize(summary)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_record(run: usize, day: i32) -> DayRecord {
        DayRecord {
            run,
            day,
            infections: 12,
            new_infections: 2,
            current_infections: 10,
            deaths: 0,
            new_deaths: 0,
            tests: 1,
            new_tests: 1,
            infectious: 4,
            seroconversions: 0,
            quarantines: 1,
            town_new_infections: 1,
            village_new_infections: 1,
            town_rate: 0.5,
            village_rate: 0.25,
            overall_rate: 0.375,
            effective_town_population: 1000.,
            phase: Phase::Normal,
            routes: TransmissionRoutes::default(),
            village_new: vec![1, 0],
            village_cumulative: vec![3, 1],
        }
    }

    fn run_summary(run: usize) -> RunSummary {
        RunSummary {
            run,
            days: 2,
            realized_r0: 2.0,
            mean_time_to_death: 0.,
            mean_time_to_recovery: 20.,
            mean_time_to_test: 12.,
            mean_time_to_seroconversion: 14.,
            town_rate: 0.5,
            village_rate: 0.25,
            overall_rate: 0.375,
            infections: 12,
            deaths: 0,
            stopped_early: false,
            doubling_time: None,
        }
    }

    #[test]
    fn memory_sink_keeps_order() {
        let mut sink = MemorySink::default();
        sink.record_day(&day_record(0, 0)).unwrap();
        sink.record_day(&day_record(0, 1)).unwrap();
        sink.record_run(&run_summary(0)).unwrap();
        assert_eq!(sink.days.iter().map(|d| d.day).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(sink.runs.len(), 1);
        assert!(sink.batch.is_none());
    }

    #[test]
    fn csv_sink_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("nested").join("out");
        let mut sink = CsvSink::create(&prefix).unwrap();
        sink.record_day(&day_record(0, 0)).unwrap();
        sink.record_day(&day_record(0, 1)).unwrap();
        sink.record_run(&run_summary(0)).unwrap();
        sink.record_batch(&BatchSummary {
            runs: 1,
            true_r0_town: 5.,
            true_r0_village: 2.8,
            mean_town_rate: 0.5,
            mean_village_rate: 0.25,
            mean_overall_rate: 0.375,
            mean_infections_at_stop: None,
            mean_deaths_at_stop: None,
            mean_doubling_time: None,
        })
        .unwrap();

        let daily = std::fs::read_to_string(with_suffix(&prefix, "_daily.csv")).unwrap();
        let mut lines = daily.lines();
        assert!(lines.next().unwrap().starts_with("run,day,infections,new_infections"));
        assert_eq!(lines.count(), 2);

        let villages = std::fs::read_to_string(with_suffix(&prefix, "_villages.csv")).unwrap();
        let lines: Vec<_> = villages.lines().collect();
        assert_eq!(lines[0], "run,day,town_rate,village_rate,town,village_0,village_1");
        assert_eq!(lines[1], "0,0,0.5000,0.2500,1,1,0");

        let cumulative =
            std::fs::read_to_string(with_suffix(&prefix, "_villages_cumulative.csv")).unwrap();
        assert_eq!(cumulative.lines().nth(2), Some("0,1,0.5000,0.2500,8,3,1"));

        let mut reader = csv::Reader::from_path(with_suffix(&prefix, "_runs.csv")).unwrap();
        assert_eq!(reader.records().count(), 1);
        assert!(with_suffix(&prefix, "_batch.csv").exists());
    }

    #[test]
    fn unwritable_prefix_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let result = CsvSink::create(&blocker.join("out"));
        assert!(matches!(result, Err(SimError::Io { .. })));
    }
}
