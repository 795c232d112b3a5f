//! Run artifacts
//!
//! Each processing run gets its own scratch directory holding the
//! gzip-compressed CSV exports and the rendered step chart. The directory
//! is a [`tempfile::TempDir`], so it is deleted when the store drops, on
//! every exit path. Callers that want to keep the files persist copies
//! first.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::{RollupSet, RollupTable, StepSeries};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Scratch directory for one run's exports.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: TempDir,
    run_id: Uuid,
    written: Vec<PathBuf>,
}

impl ArtifactStore {
    pub fn create() -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new().prefix("stepflow-").tempdir()?;
        Ok(ArtifactStore {
            dir,
            run_id: Uuid::new_v4(),
            written: Vec::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Files written so far, in write order.
    pub fn files(&self) -> &[PathBuf] {
        &self.written
    }

    /// `Steps.csv.gz`: the per-window step series. Undecided windows
    /// export with an empty count.
    pub fn write_steps(&mut self, steps: &StepSeries) -> Result<(), PipelineError> {
        let path = self.dir.path().join("Steps.csv.gz");
        write_gz_csv(&path, |writer| {
            writer.write_record(["time", "Steps"])?;
            for point in steps.iter() {
                writer.write_record([
                    point.time.format(TIME_FORMAT).to_string(),
                    point.steps.map(|s| s.to_string()).unwrap_or_default(),
                ])?;
            }
            Ok(())
        })?;
        self.written.push(path);
        Ok(())
    }

    /// `StepTimes.csv.gz`: one row per detected step event.
    pub fn write_step_times(&mut self, times: &[DateTime<Utc>]) -> Result<(), PipelineError> {
        let path = self.dir.path().join("StepTimes.csv.gz");
        write_gz_csv(&path, |writer| {
            writer.write_record(["time"])?;
            for time in times {
                writer.write_record([time.format(TIME_FORMAT).to_string()])?;
            }
            Ok(())
        })?;
        self.written.push(path);
        Ok(())
    }

    /// `Minutely.csv.gz`, `Hourly.csv.gz` and `Daily.csv.gz`.
    pub fn write_rollups(&mut self, rollups: &RollupSet) -> Result<(), PipelineError> {
        self.write_rollup_table(&rollups.minutely, "Minutely.csv.gz")?;
        self.write_rollup_table(&rollups.hourly, "Hourly.csv.gz")?;
        self.write_rollup_table(&rollups.daily, "Daily.csv.gz")
    }

    fn write_rollup_table(
        &mut self,
        table: &RollupTable,
        name: &str,
    ) -> Result<(), PipelineError> {
        let path = self.dir.path().join(name);
        write_gz_csv(&path, |writer| {
            writer.write_record(["time", "Steps", "ENMO(mg)"])?;
            for row in &table.rows {
                writer.write_record([
                    row.start.format(TIME_FORMAT).to_string(),
                    row.steps.to_string(),
                    row.enmo.to_string(),
                ])?;
            }
            Ok(())
        })?;
        self.written.push(path);
        Ok(())
    }

    /// `Steps.svg`: the step series rendered as a simple line chart.
    pub fn write_chart(&mut self, steps: &StepSeries) -> Result<(), PipelineError> {
        let path = self.dir.path().join("Steps.svg");
        let svg = render_steps_svg(steps);
        fs::write(&path, svg)?;
        self.written.push(path);
        Ok(())
    }

    /// Copies every written file into `dest`, creating it if needed.
    /// Returns the destination paths.
    pub fn persist_to(&self, dest: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        fs::create_dir_all(dest)?;
        let mut persisted = Vec::with_capacity(self.written.len());
        for file in &self.written {
            if let Some(name) = file.file_name() {
                let target = dest.join(name);
                fs::copy(file, &target)?;
                persisted.push(target);
            }
        }
        Ok(persisted)
    }
}

fn write_gz_csv<F>(path: &Path, write_rows: F) -> Result<(), PipelineError>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> Result<(), csv::Error>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut writer)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&bytes)?;
    encoder.finish()?;
    Ok(())
}

const CHART_WIDTH: f64 = 900.0;
const CHART_HEIGHT: f64 = 300.0;
const MARGIN: f64 = 40.0;

/// Renders the step series as a standalone SVG line chart.
fn render_steps_svg(steps: &StepSeries) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" \
         viewBox=\"0 0 {w} {h}\">\n",
        w = CHART_WIDTH,
        h = CHART_HEIGHT
    ));
    svg.push_str(&format!(
        "  <text x=\"{}\" y=\"24\" text-anchor=\"middle\" font-family=\"sans-serif\" \
         font-size=\"16\">Step Count Analysis</text>\n",
        CHART_WIDTH / 2.0
    ));

    let plot_w = CHART_WIDTH - 2.0 * MARGIN;
    let plot_h = CHART_HEIGHT - 2.0 * MARGIN;
    // axes
    svg.push_str(&format!(
        "  <line x1=\"{m}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"black\"/>\n  \
         <line x1=\"{m}\" y1=\"{t}\" x2=\"{m}\" y2=\"{b}\" stroke=\"black\"/>\n",
        m = MARGIN,
        t = MARGIN,
        b = CHART_HEIGHT - MARGIN,
        r = CHART_WIDTH - MARGIN
    ));

    let decided: Vec<(usize, f64)> = steps
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.steps.map(|s| (i, s)))
        .collect();
    if !decided.is_empty() {
        let max_steps = decided.iter().map(|(_, s)| *s).fold(1.0_f64, f64::max);
        let span = (steps.len().saturating_sub(1)).max(1) as f64;
        let points: Vec<String> = decided
            .iter()
            .map(|(i, s)| {
                let x = MARGIN + *i as f64 / span * plot_w;
                let y = CHART_HEIGHT - MARGIN - s / max_steps * plot_h;
                format!("{x:.1},{y:.1}")
            })
            .collect();
        svg.push_str(&format!(
            "  <polyline points=\"{}\" fill=\"none\" stroke=\"steelblue\" stroke-width=\"1.5\"/>\n",
            points.join(" ")
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" text-anchor=\"end\" font-family=\"sans-serif\" \
             font-size=\"11\">{}</text>\n",
            MARGIN - 6.0,
            MARGIN + 4.0,
            max_steps
        ));
    }

    if let (Some(first), Some(last)) = (steps.points.first(), steps.points.last()) {
        svg.push_str(&format!(
            "  <text x=\"{m}\" y=\"{y}\" font-family=\"sans-serif\" font-size=\"11\">{}</text>\n  \
             <text x=\"{r}\" y=\"{y}\" text-anchor=\"end\" font-family=\"sans-serif\" \
             font-size=\"11\">{}</text>\n",
            first.time.format("%Y-%m-%d %H:%M"),
            last.time.format("%Y-%m-%d %H:%M"),
            m = MARGIN,
            r = CHART_WIDTH - MARGIN,
            y = CHART_HEIGHT - MARGIN + 16.0
        ));
    }

    svg.push_str("</svg>\n");
    svg
}
