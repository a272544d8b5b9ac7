use std::io::{self, Write};

use serde::Serialize;

use crate::gallery::GalleryBatch;
use crate::pipeline::{CycleOutcome, PipelineStatus};
use crate::scheduler::SchedulerSummary;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_cycle(outcome: &CycleOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_summary(summary: &SchedulerSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_gallery(batches: &[GalleryBatch]) -> io::Result<()> {
        Self::print_json(batches)
    }

    pub fn print_status(status: &PipelineStatus) -> io::Result<()> {
        Self::print_json(status)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
