use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::RunSummary;
use crate::schema::FileValidation;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub files: Vec<FileValidation>,
    pub rows: usize,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_validation(summary: &ValidationSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
