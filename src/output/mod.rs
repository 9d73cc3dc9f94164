use crate::models::Evaluation;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Output handler for evaluations
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Jsonl, // Default
        }
    }
}

impl OutputHandler {
    /// Create a new output handler, appending to `file_path` or writing to stdout
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let writer: Option<Box<dyn Write + Send>> = match file_path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            None => None,
        };

        Ok(OutputHandler { format, writer })
    }

    /// Write an evaluation.
    ///
    /// `blocked` is the host's decision, if it made one; the engine itself
    /// never blocks.
    pub fn write_evaluation(
        &mut self,
        evaluation: &Evaluation,
        blocked: Option<bool>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&to_value(evaluation, blocked)?)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Jsonl => {
                let json = serde_json::to_string(&to_value(evaluation, blocked)?)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Console => {
                let output = console_line(evaluation, blocked);
                self.write_output(&output)?;
            }
        }
        Ok(())
    }

    fn write_output(&mut self, data: &str) -> Result<(), Box<dyn std::error::Error>> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                handle.write_all(data.as_bytes())?;
                handle.flush()?;
            }
        }
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

fn to_value(evaluation: &Evaluation, blocked: Option<bool>) -> Result<serde_json::Value, serde_json::Error> {
    let mut value = serde_json::to_value(evaluation)?;
    if let (Some(blocked), Some(map)) = (blocked, value.as_object_mut()) {
        map.insert("blocked".to_string(), serde_json::Value::Bool(blocked));
    }
    Ok(value)
}

fn console_line(evaluation: &Evaluation, blocked: Option<bool>) -> String {
    let record = &evaluation.record;
    let result = &evaluation.result;

    let mut output = format!(
        "[{}] User: {}, Network: {}, Country: {}, Score: {}",
        record.timestamp.to_rfc3339(),
        record.user_id,
        if record.masked_ip_prefix.is_empty() { "-" } else { &record.masked_ip_prefix },
        if record.country_code.is_empty() { "-" } else { &record.country_code },
        result.total_score
    );
    match blocked {
        Some(true) => output.push_str(" BLOCKED"),
        Some(false) => output.push_str(" allowed"),
        None => {}
    }
    output.push('\n');

    for violation in &result.violations {
        output.push_str(&format!(
            "    {} (+{}): {}\n",
            violation.rule_name, violation.score, violation.reason
        ));
    }
    output
}
