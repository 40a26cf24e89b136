//! `Measurer` backed by an external instrumented test runner
//!
//! For every VM the configured command is started once per version, old
//! version first. It receives in its environment:
//!
//! - `PERFCAUSE_VERSION`: version to run
//! - `PERFCAUSE_TEST_CASE`: `Class#method`
//! - `PERFCAUSE_PATTERNS_FILE`: file listing one trace pattern per line
//! - `PERFCAUSE_RECORDS_FILE`: file the command writes its records to
//!
//! Records are JSON lines `{"pattern": "...", "tin": <ns>, "tout": <ns>}`.
//! Each record's duration is appended, in microseconds, to every selected
//! node of that version whose pattern matches.

use crate::call_tree::{CallTreePair, NodeId, Side};
use crate::config::{CommandConfig, MeasurementConfig, TestCase};
use crate::error::MeasurementError;
use crate::searcher::Measurer;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const ENV_VERSION: &str = "PERFCAUSE_VERSION";
pub const ENV_TEST_CASE: &str = "PERFCAUSE_TEST_CASE";
pub const ENV_PATTERNS_FILE: &str = "PERFCAUSE_PATTERNS_FILE";
pub const ENV_RECORDS_FILE: &str = "PERFCAUSE_RECORDS_FILE";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

type MeasureResult<T> = std::result::Result<T, MeasurementError>;

/// One timed call as written by the instrumented run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DurationRecord {
    pub pattern: String,
    /// Entry time in nanoseconds
    pub tin: u64,
    /// Exit time in nanoseconds
    pub tout: u64,
}

impl DurationRecord {
    pub fn duration_micros(&self) -> MeasureResult<u64> {
        self.tout
            .checked_sub(self.tin)
            .map(|nanos| nanos / 1000)
            .ok_or_else(|| {
                MeasurementError::InvalidRecord(format!(
                    "{} exits at {} before it enters at {}",
                    self.pattern, self.tout, self.tin
                ))
            })
    }
}

/// Parse a JSON-lines record file; blank lines are ignored
pub fn parse_records(content: &str) -> MeasureResult<Vec<DurationRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                MeasurementError::InvalidRecord(format!("line {}: {}", index + 1, e))
            })
        })
        .collect()
}

pub struct CommandMeasurer {
    command: CommandConfig,
    vms: usize,
    timeout: Duration,
}

impl CommandMeasurer {
    pub fn new(command: CommandConfig, measurement: &MeasurementConfig) -> Self {
        Self {
            command,
            vms: measurement.vms,
            timeout: Duration::from_secs(measurement.timeout_secs),
        }
    }

    /// Run the command once and return its records
    fn run_once(
        &self,
        version: &str,
        vm: usize,
        test_case: &TestCase,
        patterns: &[String],
    ) -> MeasureResult<Vec<DurationRecord>> {
        let workdir = TempDir::new()?;
        let patterns_file = workdir.path().join("patterns.txt");
        let records_file = workdir.path().join("records.jsonl");
        let stderr_file = workdir.path().join("stderr.log");
        fs::write(&patterns_file, patterns.join("\n"))?;

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .env(ENV_VERSION, version)
            .env(ENV_TEST_CASE, test_case.to_string())
            .env(ENV_PATTERNS_FILE, &patterns_file)
            .env(ENV_RECORDS_FILE, &records_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(File::create(&stderr_file)?));
        if let Some(dir) = &self.command.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| MeasurementError::Launch {
            program: self.command.program.clone(),
            source,
        })?;

        // A timeout beyond what `Instant` can represent never expires
        let deadline = Instant::now().checked_add(self.timeout);
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if deadline.is_some_and(|deadline| Instant::now() >= deadline) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MeasurementError::Timeout {
                        version: version.to_string(),
                        vm,
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        // No exit code: the run was terminated by a signal
        if status.code().is_none() {
            return Err(MeasurementError::Crashed(format!(
                "run {} of {}: {}",
                vm,
                version,
                describe_failure(&status.to_string(), &stderr_file)
            )));
        }

        if !status.success() {
            return Err(MeasurementError::ExitStatus {
                version: version.to_string(),
                vm,
                status: describe_failure(&status.to_string(), &stderr_file),
            });
        }

        let content = fs::read_to_string(&records_file).map_err(|e| {
            MeasurementError::InvalidRecord(format!(
                "run {} of {} left no readable record file: {}",
                vm, version, e
            ))
        })?;
        parse_records(&content)
    }
}

impl Measurer for CommandMeasurer {
    fn measure(
        &self,
        pair: &mut CallTreePair,
        nodes: &[NodeId],
        test_case: &TestCase,
    ) -> MeasureResult<()> {
        for vm in 0..self.vms {
            for side in [Side::Old, Side::New] {
                let version = pair.tree(side).version().to_string();

                let mut by_pattern: HashMap<String, Vec<NodeId>> = HashMap::new();
                for &id in nodes {
                    if let Some(pattern) = pair.pattern(id, side) {
                        by_pattern.entry(pattern.to_string()).or_default().push(id);
                    }
                }
                if by_pattern.is_empty() {
                    continue;
                }

                let mut patterns: Vec<String> = by_pattern.keys().cloned().collect();
                patterns.sort();
                let records = self.run_once(&version, vm, test_case, &patterns)?;

                for ids in by_pattern.values() {
                    for &id in ids {
                        pair.new_vm(id, side);
                    }
                }

                let mut matched = 0usize;
                for record in &records {
                    let Some(ids) = by_pattern.get(&record.pattern) else {
                        continue;
                    };
                    let duration = record.duration_micros()?;
                    for &id in ids {
                        pair.add_measurement(id, side, duration);
                    }
                    matched += 1;
                }

                tracing::debug!(
                    "Run {} of {}: {} records, {} matched selected calls",
                    vm,
                    version,
                    records.len(),
                    matched
                );
            }
        }
        Ok(())
    }
}

fn describe_failure(status: &str, stderr_file: &Path) -> String {
    let last_line = fs::read_to_string(stderr_file)
        .ok()
        .and_then(|stderr| stderr.lines().rev().find(|l| !l.trim().is_empty()).map(str::to_string));
    match last_line {
        Some(line) => format!("{}: {}", status, line),
        None => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_tree::CallTree;

    #[test]
    fn test_parse_records() {
        let records = parse_records(
            r#"{"pattern": "A#a", "tin": 1000, "tout": 501000}

{"pattern": "B#b", "tin": 0, "tout": 999}"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].duration_micros().unwrap(), 500);
        assert_eq!(records[1].duration_micros().unwrap(), 0);
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        match parse_records("{\"pattern\": \"A#a\"}") {
            Err(MeasurementError::InvalidRecord(reason)) => assert!(reason.starts_with("line 1")),
            other => panic!("Expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_reversed_timestamps_are_rejected() {
        let record = DurationRecord {
            pattern: "A#a".to_string(),
            tin: 10,
            tout: 5,
        };
        assert!(record.duration_micros().is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        const SCRIPT: &str = r#"
if [ "$PERFCAUSE_VERSION" = "v2" ]; then d=2000000; else d=1000000; fi
while read -r p || [ -n "$p" ]; do
  echo "{\"pattern\":\"$p\",\"tin\":0,\"tout\":$d}" >> "$PERFCAUSE_RECORDS_FILE"
done < "$PERFCAUSE_PATTERNS_FILE"
"#;

        fn script_command(dir: &TempDir, body: &str) -> CommandConfig {
            let script = dir.path().join("run.sh");
            fs::write(&script, body).unwrap();
            CommandConfig {
                program: "/bin/sh".to_string(),
                args: vec![script.display().to_string()],
                working_dir: None,
            }
        }

        fn pair() -> CallTreePair {
            let old = CallTree::new("v1", "Test#test", "Test.test()");
            let mut new = CallTree::new("v2", "Test#test", "Test.test()");
            new.add_child(new.root(), "X#x", "X.x()");
            CallTreePair::pair(old, new, true).unwrap()
        }

        #[test]
        fn test_command_samples_both_versions() {
            let dir = TempDir::new().unwrap();
            let measurement = MeasurementConfig::new("v2", "v1").with_vms(3);
            let measurer = CommandMeasurer::new(script_command(&dir, SCRIPT), &measurement);
            let mut pair = pair();
            let root = pair.root();
            let added = pair.children(root)[0];

            measurer
                .measure(&mut pair, &[root, added], &TestCase::new("Test", "test"))
                .unwrap();

            assert_eq!(pair.statistics(root, Side::Old).n, 3);
            assert_eq!(pair.statistics(root, Side::Old).mean, 1000.0);
            assert_eq!(pair.statistics(root, Side::New).mean, 2000.0);
            assert_eq!(pair.statistics(added, Side::Old).n, 0);
            assert_eq!(pair.statistics(added, Side::New).n, 3);
        }

        #[test]
        fn test_failing_command_is_an_error() {
            let dir = TempDir::new().unwrap();
            let measurement = MeasurementConfig::new("v2", "v1").with_vms(2);
            let command = script_command(&dir, "echo 'instrumentation failed' >&2\nexit 3\n");
            let measurer = CommandMeasurer::new(command, &measurement);
            let mut pair = pair();
            let root = pair.root();

            match measurer.measure(&mut pair, &[root], &TestCase::new("Test", "test")) {
                Err(MeasurementError::ExitStatus { version, vm, status }) => {
                    assert_eq!(version, "v1");
                    assert_eq!(vm, 0);
                    assert!(status.contains("instrumentation failed"));
                }
                other => panic!("Expected ExitStatus, got {:?}", other),
            }
        }

        #[test]
        fn test_killed_command_is_a_crash() {
            let dir = TempDir::new().unwrap();
            let measurement = MeasurementConfig::new("v2", "v1").with_vms(2);
            let command = script_command(&dir, "echo 'fatal error in target' >&2\nkill -SEGV $$\n");
            let measurer = CommandMeasurer::new(command, &measurement);
            let mut pair = pair();
            let root = pair.root();

            match measurer.measure(&mut pair, &[root], &TestCase::new("Test", "test")) {
                Err(MeasurementError::Crashed(reason)) => {
                    assert!(reason.contains("run 0 of v1"));
                    assert!(reason.contains("fatal error in target"));
                }
                other => panic!("Expected Crashed, got {:?}", other),
            }
        }

        #[test]
        fn test_missing_record_file_is_an_error() {
            let dir = TempDir::new().unwrap();
            let measurement = MeasurementConfig::new("v2", "v1").with_vms(2);
            let measurer = CommandMeasurer::new(script_command(&dir, "exit 0\n"), &measurement);
            let mut pair = pair();
            let root = pair.root();

            assert!(matches!(
                measurer.measure(&mut pair, &[root], &TestCase::new("Test", "test")),
                Err(MeasurementError::InvalidRecord(_))
            ));
        }

        #[test]
        fn test_slow_command_times_out() {
            let dir = TempDir::new().unwrap();
            let mut measurement = MeasurementConfig::new("v2", "v1").with_vms(2);
            measurement.timeout_secs = 1;
            let measurer = CommandMeasurer::new(script_command(&dir, "sleep 5\n"), &measurement);
            let mut pair = pair();
            let root = pair.root();

            assert!(matches!(
                measurer.measure(&mut pair, &[root], &TestCase::new("Test", "test")),
                Err(MeasurementError::Timeout { timeout_secs: 1, .. })
            ));
        }

        #[test]
        fn test_huge_timeout_means_no_deadline() {
            let dir = TempDir::new().unwrap();
            let mut measurement = MeasurementConfig::new("v2", "v1").with_vms(1);
            measurement.timeout_secs = i64::MAX as u64;
            assert!(measurement.validate().is_ok());
            let measurer = CommandMeasurer::new(script_command(&dir, SCRIPT), &measurement);
            let mut pair = pair();
            let root = pair.root();

            measurer
                .measure(&mut pair, &[root], &TestCase::new("Test", "test"))
                .unwrap();
            assert_eq!(pair.statistics(root, Side::New).mean, 2000.0);
        }

        #[test]
        fn test_missing_program_fails_to_launch() {
            let measurement = MeasurementConfig::new("v2", "v1").with_vms(2);
            let command = CommandConfig {
                program: "/nonexistent/perfcause-runner".to_string(),
                args: Vec::new(),
                working_dir: None,
            };
            let measurer = CommandMeasurer::new(command, &measurement);
            let mut pair = pair();
            let root = pair.root();

            assert!(matches!(
                measurer.measure(&mut pair, &[root], &TestCase::new("Test", "test")),
                Err(MeasurementError::Launch { .. })
            ));
        }
    }
}
