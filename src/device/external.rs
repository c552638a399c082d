//! External device implementation for GPU and other out-of-process hashers
//!
//! Runs the configured command once per batch. The command receives four
//! extra arguments: header hex, nonce start, target hex (big-endian) and batch
//! width. The first whitespace-separated token on stdout is the result nonce in
//! decimal, zero meaning no solution. A non-zero exit status is a device
//! failure carrying that status.

use super::{BatchDevice, BatchOutcome};
use crate::types::HEADER_SIZE;
use crate::{Error, Result, Target};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Status reported when the process could not be run or gave no exit code
const UNKNOWN_STATUS: i32 = -1;

/// External device that executes a hashing command per batch
pub struct ExternalDevice {
    command: String,
}

impl ExternalDevice {
    /// Create a new external device with the specified command
    pub fn new(command: String) -> Self {
        info!("Creating external device with command: {}", command);

        Self { command }
    }

    /// Parse the command into program and arguments
    fn parse_command(&self) -> Result<(String, Vec<String>)> {
        let mut parts = self.command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::device(self.name(), UNKNOWN_STATUS, "No command specified"))?;

        Ok((program, parts.collect()))
    }

    /// Read the result nonce from the command output
    fn parse_output(&self, stdout: &[u8]) -> Result<BatchOutcome> {
        let output = String::from_utf8_lossy(stdout);
        let token = output.split_whitespace().next().ok_or_else(|| {
            Error::device(self.name(), UNKNOWN_STATUS, "External device produced no output")
        })?;

        let raw: u32 = token.parse().map_err(|e| {
            Error::device(
                self.name(),
                UNKNOWN_STATUS,
                format!("Invalid result '{}' from external device: {}", token, e),
            )
        })?;

        Ok(BatchOutcome::from_raw(raw))
    }
}

impl BatchDevice for ExternalDevice {
    fn name(&self) -> &'static str {
        "external"
    }

    fn scan(
        &self,
        header: &[u8; HEADER_SIZE],
        nonce_start: u32,
        target: &Target,
        batch_width: u32,
    ) -> Result<BatchOutcome> {
        let (program, mut args) = self.parse_command()?;
        args.push(hex::encode(header));
        args.push(nonce_start.to_string());
        args.push(target.to_hex_be());
        args.push(batch_width.to_string());

        debug!("Executing external device: {} {:?}", program, args);

        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::device(
                    self.name(),
                    UNKNOWN_STATUS,
                    format!("Failed to spawn '{}': {}", program, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::device(
                self.name(),
                output.status.code().unwrap_or(UNKNOWN_STATUS),
                stderr.trim().to_string(),
            ));
        }

        self.parse_output(&output.stdout)
    }
}
