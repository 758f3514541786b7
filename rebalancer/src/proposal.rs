//! Allocation proposal sources.
//!
//! A proposer turns a [`ProposalRequest`] into raw proposal text. The text is
//! untrusted; the cycle validates it with [`alphabook::ingest_proposal`].

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use alphabook::ProposalRequest;
use log::debug;

use crate::config::{ProposalConfig, ProposalSource};
use crate::error::{Error, Result};

/// External allocation-proposal collaborator.
pub trait AllocationProposer {
    fn propose(&self, request: &ProposalRequest) -> Result<String>;
}

/// Reads a proposal JSON file written by an external agent.
///
/// The request is ignored; the agent is expected to have produced the file
/// from its own copy of the inputs.
#[derive(Debug, Clone)]
pub struct FileProposer {
    path: PathBuf,
}

impl FileProposer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AllocationProposer for FileProposer {
    fn propose(&self, _request: &ProposalRequest) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Proposal(format!("cannot read {}: {e}", self.path.display())))
    }
}

/// Runs a command with the request JSON on stdin and reads the proposal
/// from stdout.
#[derive(Debug, Clone)]
pub struct CommandProposer {
    program: String,
    args: Vec<String>,
}

impl CommandProposer {
    /// `argv[0]` is the program. Fails on an empty argv.
    pub fn new(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Proposal("empty proposal command".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AllocationProposer for CommandProposer {
    fn propose(&self, request: &ProposalRequest) -> Result<String> {
        let input = serde_json::to_vec(request)?;
        debug!("Running proposer {} ({} byte request)", self.program, input.len());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Proposal(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .map_err(|e| Error::Proposal(format!("failed to write request: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Proposal(format!("{} did not finish: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Proposal(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| Error::Proposal(format!("proposal is not UTF-8: {e}")))
    }
}

/// Build the proposer named by the config.
pub fn from_config(config: &ProposalConfig) -> Result<Box<dyn AllocationProposer>> {
    match config.source {
        ProposalSource::File => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| Error::Config("proposal.path is not set".into()))?;
            Ok(Box::new(FileProposer::new(path)))
        }
        ProposalSource::Command => Ok(Box::new(CommandProposer::new(&config.command)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphabook::proposal::ProposalConstraints;
    use chrono::{TimeZone, Utc};

    fn request() -> ProposalRequest {
        ProposalRequest::new(
            Utc.with_ymd_and_hms(2026, 3, 4, 16, 50, 0).unwrap(),
            Vec::new(),
            ProposalConstraints {
                max_positions: 3,
                max_weight: 0.4,
            },
            "No prior episodes.".into(),
        )
    }

    #[test]
    fn file_proposer_reads_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proposal.json");
        std::fs::write(&path, r#"{"asof":"x","picks":[]}"#).unwrap();
        let text = FileProposer::new(&path).propose(&request()).unwrap();
        assert!(text.contains("picks"));
    }

    #[test]
    fn file_proposer_missing_file() {
        let err = FileProposer::new("/nonexistent/proposal.json")
            .propose(&request())
            .unwrap_err();
        assert!(matches!(err, Error::Proposal(_)));
    }

    #[test]
    fn command_requires_program() {
        assert!(CommandProposer::new(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_proposer_pipes_request() {
        // `cat` echoes the request back, so the output is the request JSON.
        let proposer = CommandProposer::new(&["cat".to_string()]).unwrap();
        let text = proposer.propose(&request()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["max_positions"], 3);
        assert_eq!(v["memory_context"], "No prior episodes.");
    }

    #[cfg(unix)]
    #[test]
    fn command_proposer_failure_exit() {
        let proposer = CommandProposer::new(&["false".to_string()]).unwrap();
        assert!(matches!(
            proposer.propose(&request()),
            Err(Error::Proposal(_))
        ));
    }
}
