//! Blocking wrappers around the external tools the pipeline shells out to.
use log::{debug, info};
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::_files::ensure_exists;
use crate::error::{MbError, Result};

pub const CUTADAPT_TAG: &str = "cutadapt";
pub const QIIME_TAG: &str = "qiime";

/// Lines of stderr kept in a `ToolFailed` error.
const STDERR_TAIL: usize = 20;

/// An executable on `PATH` (or at an explicit path) and the flag that prints its version.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: &'static str,
    pub program: PathBuf,
    pub version_flag: &'static str,
}

impl Tool {
    pub fn new(name: &'static str, program: Option<PathBuf>, version_flag: &'static str) -> Self {
        Tool {
            name,
            program: program.unwrap_or_else(|| PathBuf::from(name)),
            version_flag,
        }
    }

    pub fn cutadapt(program: Option<PathBuf>) -> Self {
        Tool::new(CUTADAPT_TAG, program, "--version")
    }

    pub fn qiime(program: Option<PathBuf>) -> Self {
        Tool::new(QIIME_TAG, program, "--version")
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).stdin(Stdio::null());
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> MbError {
        MbError::ToolSpawn {
            tool: self.name.to_owned(),
            source,
        }
    }

    /// Run the version flag and return the first line the tool prints.
    pub fn presence_check(&self) -> Result<String> {
        let output = self
            .command([self.version_flag])
            .output()
            .map_err(|e| self.spawn_error(e))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let version = stdout
            .lines()
            .chain(stderr.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .to_owned();
        debug!("{} version: {}", self.name, version);
        Ok(version)
    }

    /// Run to completion. stdout is discarded, stderr is kept for the error on a non-zero exit.
    pub fn run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args);
        debug!("Running {:?}", cmd);
        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
        Err(MbError::ToolFailed {
            tool: self.name.to_owned(),
            status: output.status,
            stderr: tail,
        })
    }
}

pub const QIIME_ARTIFACT: &str = "imported_demux_paired_end.qza";

pub struct ImportArgs {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub semantic_type: String,
    pub input_format: String,
    pub qiime: Option<PathBuf>,
}

fn import_args(args: &ImportArgs, artifact: &Path) -> Vec<std::ffi::OsString> {
    let mut v: Vec<std::ffi::OsString> = Vec::new();
    v.push("tools".into());
    v.push("import".into());
    v.push("--type".into());
    v.push(args.semantic_type.as_str().into());
    v.push("--input-path".into());
    v.push(args.input.as_os_str().into());
    v.push("--output-path".into());
    v.push(artifact.as_os_str().into());
    v.push("--input-format".into());
    v.push(args.input_format.as_str().into());
    v
}

/// Import a directory of demultiplexed CASAVA reads into a QIIME artifact.
pub fn qiime_import(args: ImportArgs) -> Result<PathBuf> {
    ensure_exists(&args.input)?;
    let qiime = Tool::qiime(args.qiime.clone());
    qiime.presence_check()?;
    fs::create_dir_all(&args.output_dir)?;
    let artifact = args.output_dir.join(QIIME_ARTIFACT);
    info!("Importing {:?} as {}", args.input, args.semantic_type);
    qiime.run(import_args(&args, &artifact))?;
    info!("Wrote {:?}", artifact);
    Ok(artifact)
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script into `dir`.
    pub(crate) fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_presence_check_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let prog = fake_tool(dir.path(), "cutadapt", "echo 4.4\necho extra");
        assert_eq!(Tool::cutadapt(Some(prog)).presence_check().unwrap(), "4.4");
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Tool::cutadapt(Some(dir.path().join("does-not-exist")));
        let err = tool.presence_check().err().unwrap();
        assert!(matches!(err, MbError::ToolSpawn { .. }));
        assert!(err.to_string().contains("Is cutadapt installed?"));
    }

    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let prog = fake_tool(dir.path(), "cutadapt", "echo 'bad adapter' >&2\nexit 3");
        let err = Tool::cutadapt(Some(prog)).run(["-g", "ACGT"]).err().unwrap();
        match err {
            MbError::ToolFailed { tool, status, stderr } => {
                assert_eq!(tool, "cutadapt");
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "bad adapter");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_qiime_import_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.txt");
        let prog = fake_tool(
            dir.path(),
            "qiime",
            &format!("echo \"$@\" >> {}", log.display()),
        );
        let input = dir.path().join("reads");
        fs::create_dir(&input).unwrap();
        let out = dir.path().join("qiime_out");
        let artifact = qiime_import(ImportArgs {
            input: input.clone(),
            output_dir: out.clone(),
            semantic_type: "SampleData[PairedEndSequencesWithQuality]".to_owned(),
            input_format: "CasavaOneEightSingleLanePerSampleDirFmt".to_owned(),
            qiime: Some(prog),
        })
        .unwrap();
        assert_eq!(artifact, out.join(QIIME_ARTIFACT));
        assert!(out.is_dir());
        let calls = fs::read_to_string(log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines[0], "--version");
        assert_eq!(
            lines[1],
            format!(
                "tools import --type SampleData[PairedEndSequencesWithQuality] --input-path {} --output-path {} --input-format CasavaOneEightSingleLanePerSampleDirFmt",
                input.display(),
                artifact.display()
            )
        );
    }
}
