use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::config::PublishConfig;
use crate::error::{Result, TrainError};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CopyCommand {
    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            program: config.copy_program.clone(),
            args: config.copy_args.clone(),
        }
    }

    pub fn argv(&self, source: &str, destination: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv.push(source.to_string());
        argv.push(destination.to_string());
        argv
    }

    /// Runs the copy with its stderr folded into our stdout. Relative
    /// sources resolve against `working_dir` when one is given.
    pub fn run(&self, source: &str, destination: &str, working_dir: Option<&Path>) -> Result<()> {
        let argv = self.argv(source, destination);
        info!(command = %argv.join(" "), "running copy command");
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).stderr(Stdio::from(io::stdout()));
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        let status = command
            .status()
            .map_err(|err| TrainError::Publish(format!("failed to run {}: {}", self.program, err)))?;

        if !status.success() {
            return Err(TrainError::Publish(format!(
                "command {:?} failed with {}",
                argv, status
            )));
        }
        Ok(())
    }
}

pub fn remote_path(job_dir: &str, filename: &str) -> String {
    format!("{}/{}", job_dir.trim_end_matches('/'), filename)
}

pub fn local_model_path(config: &PublishConfig) -> PathBuf {
    match config.local_dir.as_ref() {
        Some(dir) => dir.join(&config.model_filename),
        None => PathBuf::from(&config.model_filename),
    }
}

/// Serializes `pipeline` into `local_dir` (or the working directory) and
/// copies it to `<job_dir>/<model_filename>`. Returns the remote path.
pub fn publish_model(pipeline: &Pipeline, job_dir: &str, config: &PublishConfig) -> Result<String> {
    let local_path = local_model_path(config);
    pipeline.save(&local_path)?;

    let bytes = std::fs::read(&local_path).map_err(|err| {
        TrainError::Publish(format!("failed to read back {}: {}", local_path.display(), err))
    })?;
    info!(
        path = %local_path.display(),
        bytes = bytes.len(),
        sha256 = %format!("{:x}", Sha256::digest(&bytes)),
        "model serialized"
    );

    let destination = remote_path(job_dir, &config.model_filename);
    CopyCommand::from_config(config).run(
        &config.model_filename,
        &destination,
        config.local_dir.as_deref(),
    )?;
    Ok(destination)
}

pub(crate) fn is_remote(path: &str) -> bool {
    path.starts_with("gs://")
}

/// Copies a remote dataset into `staging_dir` as `<role>-<file name>` and
/// returns the local path. Local paths are returned unchanged.
pub fn stage_input(
    path: &str,
    role: &str,
    staging_dir: &Path,
    config: &PublishConfig,
) -> Result<PathBuf> {
    if !is_remote(path) {
        return Ok(PathBuf::from(path));
    }
    let name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| TrainError::Input(format!("cannot derive a file name from {}", path)))?;
    let local = staging_dir.join(format!("{}-{}", role, name));
    CopyCommand::from_config(config)
        .run(path, &local.to_string_lossy(), None)
        .map_err(|err| TrainError::Input(format!("failed to stage {}: {}", path, err)))?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_argv_matches_gsutil_copy() {
        let command = CopyCommand::from_config(&PublishConfig::default());
        let argv = command.argv("model.pkl", &remote_path("gs://bucket/job1", "model.pkl"));
        assert_eq!(
            argv,
            vec!["gsutil", "cp", "model.pkl", "gs://bucket/job1/model.pkl"]
        );
    }

    #[test]
    fn remote_path_trims_trailing_slash() {
        assert_eq!(remote_path("gs://b/j/", "model.pkl"), "gs://b/j/model.pkl");
    }

    #[test]
    fn local_model_path_defaults_to_bare_filename() {
        let config = PublishConfig::default();
        assert_eq!(local_model_path(&config), PathBuf::from("model.pkl"));
    }

    #[cfg(unix)]
    #[test]
    fn remote_inputs_with_same_name_stage_to_distinct_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("train")).unwrap();
        std::fs::create_dir_all(root.path().join("val")).unwrap();
        std::fs::write(root.path().join("train/data.csv"), "training rows").unwrap();
        std::fs::write(root.path().join("val/data.csv"), "validation rows").unwrap();

        let config = PublishConfig {
            copy_program: "sh".to_string(),
            copy_args: vec![
                "-c".to_string(),
                format!("cp \"{}/${{0#gs://bucket/}}\" \"$1\"", root.path().display()),
            ],
            ..PublishConfig::default()
        };
        let staging = tempfile::tempdir().unwrap();
        let train = stage_input("gs://bucket/train/data.csv", "training", staging.path(), &config).unwrap();
        let validation =
            stage_input("gs://bucket/val/data.csv", "validation", staging.path(), &config).unwrap();

        assert_ne!(train, validation);
        assert_eq!(std::fs::read_to_string(&train).unwrap(), "training rows");
        assert_eq!(std::fs::read_to_string(&validation).unwrap(), "validation rows");
    }

    #[test]
    fn local_paths_are_not_staged() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage_input("data/train.csv", "training", dir.path(), &PublishConfig::default()).unwrap();
        assert_eq!(staged, PathBuf::from("data/train.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_copy_is_a_publish_error() {
        let command = CopyCommand {
            program: "false".to_string(),
            args: Vec::new(),
        };
        assert!(matches!(command.run("a", "b", None), Err(TrainError::Publish(_))));
    }

    #[test]
    fn missing_program_is_a_publish_error() {
        let command = CopyCommand {
            program: "definitely-not-a-real-copy-tool".to_string(),
            args: Vec::new(),
        };
        assert!(matches!(command.run("a", "b", None), Err(TrainError::Publish(_))));
    }
}
