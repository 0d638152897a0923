//! Spec Loader: parses and validates a benchmark spec and
//! its referenced task definitions.

use crate::error::{WazaError, WazaResult};
use crate::spec::model::{BenchmarkSpec, FileSource, TaskDefinition, TaskFilter};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Load a benchmark spec and its fully-resolved, filtered task list.
///
/// `spec_path` is the spec YAML file. Task globs are resolved relative to
/// its parent directory. Fails with [`WazaError::SpecInvalid`] on a
/// malformed spec and [`WazaError::NoTasksSelected`] if the filtered task
/// list is empty.
#[instrument(skip(filter), fields(spec = %spec_path.as_ref().display()))]
pub fn load(
    spec_path: impl AsRef<Path>,
    filter: &TaskFilter,
) -> WazaResult<(BenchmarkSpec, Vec<TaskDefinition>)> {
    let spec_path = spec_path.as_ref();
    let raw = std::fs::read_to_string(spec_path)
        .map_err(|e| WazaError::SpecInvalid(format!("cannot read {}: {e}", spec_path.display())))?;

    let spec: BenchmarkSpec = serde_yaml::from_str(&raw)
        .map_err(|e| WazaError::SpecInvalid(format!("parsing {}: {e}", spec_path.display())))?;
    spec.validate().map_err(WazaError::SpecInvalid)?;

    let spec_dir = spec_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut tasks = Vec::new();
    for pattern in &spec.tasks {
        let resolved_pattern = spec_dir.join(pattern);
        let pattern_str = resolved_pattern.to_string_lossy().to_string();
        let matches: Vec<PathBuf> = glob::glob(&pattern_str)
            .map_err(|e| WazaError::SpecInvalid(format!("bad glob '{pattern}': {e}")))?
            .filter_map(Result::ok)
            .collect();

        // A glob matching zero files is accepted here; if every glob in
        // the spec comes up empty (or filtering removes everything) the
        // post-filter check below reports NoTasksSelected instead.
        for task_path in matches {
            let task = load_task_file(&task_path)?;
            debug!(task_id = %task.id, "loaded task");
            tasks.push(task);
        }
    }

    let mut seen_ids = std::collections::HashSet::new();
    for t in &tasks {
        if !seen_ids.insert(t.id.clone()) {
            return Err(WazaError::SpecInvalid(format!(
                "duplicate task id across loaded tasks: {}",
                t.id
            )));
        }
    }

    let filtered: Vec<TaskDefinition> = tasks.into_iter().filter(|t| filter.matches(t)).collect();
    if filtered.is_empty() {
        return Err(WazaError::NoTasksSelected);
    }

    Ok((spec, filtered))
}

fn load_task_file(path: &Path) -> WazaResult<TaskDefinition> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WazaError::SpecInvalid(format!("cannot read task {}: {e}", path.display())))?;
    let mut task: TaskDefinition = serde_yaml::from_str(&raw)
        .map_err(|e| WazaError::SpecInvalid(format!("parsing task {}: {e}", path.display())))?;
    task.source_path = path.to_path_buf();

    // Resolve on-disk file sources relative to the task file's directory
    // and fail fast if they are unreadable.
    let task_dir = path.parent().unwrap_or_else(|| Path::new("."));
    for file in &mut task.files {
        if let FileSource::OnDisk { path: ref mut p } = file.source {
            let resolved = if p.is_absolute() {
                p.clone()
            } else {
                task_dir.join(&p)
            };
            if !resolved.is_file() {
                return Err(WazaError::SpecInvalid(format!(
                    "task {} references unreadable file: {}",
                    task.id,
                    resolved.display()
                )));
            }
            *p = resolved;
        }
    }

    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_spec_and_expands_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tasks")).unwrap();
        write(
            &dir.path().join("tasks"),
            "explain.yaml",
            "id: explain\nname: Explain\nprompt: Explain this code\n",
        );
        let spec_path = write(
            dir.path(),
            "bench.yaml",
            "name: demo\nskill: demo-skill\nversion: \"1\"\nconfig:\n  trials_per_task: 1\n  timeout_seconds: 30\n  executor: mock\n  model: mock-1\ntasks:\n  - \"tasks/*.yaml\"\n",
        );

        let (spec, tasks) = load(&spec_path, &TaskFilter::default()).unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "explain");
    }

    #[test]
    fn empty_glob_match_with_no_other_tasks_is_no_tasks_selected() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = write(
            dir.path(),
            "bench.yaml",
            "name: demo\nskill: demo-skill\nversion: \"1\"\nconfig:\n  trials_per_task: 1\n  timeout_seconds: 30\n  executor: mock\n  model: mock-1\ntasks:\n  - \"tasks/*.yaml\"\n",
        );

        let err = load(&spec_path, &TaskFilter::default()).unwrap_err();
        assert!(matches!(err, WazaError::NoTasksSelected));
    }

    #[test]
    fn one_empty_glob_among_several_is_accepted_if_others_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tasks")).unwrap();
        write(
            &dir.path().join("tasks"),
            "explain.yaml",
            "id: explain\nname: Explain\nprompt: Explain this code\n",
        );
        let spec_path = write(
            dir.path(),
            "bench.yaml",
            "name: demo\nskill: demo-skill\nversion: \"1\"\nconfig:\n  trials_per_task: 1\n  timeout_seconds: 30\n  executor: mock\n  model: mock-1\ntasks:\n  - \"tasks/*.yaml\"\n  - \"empty/*.yaml\"\n",
        );

        let (_spec, tasks) = load(&spec_path, &TaskFilter::default()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "explain");
    }

    #[test]
    fn unknown_config_key_is_spec_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tasks")).unwrap();
        write(
            &dir.path().join("tasks"),
            "t.yaml",
            "id: t\nname: T\nprompt: hi\n",
        );
        let spec_path = write(
            dir.path(),
            "bench.yaml",
            "name: demo\nskill: demo-skill\nversion: \"1\"\nconfig:\n  trials_per_task: 1\n  timeout_seconds: 30\n  executor: mock\n  model: mock-1\n  bogus: true\ntasks:\n  - \"tasks/*.yaml\"\n",
        );

        let err = load(&spec_path, &TaskFilter::default()).unwrap_err();
        assert!(matches!(err, WazaError::SpecInvalid(_)));
    }

    #[test]
    fn filter_that_excludes_everything_is_no_tasks_selected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tasks")).unwrap();
        write(
            &dir.path().join("tasks"),
            "t.yaml",
            "id: t\nname: T\nprompt: hi\ntags: [smoke]\n",
        );
        let spec_path = write(
            dir.path(),
            "bench.yaml",
            "name: demo\nskill: demo-skill\nversion: \"1\"\nconfig:\n  trials_per_task: 1\n  timeout_seconds: 30\n  executor: mock\n  model: mock-1\ntasks:\n  - \"tasks/*.yaml\"\n",
        );

        let filter = TaskFilter {
            name_glob: None,
            tags: ["nonexistent".to_string()].into_iter().collect(),
        };
        let err = load(&spec_path, &filter).unwrap_err();
        assert!(matches!(err, WazaError::NoTasksSelected));
    }
}
