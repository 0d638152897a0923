//! The benchmark spec and task definition data model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Which concrete engine backend a benchmark run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Deterministic control-plane engine used by the test suite.
    Mock,
    /// Real model backend. Wire details live outside the core.
    CopilotSdk,
}

/// Execution configuration carried by a [`BenchmarkSpec`].
///
/// Unknown keys here are rejected (`SpecInvalid`); unknown top-level keys
/// on [`BenchmarkSpec`] itself are ignored, reserved for forward-compatible
/// extension fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    pub trials_per_task: u32,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub executor: EngineKind,
    pub model: String,
    /// Extra directories copied into every trial's fixture.
    #[serde(default)]
    pub skill_paths: Vec<PathBuf>,
}

fn default_workers() -> usize {
    4
}

impl ExecutionConfig {
    fn validate(&self) -> Result<(), String> {
        if self.trials_per_task == 0 {
            return Err("config.trials_per_task must be >= 1".into());
        }
        if self.timeout_seconds == 0 {
            return Err("config.timeout_seconds must be > 0".into());
        }
        if self.workers == 0 {
            return Err("config.workers must be >= 1".into());
        }
        Ok(())
    }
}

/// The closed set of grader kinds. Determinism classification lives on
/// [`GraderKind::is_deterministic`] and is a compile-time constant of the
/// core — new kinds must be classified there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraderKind {
    Code,
    Regex,
    Behavior,
    Prompt,
    ToolCalls,
    Script,
    Human,
}

impl GraderKind {
    /// A grader is deterministic iff its kind is one of code/regex/tool-calls/script.
    pub fn is_deterministic(self) -> bool {
        matches!(
            self,
            GraderKind::Code | GraderKind::Regex | GraderKind::ToolCalls | GraderKind::Script
        )
    }
}

/// A declared grader. `config` is a typed payload keyed by `kind`; kept as
/// a raw JSON value here and parsed by the grader implementation that
/// owns its schema (see `crate::grader`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderDecl {
    pub name: String,
    pub kind: GraderKind,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Top-level benchmark spec, loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub name: String,
    pub skill: String,
    pub version: String,
    pub config: ExecutionConfig,
    #[serde(default)]
    pub graders: Vec<GraderDecl>,
    pub tasks: Vec<String>,
}

impl BenchmarkSpec {
    /// Validate structural invariants. Does not touch the filesystem;
    /// [`crate::spec::loader::load`] calls this after parsing.
    pub fn validate(&self) -> Result<(), String> {
        self.config.validate()?;
        if self.tasks.is_empty() {
            return Err("spec must declare at least one task glob".into());
        }
        let mut seen = HashSet::new();
        for g in &self.graders {
            if !seen.insert(g.name.as_str()) {
                return Err(format!("duplicate grader name in spec: {}", g.name));
            }
        }
        Ok(())
    }
}

/// A reference file staged into a trial's working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceFile {
    pub logical_path: PathBuf,
    /// Either inline content or a path to read from, resolved relative to
    /// the task definition file's directory.
    #[serde(flatten)]
    pub source: FileSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSource {
    Inline { content: String },
    OnDisk { path: PathBuf },
}

/// Expected-behavior clauses for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedBehavior {
    #[serde(default)]
    pub output_contains: Vec<String>,
    #[serde(default)]
    pub output_not_contains: Vec<String>,
    pub max_tool_calls: Option<u32>,
    pub max_response_time_ms: Option<u64>,
}

/// A single task definition, loaded from its own YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: HashSet<String>,
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<ReferenceFile>,
    #[serde(default)]
    pub expected: ExpectedBehavior,
    /// Graders that extend (never replace) the spec's grader list.
    #[serde(default)]
    pub graders: Vec<GraderDecl>,
    /// Absolute path the task file itself was loaded from; used to resolve
    /// relative `OnDisk` file sources and as a fixture-manager input.
    #[serde(skip)]
    pub source_path: PathBuf,
}

impl TaskDefinition {
    /// The full grader list this task runs: spec graders followed by this
    /// task's own overrides, in declared order.
    pub fn effective_graders<'a>(&'a self, spec_graders: &'a [GraderDecl]) -> Vec<&'a GraderDecl> {
        spec_graders.iter().chain(self.graders.iter()).collect()
    }
}

/// Name/id glob and tag filters applied by the spec loader.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub name_glob: Option<String>,
    pub tags: HashSet<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &TaskDefinition) -> bool {
        if let Some(pattern) = &self.name_glob {
            let matcher = glob::Pattern::new(pattern).ok();
            let hits = matcher
                .map(|p| p.matches(&task.id) || p.matches(&task.name))
                .unwrap_or(true);
            if !hits {
                return false;
            }
        }
        if !self.tags.is_empty() && self.tags.is_disjoint(&task.tags) {
            return false;
        }
        true
    }
}
