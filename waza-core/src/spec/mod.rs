//! Spec Loader component.

pub mod loader;
pub mod model;

pub use loader::load;
pub use model::{
    BenchmarkSpec, EngineKind, ExecutionConfig, ExpectedBehavior, FileSource, GraderDecl,
    GraderKind, ReferenceFile, TaskDefinition, TaskFilter,
};
