//! Pipelines: ordered steps with declared processing types.

mod builder;
mod step;

pub use builder::{Pipeline, PipelineBuilder};
pub use step::{FnStep, PipelineStep, StepDeclaration};
