//! Ordered pipelines and their builder.

use super::step::PipelineStep;
use crate::errors::FlowError;
use std::sync::Arc;

/// An ordered sequence of steps. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: Arc<str>,
    steps: Arc<[Arc<dyn PipelineStep>]>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Arc<dyn PipelineStep>] {
        &self.steps
    }

    /// Returns the step at `index`.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Arc<dyn PipelineStep>> {
        self.steps.get(index)
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; a built pipeline has at least one step.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends a shared step.
    #[must_use]
    pub fn shared_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the number of steps added so far.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no step was added.
    pub fn build(self) -> Result<Pipeline, FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::configuration(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }
        Ok(Pipeline {
            name: Arc::from(self.name),
            steps: self.steps.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProcessingType;
    use crate::pipeline::FnStep;

    #[test]
    fn test_build_preserves_order() {
        let pipeline = PipelineBuilder::new("orders")
            .step(FnStep::new("a", ProcessingType::Light, Ok))
            .step(FnStep::new("b", ProcessingType::Blocking, Ok))
            .step(FnStep::new("c", ProcessingType::Intensive, Ok))
            .build()
            .unwrap();

        let names: Vec<_> = pipeline.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(pipeline.name(), "orders");
        assert_eq!(pipeline.len(), 3);
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let err = PipelineBuilder::new("empty").build().unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }

    #[test]
    fn test_clone_shares_steps() {
        let pipeline = PipelineBuilder::new("shared")
            .step(FnStep::new("only", ProcessingType::Light, Ok))
            .build()
            .unwrap();
        let copy = pipeline.clone();
        assert!(Arc::ptr_eq(&pipeline.steps()[0], &copy.steps()[0]));
    }
}
