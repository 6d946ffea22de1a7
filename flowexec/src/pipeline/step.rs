//! Pipeline steps.

use crate::core::{Event, ProcessingType};
use crate::errors::{FlowError, StepError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One unit of work inside a pipeline.
///
/// The processing type is a static property chosen by the step's author; it
/// decides which pool the step runs on under the non-blocking strategies.
pub trait PipelineStep: Send + Sync + fmt::Debug {
    /// Returns the step name.
    fn name(&self) -> &str;

    /// Returns the step's resource profile.
    fn processing_type(&self) -> ProcessingType;

    /// Processes an event, returning its successor.
    fn process(&self, event: Event) -> Result<Event, StepError>;

    /// Returns true if the pipeline should not wait for this step.
    fn is_fire_and_forget(&self) -> bool {
        false
    }
}

type StepFn = dyn Fn(Event) -> Result<Event, StepError> + Send + Sync;

/// A step backed by a closure.
#[derive(Clone)]
pub struct FnStep {
    name: String,
    processing_type: ProcessingType,
    fire_and_forget: bool,
    func: Arc<StepFn>,
}

impl FnStep {
    /// Creates a step.
    pub fn new<F>(name: impl Into<String>, processing_type: ProcessingType, func: F) -> Self
    where
        F: Fn(Event) -> Result<Event, StepError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            processing_type,
            fire_and_forget: false,
            func: Arc::new(func),
        }
    }

    /// Creates a step whose result the pipeline does not wait for.
    pub fn fire_and_forget<F>(
        name: impl Into<String>,
        processing_type: ProcessingType,
        func: F,
    ) -> Self
    where
        F: Fn(Event) -> Result<Event, StepError> + Send + Sync + 'static,
    {
        Self {
            fire_and_forget: true,
            ..Self::new(name, processing_type, func)
        }
    }

    /// Creates a step from a declaration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the declaration has no processing type.
    pub fn from_declaration<F>(declaration: &StepDeclaration, func: F) -> Result<Self, FlowError>
    where
        F: Fn(Event) -> Result<Event, StepError> + Send + Sync + 'static,
    {
        let processing_type = declaration.processing_type.ok_or_else(|| {
            FlowError::configuration(format!(
                "step '{}' does not declare a processing type",
                declaration.name
            ))
        })?;
        let mut step = Self::new(declaration.name.clone(), processing_type, func);
        step.fire_and_forget = declaration.fire_and_forget;
        Ok(step)
    }
}

impl fmt::Debug for FnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("processing_type", &self.processing_type)
            .field("fire_and_forget", &self.fire_and_forget)
            .finish_non_exhaustive()
    }
}

impl PipelineStep for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, event: Event) -> Result<Event, StepError> {
        (self.func)(event)
    }

    fn is_fire_and_forget(&self) -> bool {
        self.fire_and_forget
    }
}

/// Declarative description of a step, e.g. loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDeclaration {
    /// The step name.
    pub name: String,
    /// The declared processing type. Required.
    #[serde(default)]
    pub processing_type: Option<ProcessingType>,
    /// Whether the pipeline waits for the step.
    #[serde(default)]
    pub fire_and_forget: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fn_step_processes_event() {
        let step = FnStep::new("double", ProcessingType::Light, |event: Event| {
            let n = event.payload().as_i64().unwrap_or(0);
            Ok(event.with_payload(json!(n * 2)))
        });

        let out = step.process(Event::new(json!(21))).unwrap();
        assert_eq!(out.payload(), &json!(42));
        assert!(!step.is_fire_and_forget());
    }

    #[test]
    fn test_declaration_requires_processing_type() {
        let declaration: StepDeclaration =
            serde_json::from_str(r#"{"name": "audit", "fireAndForget": true}"#).unwrap();
        let err = FnStep::from_declaration(&declaration, Ok).unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
        assert!(err.to_string().contains("audit"));
    }

    #[test]
    fn test_declaration_builds_step() {
        let declaration: StepDeclaration = serde_json::from_str(
            r#"{"name": "audit", "processingType": "BLOCKING", "fireAndForget": true}"#,
        )
        .unwrap();
        let step = FnStep::from_declaration(&declaration, Ok).unwrap();
        assert_eq!(step.name(), "audit");
        assert_eq!(step.processing_type(), ProcessingType::Blocking);
        assert!(step.is_fire_and_forget());
    }
}
