use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::events::PipelineOutcome;
use super::job::{JobKind, JobPayload, NextStep};
use super::queue::JobContext;
use crate::error::Result;

/// What a stage hands back to the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageOutput {
    pub next: NextStep,
    /// Set when this stage ended the pipeline for the file.
    pub outcome: Option<PipelineOutcome>,
}

impl StageOutput {
    pub fn next(next: NextStep) -> Self {
        Self {
            next,
            outcome: None,
        }
    }

    pub fn terminal(outcome: PipelineOutcome) -> Self {
        Self {
            next: NextStep::None,
            outcome: Some(outcome),
        }
    }
}

/// One step of the pipeline. Instances are created per job by a factory, so
/// they hold no state between runs.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &JobContext, payload: &JobPayload) -> Result<StageOutput>;
}

pub type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// Maps each job kind to the factory producing its stage.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<JobKind, StageFactory>,
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> =
            self.factories.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("StageRegistry").field("kinds", &kinds).finish()
    }
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: JobKind, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Stage> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    pub fn instantiate(&self, kind: JobKind) -> Option<Box<dyn Stage>> {
        self.factories.get(&kind).map(|factory| factory())
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        self.factories.contains_key(&kind)
    }
}
