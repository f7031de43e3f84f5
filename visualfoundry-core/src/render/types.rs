use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::graph::FilterGraph;
use crate::params::MotionProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

/// One encoder invocation. The outcome can be recorded once; later attempts
/// are ignored.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub graph: FilterGraph,
    pub duration_seconds: f64,
    pub motion: MotionProfile,
    outcome: Option<JobOutcome>,
}

impl RenderJob {
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        graph: FilterGraph,
        duration_seconds: f64,
        motion: MotionProfile,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path,
            output_path,
            graph,
            duration_seconds,
            motion,
            outcome: None,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.as_ref()
    }

    pub(crate) fn record(&mut self, outcome: JobOutcome) {
        if let Some(existing) = &self.outcome {
            warn!(job_id = %self.id, ?existing, "render outcome already recorded");
            return;
        }
        self.outcome = Some(outcome);
    }
}
