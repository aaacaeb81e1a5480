//! Dataflow pipeline with conditional branching
//!
//! A [`Pipeline`] is an ordered sequence of stages. Each stage maps an
//! input [`Value`] to [`StageOutput::Continue`] with the next value, or to
//! [`StageOutput::Stop`] to end the run early. A [`Branch`] evaluates a
//! pure predicate against its input and forwards the *original* input,
//! never a transformed one, to whichever sub-pipeline the predicate
//! selects; the selected sub-pipeline's output then flows into any
//! remaining stages like an ordinary stage output.
//!
//! Stage failures are caught at the stage boundary: the error is logged
//! with the stage name and the run stops, so one bad iteration never
//! takes down the caller's loop.

use crate::Result;
use crate::voice::AudioBuffer;

/// Value flowing between pipeline stages
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Placeholder input used to kick off a run
    Empty,

    /// Captured audio awaiting transcription
    Audio(AudioBuffer),

    /// Plain text (a transcript or a reply)
    Text(String),

    /// A completed user/assistant exchange
    Turn {
        /// What the user said
        user: String,
        /// What the assistant replied
        assistant: String,
    },

    /// Marker produced by the exit branch: the conversation is over
    Shutdown,
}

impl Value {
    /// The text carried by this value, if any
    ///
    /// For a [`Value::Turn`] this is the assistant's reply, which is what
    /// downstream stages (printing, synthesis) act on.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Turn { assistant, .. } => Some(assistant),
            _ => None,
        }
    }
}

/// Outcome of running one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// The stage produced a value for the next stage
    Continue(Value),

    /// The stage produced no output; the pipeline run ends here
    Stop,
}

/// A single transformation step in the pipeline
#[async_trait::async_trait(?Send)]
pub trait Stage {
    /// Stage name, used in logs when a stage fails
    fn name(&self) -> &'static str;

    /// Map an input value to an output value or to "no output"
    async fn run(&mut self, input: Value) -> Result<StageOutput>;
}

/// A stage entry: either a simple stage or a branch point
enum Entry {
    Simple(Box<dyn Stage>),
    Branch(Branch),
}

/// Conditional branch between two sub-pipelines
///
/// The predicate is a pure test over the branch's input. Whichever
/// sub-pipeline it selects receives that same input verbatim.
pub struct Branch {
    predicate: Box<dyn Fn(&Value) -> bool>,
    if_true: Pipeline,
    if_false: Pipeline,
}

impl Branch {
    /// Create a branch from a predicate and two sub-pipelines
    pub fn new<P>(predicate: P, if_true: Pipeline, if_false: Pipeline) -> Self
    where
        P: Fn(&Value) -> bool + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            if_true,
            if_false,
        }
    }

    /// Route the input to the selected sub-pipeline and run it
    async fn run(&mut self, input: Value) -> StageOutput {
        if (self.predicate)(&input) {
            Box::pin(self.if_true.run(input)).await
        } else {
            Box::pin(self.if_false.run(input)).await
        }
    }
}

/// An ordered sequence of stages
#[derive(Default)]
pub struct Pipeline {
    entries: Vec<Entry>,
}

impl Pipeline {
    /// Create an empty pipeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a simple stage
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.entries.push(Entry::Simple(Box::new(stage)));
        self
    }

    /// Append a branch point
    #[must_use]
    pub fn branch(mut self, branch: Branch) -> Self {
        self.entries.push(Entry::Branch(branch));
        self
    }

    /// Thread `input` through the stages in order
    ///
    /// Short-circuits the moment any stage yields no output. A stage
    /// error is logged and treated the same as no output; the caller's
    /// loop decides whether to try again.
    pub async fn run(&mut self, input: Value) -> StageOutput {
        let mut current = input;

        for entry in &mut self.entries {
            match entry {
                Entry::Simple(stage) => match stage.run(current).await {
                    Ok(StageOutput::Continue(next)) => current = next,
                    Ok(StageOutput::Stop) => return StageOutput::Stop,
                    Err(e) => {
                        tracing::warn!(stage = stage.name(), error = %e, "stage failed");
                        return StageOutput::Stop;
                    }
                },
                Entry::Branch(branch) => match branch.run(current).await {
                    StageOutput::Continue(next) => current = next,
                    StageOutput::Stop => return StageOutput::Stop,
                },
            }
        }

        StageOutput::Continue(current)
    }
}
