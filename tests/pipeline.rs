//! Pipeline integration tests
//!
//! Exercises the conversation wiring with mock stages in place of the
//! audio and network collaborators.

use std::cell::RefCell;
use std::rc::Rc;

use murmur_agent::agent::stages::{is_exit_phrase, FarewellStage, ShutdownStage, FAREWELL};
use murmur_agent::{Branch, Error, Pipeline, Result, Stage, StageOutput, Value};

/// Stage that emits a fixed transcript, standing in for record+transcribe
struct FixedTranscript(&'static str);

#[async_trait::async_trait(?Send)]
impl Stage for FixedTranscript {
    fn name(&self) -> &'static str {
        "fixed-transcript"
    }

    async fn run(&mut self, _input: Value) -> Result<StageOutput> {
        Ok(StageOutput::Continue(Value::Text(self.0.to_string())))
    }
}

/// Stage that records whether it ran, standing in for reply generation
struct CountingGenerate(Rc<RefCell<usize>>);

#[async_trait::async_trait(?Send)]
impl Stage for CountingGenerate {
    fn name(&self) -> &'static str {
        "counting-generate"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        *self.0.borrow_mut() += 1;
        let Value::Text(user) = input else {
            return Ok(StageOutput::Stop);
        };
        Ok(StageOutput::Continue(Value::Turn {
            user,
            assistant: "a reply".to_string(),
        }))
    }
}

/// Stage that captures every value it sees and passes it through
struct Capture(Rc<RefCell<Vec<Value>>>);

#[async_trait::async_trait(?Send)]
impl Stage for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        self.0.borrow_mut().push(input.clone());
        Ok(StageOutput::Continue(input))
    }
}

fn exit_branch() -> Branch {
    Branch::new(
        |value| matches!(value, Value::Text(text) if is_exit_phrase(text)),
        Pipeline::new().stage(FarewellStage).stage(ShutdownStage),
        Pipeline::new(),
    )
}

#[tokio::test]
async fn closing_word_routes_to_farewell_without_generation() {
    let generations = Rc::new(RefCell::new(0));
    let spoken = Rc::new(RefCell::new(Vec::new()));

    let exit = Pipeline::new()
        .stage(FarewellStage)
        .stage(Capture(spoken.clone()))
        .stage(ShutdownStage);
    let converse = Pipeline::new().stage(CountingGenerate(generations.clone()));

    let mut pipeline = Pipeline::new().stage(FixedTranscript("Goodbye!")).branch(
        Branch::new(
            |value| matches!(value, Value::Text(text) if is_exit_phrase(text)),
            exit,
            converse,
        ),
    );

    let out = pipeline.run(Value::Empty).await;

    assert_eq!(out, StageOutput::Continue(Value::Shutdown));
    assert_eq!(*generations.borrow(), 0, "reply generation must not run");
    assert_eq!(
        *spoken.borrow(),
        vec![Value::Text(FAREWELL.to_string())],
        "the fixed farewell is what gets spoken"
    );
}

#[tokio::test]
async fn ordinary_transcript_takes_the_conversation_branch() {
    let generations = Rc::new(RefCell::new(0));

    let mut pipeline = Pipeline::new()
        .stage(FixedTranscript("book me a room for Tuesday"))
        .branch(Branch::new(
            |value| matches!(value, Value::Text(text) if is_exit_phrase(text)),
            Pipeline::new().stage(FarewellStage).stage(ShutdownStage),
            Pipeline::new().stage(CountingGenerate(generations.clone())),
        ));

    let out = pipeline.run(Value::Empty).await;

    assert_eq!(*generations.borrow(), 1);
    assert_eq!(
        out,
        StageOutput::Continue(Value::Turn {
            user: "book me a room for Tuesday".to_string(),
            assistant: "a reply".to_string(),
        })
    );
}

#[tokio::test]
async fn stage_failure_stops_the_run_but_not_the_caller() {
    struct Flaky;

    #[async_trait::async_trait(?Send)]
    impl Stage for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn run(&mut self, _input: Value) -> Result<StageOutput> {
            Err(Error::Stt("temporarily unavailable".to_string()))
        }
    }

    let generations = Rc::new(RefCell::new(0));
    let mut pipeline = Pipeline::new()
        .stage(Flaky)
        .stage(CountingGenerate(generations.clone()));

    // A failing stage yields Stop; the loop can simply run again.
    assert_eq!(pipeline.run(Value::Empty).await, StageOutput::Stop);
    assert_eq!(pipeline.run(Value::Empty).await, StageOutput::Stop);
    assert_eq!(*generations.borrow(), 0);
}

#[tokio::test]
async fn branch_predicate_sees_the_untransformed_input() {
    let seen = Rc::new(RefCell::new(Vec::new()));

    let mut pipeline = Pipeline::new()
        .stage(FixedTranscript("exit"))
        .branch(Branch::new(
            |value| matches!(value, Value::Text(text) if is_exit_phrase(text)),
            Pipeline::new().stage(Capture(seen.clone())),
            Pipeline::new(),
        ));

    pipeline.run(Value::Empty).await;

    assert_eq!(
        *seen.borrow(),
        vec![Value::Text("exit".to_string())],
        "the exit branch receives the transcript verbatim"
    );
}

#[tokio::test]
async fn empty_exit_branch_forwards_its_input() {
    let mut branch_only = Pipeline::new().branch(exit_branch());
    let out = branch_only
        .run(Value::Text("what time is it".to_string()))
        .await;
    assert_eq!(
        out,
        StageOutput::Continue(Value::Text("what time is it".to_string()))
    );
}
