//! Function-call orchestration.
//!
//! A function call announced by the service goes through four steps: wait
//! for its finalized arguments, wait for the announcing response to finish,
//! run the local implementation, then submit the result and ask for a new
//! response. At most one call is active at a time.
//!
//! The orchestrator never blocks the event loop. Waits are deadlines the loop
//! selects on ([`FunctionCallOrchestrator::deadline`]), and execution runs in
//! a spawned task that reports back through the completion channel returned
//! by [`FunctionCallOrchestrator::new`]. All state changes happen on the loop.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::connection::EventSender;
use super::messages::ConversationItem;
use crate::tools::{RegisteredTool, ToolRegistry};

/// Step a call was in when it timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// Waiting for `response.function_call_arguments.done`
    Arguments,
    /// Waiting for `response.done`
    ResponseDone,
    /// Running the tool implementation
    Execution,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStage::Arguments => write!(f, "function arguments"),
            CallStage::ResponseDone => write!(f, "response completion"),
            CallStage::Execution => write!(f, "function execution"),
        }
    }
}

/// How a function call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Result submitted and a new response requested
    Completed { call_id: String, name: String },
    /// Arguments arrived for a different call
    CallIdMismatch { expected: String, received: String },
    /// Finalized arguments were not valid JSON
    InvalidArguments { call_id: String, reason: String },
    /// No implementation is registered under the name
    UnknownFunction { call_id: String, name: String },
    /// A bounded wait expired
    TimedOut {
        call_id: String,
        name: String,
        stage: CallStage,
    },
    /// The implementation or the result submission failed
    Failed {
        call_id: String,
        name: String,
        reason: String,
    },
    /// The announcing item lacked a call id or name
    MalformedItem { reason: String },
    /// Another call was still active; this one was dropped
    Ignored { call_id: String, active_call_id: String },
}

impl CallOutcome {
    /// Call id the outcome refers to, when known.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            CallOutcome::Completed { call_id, .. }
            | CallOutcome::InvalidArguments { call_id, .. }
            | CallOutcome::UnknownFunction { call_id, .. }
            | CallOutcome::TimedOut { call_id, .. }
            | CallOutcome::Failed { call_id, .. }
            | CallOutcome::Ignored { call_id, .. } => Some(call_id),
            CallOutcome::CallIdMismatch { expected, .. } => Some(expected),
            CallOutcome::MalformedItem { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CallOutcome::Completed { .. })
    }
}

/// One in-flight tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFunctionCall {
    pub call_id: String,
    pub name: String,
    /// Item that announced the call; the result is inserted after it
    pub item_id: Option<String>,
    /// Finalized arguments, present once they have been parsed
    pub arguments: Option<Value>,
}

enum CallState {
    Idle,
    AwaitingArguments {
        call: PendingFunctionCall,
        deadline: Instant,
    },
    AwaitingResponseDone {
        call: PendingFunctionCall,
        deadline: Instant,
    },
    Executing {
        call_id: String,
        task: JoinHandle<()>,
    },
}

/// Drives at most one function call at a time.
pub struct FunctionCallOrchestrator {
    registry: Arc<ToolRegistry>,
    sender: EventSender,
    wait_timeout: Duration,
    state: CallState,
    completions: mpsc::UnboundedSender<CallOutcome>,
}

impl FunctionCallOrchestrator {
    /// Create an orchestrator and the channel on which executions report back.
    ///
    /// Every outcome received on that channel must be handed to
    /// [`on_completion`](Self::on_completion).
    pub fn new(
        registry: Arc<ToolRegistry>,
        sender: EventSender,
        wait_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<CallOutcome>) {
        let (completions, completion_rx) = mpsc::unbounded_channel();
        (
            Self {
                registry,
                sender,
                wait_timeout,
                state: CallState::Idle,
                completions,
            },
            completion_rx,
        )
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.state, CallState::Idle)
    }

    pub fn active_call_id(&self) -> Option<&str> {
        match &self.state {
            CallState::Idle => None,
            CallState::AwaitingArguments { call, .. }
            | CallState::AwaitingResponseDone { call, .. } => Some(&call.call_id),
            CallState::Executing { call_id, .. } => Some(call_id),
        }
    }

    /// When the current wait expires, if the call is waiting on an event.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            CallState::AwaitingArguments { deadline, .. }
            | CallState::AwaitingResponseDone { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Start tracking a function call announced by `conversation.item.created`.
    pub fn begin(&mut self, item: &ConversationItem) -> Option<CallOutcome> {
        let (call_id, name) = match (&item.call_id, &item.name) {
            (Some(call_id), Some(name)) => (call_id.clone(), name.clone()),
            _ => {
                error!("Function call item is missing its call id or name");
                return Some(CallOutcome::MalformedItem {
                    reason: "missing call_id or name".to_string(),
                });
            }
        };

        if let Some(active) = self.active_call_id() {
            warn!(
                "Function call {} ({}) arrived while {} is still active, ignoring it",
                call_id, name, active
            );
            return Some(CallOutcome::Ignored {
                active_call_id: active.to_string(),
                call_id,
            });
        }

        info!("Function call detected: {} with call_id: {}", name, call_id);
        self.state = CallState::AwaitingArguments {
            call: PendingFunctionCall {
                call_id,
                name,
                item_id: item.id.clone(),
                arguments: None,
            },
            deadline: Instant::now() + self.wait_timeout,
        };
        None
    }

    /// Handle `response.function_call_arguments.done`.
    pub fn on_arguments_done(&mut self, call_id: &str, arguments: &str) -> Option<CallOutcome> {
        let CallState::AwaitingArguments { .. } = self.state else {
            debug!("Ignoring arguments for {} with no call awaiting them", call_id);
            return None;
        };
        let CallState::AwaitingArguments { mut call, .. } =
            std::mem::replace(&mut self.state, CallState::Idle)
        else {
            return None;
        };

        if call.call_id != call_id {
            warn!(
                "Call ID mismatch: expected {}, got {}",
                call.call_id, call_id
            );
            return Some(CallOutcome::CallIdMismatch {
                expected: call.call_id,
                received: call_id.to_string(),
            });
        }

        let parsed = if arguments.trim().is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(arguments)
        };
        let parsed = match parsed {
            Ok(value) => value,
            Err(e) => {
                error!("Invalid arguments for function {}: {}", call.name, e);
                return Some(CallOutcome::InvalidArguments {
                    call_id: call.call_id,
                    reason: e.to_string(),
                });
            }
        };

        if self.registry.should_log_calls() {
            info!("Function arguments received for {}: {}", call.name, arguments);
        } else {
            debug!("Function arguments received for {}: {}", call.name, arguments);
        }

        call.arguments = Some(parsed);
        self.state = CallState::AwaitingResponseDone {
            call,
            deadline: Instant::now() + self.wait_timeout,
        };
        None
    }

    /// Handle `response.done`. Dispatches the call once its announcing
    /// response has finished; otherwise does nothing.
    pub fn on_response_done(&mut self) -> Option<CallOutcome> {
        let CallState::AwaitingResponseDone { .. } = self.state else {
            return None;
        };
        let CallState::AwaitingResponseDone { call, .. } =
            std::mem::replace(&mut self.state, CallState::Idle)
        else {
            return None;
        };

        let Some(tool) = self.registry.get(&call.name).cloned() else {
            error!("Unknown function: {}", call.name);
            return Some(CallOutcome::UnknownFunction {
                call_id: call.call_id,
                name: call.name,
            });
        };

        let call_id = call.call_id.clone();
        let sender = self.sender.clone();
        let completions = self.completions.clone();
        let task = tokio::spawn(async move {
            let outcome = execute(call, tool, sender).await;
            let _ = completions.send(outcome);
        });

        self.state = CallState::Executing { call_id, task };
        None
    }

    /// Abandon the current wait if its deadline has passed.
    pub fn on_deadline(&mut self, now: Instant) -> Option<CallOutcome> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }

        let (call, stage) = match std::mem::replace(&mut self.state, CallState::Idle) {
            CallState::AwaitingArguments { call, .. } => (call, CallStage::Arguments),
            CallState::AwaitingResponseDone { call, .. } => (call, CallStage::ResponseDone),
            other => {
                self.state = other;
                return None;
            }
        };

        error!(
            "Timeout waiting for {} for function {} (call_id: {})",
            stage, call.name, call.call_id
        );
        Some(CallOutcome::TimedOut {
            call_id: call.call_id,
            name: call.name,
            stage,
        })
    }

    /// Record the outcome reported by an execution task and go idle.
    pub fn on_completion(&mut self, outcome: CallOutcome) -> CallOutcome {
        if let CallState::Executing { call_id, .. } = &self.state {
            if outcome.call_id() == Some(call_id.as_str()) {
                self.state = CallState::Idle;
            }
        }

        match &outcome {
            CallOutcome::Completed { name, .. } => info!("Function {} completed", name),
            CallOutcome::TimedOut { name, stage, .. } => {
                error!("Timeout during {} for function {}", stage, name)
            }
            CallOutcome::Failed { name, reason, .. } => {
                error!("Error executing function {}: {}", name, reason)
            }
            _ => {}
        }
        outcome
    }

    /// Drop any active call, aborting a running execution.
    pub fn abort(&mut self) {
        match std::mem::replace(&mut self.state, CallState::Idle) {
            CallState::Executing { call_id, task } => {
                task.abort();
                debug!("Aborted execution of call {}", call_id);
            }
            CallState::Idle => {}
            _ => debug!("Dropped pending function call"),
        }
    }
}

impl Drop for FunctionCallOrchestrator {
    fn drop(&mut self) {
        if let CallState::Executing { task, .. } = &self.state {
            task.abort();
        }
    }
}

async fn execute(call: PendingFunctionCall, tool: RegisteredTool, sender: EventSender) -> CallOutcome {
    info!("Executing function: {}", call.name);
    let arguments = call
        .arguments
        .unwrap_or_else(|| Value::Object(Default::default()));

    let result = match tokio::time::timeout(tool.timeout, (tool.implementation)(arguments)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            return CallOutcome::Failed {
                call_id: call.call_id,
                name: call.name,
                reason: e.to_string(),
            };
        }
        Err(_) => {
            return CallOutcome::TimedOut {
                call_id: call.call_id,
                name: call.name,
                stage: CallStage::Execution,
            };
        }
    };

    // The wire carries the result as a JSON document, so text becomes a JSON string.
    let output = match serde_json::to_string(&result) {
        Ok(output) => output,
        Err(e) => {
            return CallOutcome::Failed {
                call_id: call.call_id,
                name: call.name,
                reason: e.to_string(),
            };
        }
    };

    if let Err(e) = sender
        .submit_function_output(&call.call_id, call.item_id.clone(), output)
        .await
    {
        return CallOutcome::Failed {
            call_id: call.call_id,
            name: call.name,
            reason: e.to_string(),
        };
    }
    info!("Function result sent: {}", result);

    if let Err(e) = sender.create_response().await {
        return CallOutcome::Failed {
            call_id: call.call_id,
            name: call.name,
            reason: e.to_string(),
        };
    }

    CallOutcome::Completed {
        call_id: call.call_id,
        name: call.name,
    }
}
