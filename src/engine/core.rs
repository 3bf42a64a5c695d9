// src/engine/core.rs

//! The message processor: a pure, synchronous state machine over
//! [`CollectorState`].
//!
//! It has no channels, sockets or filesystem access, so it is unit tested
//! directly; the IO shell lives in [`crate::collector`].

use tracing::{debug, warn};

use crate::codec::Map;
use crate::errors::CollectorError;
use crate::job::JobContext;
use crate::message::Message;
use crate::state::{CollectorState, CollectorStats};

use super::handlers::{FinishHandler, RunningHandler, StartHandler};
use super::{HandlerContext, MessageHandler, ProcessStep};

#[derive(Debug)]
pub struct MessageProcessor {
    job: JobContext,
    verbose: bool,
    handlers: Vec<Box<dyn MessageHandler>>,
}

impl MessageProcessor {
    pub fn new(job: JobContext, verbose: bool) -> Self {
        Self {
            job,
            verbose,
            handlers: vec![
                Box::new(StartHandler),
                Box::new(RunningHandler::new()),
                Box::new(FinishHandler),
            ],
        }
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Interpret a decoded mapping and process it.
    ///
    /// A mapping that is not a valid message is logged, counted and dropped.
    pub fn process_fields(&self, state: &mut CollectorState, fields: Map) -> ProcessStep {
        match Message::try_from(fields) {
            Ok(message) => self.process(state, &message),
            Err(err) => {
                state.stats.messages += 1;
                state.stats.protocol_errors += 1;
                warn!(error = %err, "dropping malformed message");
                ProcessStep {
                    effects: Vec::new(),
                    keep_running: !state.pending.is_drained(),
                }
            }
        }
    }

    /// Run a message through the handler chain.
    pub fn process(&self, state: &mut CollectorState, message: &Message) -> ProcessStep {
        state.stats.messages += 1;
        debug!(task = %message.id(), status = message.status(), "processing message");

        let mut effects = Vec::new();
        let mut handled = false;
        {
            let mut cx = HandlerContext {
                state: &mut *state,
                job: &self.job,
                effects: &mut effects,
                verbose: self.verbose,
            };

            for handler in &self.handlers {
                match handler.handle(message, &mut cx) {
                    Ok(false) => continue,
                    Ok(true) => {
                        handled = true;
                        break;
                    }
                    Err(err) => {
                        record_rejection(&mut cx.state.stats, handler.name(), &err);
                        handled = true;
                        break;
                    }
                }
            }
        }

        if !handled {
            state.stats.protocol_errors += 1;
            warn!(
                task = %message.id(),
                status = message.status(),
                "no handler accepted message"
            );
        }

        ProcessStep {
            effects,
            keep_running: !state.pending.is_drained(),
        }
    }
}

fn record_rejection(stats: &mut CollectorStats, handler: &'static str, err: &CollectorError) {
    match err {
        CollectorError::DuplicateStart(_) => stats.duplicate_starts += 1,
        CollectorError::UnknownTask(_) => stats.unknown_tasks += 1,
        _ => stats.protocol_errors += 1,
    }
    warn!(handler, error = %err, "message dropped");
}
