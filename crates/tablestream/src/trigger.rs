//! Policies deciding when a partition's accumulated rows are flushed downstream.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::group_key::GroupKey;
use crate::table::DEFAULT_STOP_COL_LABEL;
use crate::time::{Duration, Time};

/// What a trigger knows about the partition it guards.
#[derive(Clone, Debug)]
pub struct TableContext {
    pub key: GroupKey,
    pub count: usize,
}

#[derive(Clone, Debug)]
pub struct TriggerContext {
    pub table: TableContext,
    pub watermark: Time,
    pub current_processing_time: Time,
}

pub trait Trigger: Send + fmt::Debug {
    /// Whether the partition should be flushed now. May update internal state.
    fn triggered(&mut self, ctx: &TriggerContext) -> bool;
    /// Whether the partition will never be flushed again and can be expired.
    fn finished(&self) -> bool;
    fn reset(&mut self);
}

/// Serializable description of a trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fire once the watermark passes the partition's `_stop` key value plus lateness.
    AfterWatermark {
        #[serde(default)]
        allowed_lateness: Duration,
    },
    /// Fire once processing time advanced `duration` past the first observation.
    AfterProcessingTime { duration: Duration },
    /// Fire once the partition holds at least `count` rows.
    AfterAtLeastCount { count: usize },
    /// Fire every time the inner trigger fires.
    Repeated { trigger: Box<TriggerSpec> },
    /// Fire when either fires; finish when `finally` fires.
    OrFinally {
        main: Box<TriggerSpec>,
        finally: Box<TriggerSpec>,
    },
    /// Never fire; partitions flush on finish only.
    Narrow,
}

impl Default for TriggerSpec {
    fn default() -> Self {
        TriggerSpec::AfterWatermark {
            allowed_lateness: Duration::ZERO,
        }
    }
}

impl TriggerSpec {
    pub fn build(&self) -> Box<dyn Trigger> {
        match self {
            TriggerSpec::AfterWatermark { allowed_lateness } => Box::new(AfterWatermark {
                allowed_lateness: *allowed_lateness,
                finished: false,
            }),
            TriggerSpec::AfterProcessingTime { duration } => Box::new(AfterProcessingTime {
                duration: *duration,
                deadline: None,
                finished: false,
            }),
            TriggerSpec::AfterAtLeastCount { count } => Box::new(AfterAtLeastCount {
                count: *count,
                finished: false,
            }),
            TriggerSpec::Repeated { trigger } => Box::new(Repeated {
                inner: trigger.build(),
            }),
            TriggerSpec::OrFinally { main, finally } => Box::new(OrFinally {
                main: main.build(),
                finally: finally.build(),
                finished: false,
            }),
            TriggerSpec::Narrow => Box::new(Narrow),
        }
    }
}

#[derive(Debug)]
struct AfterWatermark {
    allowed_lateness: Duration,
    finished: bool,
}

impl Trigger for AfterWatermark {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        let key = &ctx.table.key;
        let Some(idx) = key.col_idx(DEFAULT_STOP_COL_LABEL) else {
            return false;
        };
        let Ok(Some(stop)) = key.value_time(idx) else {
            return false;
        };
        if ctx.watermark >= stop.add(self.allowed_lateness) {
            self.finished = true;
        }
        self.finished
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn reset(&mut self) {
        self.finished = false;
    }
}

#[derive(Debug)]
struct AfterProcessingTime {
    duration: Duration,
    deadline: Option<Time>,
    finished: bool,
}

impl Trigger for AfterProcessingTime {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        match self.deadline {
            Some(deadline) => {
                if ctx.current_processing_time >= deadline {
                    self.finished = true;
                }
            }
            None => self.deadline = Some(ctx.current_processing_time.add(self.duration)),
        }
        self.finished
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn reset(&mut self) {
        self.deadline = None;
        self.finished = false;
    }
}

#[derive(Debug)]
struct AfterAtLeastCount {
    count: usize,
    finished: bool,
}

impl Trigger for AfterAtLeastCount {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        if ctx.table.count >= self.count {
            self.finished = true;
        }
        self.finished
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn reset(&mut self) {
        self.finished = false;
    }
}

#[derive(Debug)]
struct Repeated {
    inner: Box<dyn Trigger>,
}

impl Trigger for Repeated {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        let fired = self.inner.triggered(ctx);
        if fired {
            self.inner.reset();
        }
        fired
    }

    fn finished(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[derive(Debug)]
struct OrFinally {
    main: Box<dyn Trigger>,
    finally: Box<dyn Trigger>,
    finished: bool,
}

impl Trigger for OrFinally {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        if self.finally.triggered(ctx) {
            self.finished = true;
            return true;
        }
        self.main.triggered(ctx)
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn reset(&mut self) {
        self.main.reset();
        self.finally.reset();
        self.finished = false;
    }
}

#[derive(Debug)]
struct Narrow;

impl Trigger for Narrow {
    fn triggered(&mut self, _ctx: &TriggerContext) -> bool {
        false
    }

    fn finished(&self) -> bool {
        false
    }

    fn reset(&mut self) {}
}
