//! Streaming, group-key partitioned table transformations.
//!
//! Upstream operators push [`Table`]s into [`Transformation`]s. A transformation reads each
//! table chunk by chunk, accumulates output per [`GroupKey`] in its [`Dataset`]'s
//! [`TableBuilderCache`], and the dataset flushes finished partitions downstream as watermarks
//! advance or when its parents finish.

#![forbid(unsafe_code)]

pub mod array;
pub mod bitmap;
pub mod builder;
pub mod cache;
pub mod collect;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod fan_in;
pub mod group_key;
pub mod group_lookup;
pub mod narrow_state;
pub mod registry;
pub mod table;
pub mod time;
pub mod transformation;
pub mod trigger;
pub mod types;
pub mod union;
pub mod window;
pub mod window_transform;

pub use builder::TableBuilder;
pub use cache::{BuilderEntry, TableBuilderCache};
pub use collect::ResultCollector;
pub use config::{AccumulationMode, ExecuteOptions};
pub use context::{CancellationToken, ExecutionContext};
pub use dataset::{Dataset, DatasetId, PassthroughDataset, TransportDataset};
pub use error::{Code, Error, Result};
pub use fan_in::{FanIn, FanInHandle};
pub use group_key::{GroupKey, GroupKeyBuilder};
pub use group_lookup::GroupLookup;
pub use narrow_state::{NarrowStateProcessor, NarrowStateTransformation};
pub use registry::{ProcedureSpec, TransformationRegistry, UnionSpec};
pub use table::{BufferedTable, ColReader, EmptyTable, Table};
pub use time::{Duration, Time};
pub use transformation::{
    Message, NarrowProcessor, NarrowTransformation, Transformation, TransformationSet,
};
pub use trigger::TriggerSpec;
pub use types::{ColMeta, ColType, Value};
pub use union::UnionTransformation;
pub use window::{Bounds, Window};
pub use window_transform::{FixedWindowTransformation, WindowSpec};
