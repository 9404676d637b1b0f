//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 消费引擎产生的 `SyncEvent`
//! - Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞检测链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{EventSink, SyncEvent};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherConfig, create_dispatcher};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
