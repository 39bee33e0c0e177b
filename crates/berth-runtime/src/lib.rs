//! berth-runtime: ground truth about containers on this host.
//!
//! [`RuntimeObserver`] answers three questions: which containers are running,
//! what does a container look like right now, and what is happening (a live
//! stream of lifecycle events). [`DockerClient`] answers them from the Docker
//! Engine API; [`MemoryRuntime`] answers them from an in-process table for
//! tests.
//!
//! # Event stream
//!
//! ```text
//! GET /events  →  {"status":"start","id":"…"}{"Type":"container","Action":"stop",…}…
//!                 └─ EventDecoder (incremental, survives frame splits)
//!                    └─ LifecycleEvent { container_id, kind }
//! ```

pub mod docker;
pub mod error;
pub mod events;
pub mod memory;
pub mod observer;

pub use docker::DockerClient;
pub use error::{RuntimeError, RuntimeResult};
pub use events::EventDecoder;
pub use memory::MemoryRuntime;
pub use observer::{EventStream, RuntimeFuture, RuntimeObserver};
