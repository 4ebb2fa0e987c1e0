//! UAVTalk telemetry protocol engine.
//!
//! UAVTalk exchanges strongly-typed "objects" between a ground station and a
//! flight controller over an unreliable byte stream. This crate provides the
//! protocol core, independent of any particular transport:
//!
//! # Features
//!
//! - **Framing**: resumable decoder tolerant of arbitrary chunking, CRC-8 validated
//! - **Schema-driven codec**: object layouts built at runtime from JSON definitions
//! - **Metadata objects**: synthesized for every definition, with typed flag access
//! - **Request correlation**: one outstanding request per object, retried until answered
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use uavtalk::{Driver, ManagerConfig, loader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = tokio::net::TcpStream::connect("127.0.0.1:9000").await?;
//!     let (reader, writer) = link.into_split();
//!     let (manager, driver) = Driver::connect(ManagerConfig::default(), reader, writer)?;
//!
//!     loader::load_directory(&manager, "definitions/", || println!("definitions loaded")).await?;
//!
//!     let attitude = manager.fetch("AttitudeActual", false).await?;
//!     println!("roll = {:?}", attitude.get("Roll"));
//!
//!     driver.shutdown();
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod codec;
pub mod crc;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Protocol engine
pub mod config;
pub mod manager;
pub mod protocol;
pub mod registry;

// Collaborators
pub mod driver;
pub mod loader;
pub mod scheduler;
pub mod sink;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::ManagerConfig;
pub use driver::{Driver, DriverHandle};
pub use manager::{GetObject, ManagerStats, ObjectManager, RequestHandle};
pub use protocol::{ChecksumPolicy, Frame, FrameDecoder, FrameType};
pub use registry::{LoadTracker, LoadUnit, ObjectKey, ObjectTable};
pub use scheduler::{Scheduler, TimerHandle, TokioScheduler};
pub use sink::{ByteSink, ChannelSink};
