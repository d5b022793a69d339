// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Yantra4D Render Engine
//!
//! Turns a `(mode, parameters)` pair into mesh artifacts using one of two
//! interchangeable strategies:
//!
//! - **Backend**: the remote render service, read as a server-sent event
//!   stream (`POST /api/render-stream`)
//! - **Local**: OpenSCAD subprocesses, one fresh private directory per part
//!
//! The strategy is probed once per [`RenderSession`] and kept until
//! [`RenderSession::reset`]. Both paths report the same
//! [`ProgressEvent`](yantra_core::ProgressEvent)s and return the same
//! [`PartArtifact`]s.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use yantra_engine::{AbortSignal, EngineConfig, RenderSession};
//! use yantra_core::{Manifest, Parameters, RenderRequest};
//!
//! let session = RenderSession::new(EngineConfig::from_env())?;
//! let manifest = Manifest::from_path("project.json")?;
//! let mut params = Parameters::new();
//! params.insert("width_units".into(), 2.into());
//!
//! let parts = session
//!     .render_parts(
//!         &RenderRequest::new("cup", params),
//!         &manifest,
//!         |event| println!("{:?}", event),
//!         AbortSignal::new(),
//!     )
//!     .await?;
//! let mesh = session.decode(&parts[0].url).await?;
//! ```

pub mod abort;
pub mod artifact;
pub mod assembly;
pub mod blob;
pub mod capability;
pub mod config;
pub mod decode;
pub mod error;
pub mod local;
pub mod remote;
pub mod session;

pub use abort::AbortSignal;
pub use artifact::{PartArtifact, ProgressSink, RenderUpdate};
pub use assembly::{AssemblyCache, ASSEMBLY_MODE};
pub use blob::BlobStore;
pub use capability::CapabilityDetector;
pub use config::{EngineConfig, ScadSource};
pub use decode::{DecodedGeometry, Geometry, MeshDecoder};
pub use error::{RenderError, Result};
pub use local::{compiler_args, CompileJob, CompilerOutput, LocalEngine, SourceCache};
pub use remote::sse::{SseDecoder, StreamEvent, StreamFrame};
pub use remote::RemoteRenderer;
pub use session::RenderSession;
