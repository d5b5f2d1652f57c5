//! Domain models for pipeport.
//!
//! # Catalog
//!
//! - [`Project`]: top-level container addressed by its key.
//! - [`Pipeline`], [`Environment`]: project-scoped entities an import can
//!   reference but never creates.
//! - [`Group`]: global permission groups.
//! - [`Application`]: what an import creates, together with its [`Hook`]s,
//!   [`Poller`]s, [`Notification`]s and [`PipelineTrigger`]s.
//!
//! # Import input and feedback
//!
//! - [`ApplicationDescriptor`]: the decoded, name-only description of an application.
//! - [`Message`]: a localizable diagnostic produced while importing.

mod application;
mod descriptor;
mod message;
mod project;

pub use application::*;
pub use descriptor::*;
pub use message::*;
pub use project::*;
