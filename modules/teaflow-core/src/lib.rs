//! Model-Update-Command runtime.
//!
//! A pure [`Updater`] turns `(message, state)` into a new state plus a set of
//! commands. A [`Resolver`] turns each command into more messages, which loop
//! back into the updater. A [`Component`] runs that loop once and shares its
//! [`Snapshot`] sequence with every subscriber.
//!
//! ```ignore
//! let env = Env::new(initializer, resolver, updater, Scope::new())
//!     .with_share_options(ShareOptions::from_env()?);
//! let component = Component::new(env);
//! let mut snapshots = component.subscribe(messages);
//! ```

pub mod combinators;
pub mod component;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod recorder;
pub mod scope;
pub mod snapshot;
pub mod traits;

mod engine;
mod multicast;
mod rendezvous;
mod share;

pub use combinators::{EffectExt, Isolated, ResolverExt, UpdateExt};
pub use component::{Component, SnapshotStream, StateStream, States};
pub use config::{ShareOptions, Started};
pub use context::Context;
pub use env::Env;
pub use error::ComponentError;
pub use recorder::SnapshotRecorder;
pub use scope::Scope;
pub use snapshot::{Commands, Initial, Messages, Snapshot};
pub use traits::{CommandLike, Initializer, Interceptor, MessageLike, Resolver, StateLike, Updater};
