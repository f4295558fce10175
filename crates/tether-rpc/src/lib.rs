//! Core of the tether command server.
//!
//! A controller sends newline-delimited JSON requests naming a method and
//! positional parameters. The [`Dispatcher`] resolves the method in a
//! [`MethodTable`] and routes the outcome to a single [`Outbound`] writer.
//! Methods either answer inline or receive a [`Completion`] they settle later,
//! possibly from another thread.
//!
//! Long-lived resources live in a [`ResourceRegistry`] inside host state owned
//! by a [`HostLoop`]. Other threads reach that state only by posting work
//! through a [`Bridge`]; [`HostMethods`] wires methods up that way.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use tether_rpc::{Dispatcher, MethodTable, Outbound};
//!
//! let mut table = MethodTable::new();
//! table.register("ping", |_| Ok(json!("pong")));
//! let (outbound, writer) = Outbound::spawn(std::io::stdout())?;
//! let dispatcher = Dispatcher::new(Arc::new(table), outbound.clone());
//! dispatcher.dispatch_line(br#"{"id":1,"method":"ping"}"#);
//! outbound.close();
//! writer.join()?;
//! # Ok::<(), tether_rpc::OutboundError>(())
//! ```

mod bridge;
mod completion;
mod dispatch;
mod errors;
mod host;
mod methods;
mod outbound;
mod params;
mod protocol;
mod registry;
mod shutdown;
mod unwind;

pub use bridge::{Bridge, BridgeError, HostLoop, HostState, RunOutcome, Work};
pub use completion::{Completion, CompletionError};
pub use dispatch::{DEFAULT_MAX_REQUEST_BYTES, DISPATCH_TARGET, DispatchOutcome, Dispatcher};
pub use errors::{DispatchError, MethodError};
pub use host::HostMethods;
pub use methods::{AsyncHandler, Method, MethodKind, MethodTable, SyncHandler};
pub use outbound::{Outbound, OutboundError, ResponseReceiver, WriterHandle};
pub use params::Params;
pub use protocol::{ErrorCode, ErrorObject, Outcome, Request, RequestId, Response, Version};
pub use registry::{Handle, HandleAllocator, RegistryError, ResourceRegistry};
pub use shutdown::ShutdownSignal;
