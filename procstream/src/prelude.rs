//! Common imports for procstream usage.
//!
//! ```
//! use procstream::prelude::*;
//! ```

pub use crate::command::{CollectLines, Command, CommandSpec, CommandState, Flow, FnCommand};
pub use crate::errors::Error;
pub use crate::executor::CommandExecutor;
pub use crate::filter::{ErrorFilter, FnErrorFilter};
pub use tokio_util::sync::CancellationToken;
