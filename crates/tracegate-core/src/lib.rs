#![allow(clippy::pedantic)]
#![allow(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod cancel;
pub mod client;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod events;
pub mod guard;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod settings;
pub mod transport;

pub use crate::auth::*;
pub use crate::cancel::*;
pub use crate::client::*;
pub use crate::constants::*;
pub use crate::envelope::*;
pub use crate::error::*;
pub use crate::events::*;
pub use crate::guard::*;
pub use crate::pipeline::*;
pub use crate::refresh::*;
pub use crate::session::*;
pub use crate::settings::*;
pub use crate::transport::*;
