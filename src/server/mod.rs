//! HTTP surface of the gateway: public routes, login routes and the two
//! session transports behind bearer authentication.

mod listener;
mod router;

pub use listener::{shutdown_signal, Gateway};
pub use router::{build_router, AppState};
