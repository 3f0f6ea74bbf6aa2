//! fnsync-validate — pre-flight legality checks over the wanted state.
//!
//! Everything here runs before any side effect: a validation failure
//! aborts the whole release with nothing partially applied. The only
//! network traffic is [`secrets::secrets_are_valid`], which resolves
//! symbolic secret references while it checks them.

pub mod endpoints;
pub mod error;
pub mod ids;
pub mod secrets;

mod resources;
mod triggers;

pub use endpoints::{endpoints_are_unique, endpoints_are_valid};
pub use error::{ValidationError, ValidationResult};
pub use ids::function_ids_are_valid;
pub use secrets::secrets_are_valid;
