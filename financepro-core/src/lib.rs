pub mod amount;
pub mod decode;
pub mod errors;
pub mod models;
pub mod session;

pub use amount::*;
pub use decode::*;
pub use errors::*;
pub use models::*;
pub use session::*;
