mod domain;
mod localpart;
mod path;
mod validator;

pub use domain::*;
pub use localpart::*;
pub use path::*;
pub use validator::*;
