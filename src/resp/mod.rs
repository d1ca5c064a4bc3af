pub(crate) mod decode;
mod value;

pub use decode::{parse_command, Decoder};
pub use value::{ParseError, Value};

pub type Result<T> = std::result::Result<T, ParseError>;
