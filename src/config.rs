pub use self::parser::{Config, LogFormat, LoggingConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
