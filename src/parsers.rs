pub mod command_parser;
pub mod common;

pub use command_parser::parse_prefixed_command;
pub use common::MessageUtils;
