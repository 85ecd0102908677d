#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
}

/// Reads the command name out of `<prefix><name> [...]`; anything after the
/// name is ignored. Returns `None` when the
/// message does not start with the prefix or the prefix is not directly
/// followed by a word, so mention markup like `<#123>` or `<@42>` is not
/// mistaken for a command.
pub fn parse_prefixed_command(prefix: &str, content: &str) -> Option<ParsedCommand> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    if !rest.starts_with(char::is_alphanumeric) {
        return None;
    }

    let name = rest.split_whitespace().next()?.to_string();
    Some(ParsedCommand { name })
}
