use once_cell::sync::Lazy;
use regex::Regex;

static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#(\d+)>").expect("channel mention regex is valid"));

pub struct MessageUtils;

impl MessageUtils {
    /// Channel ids referenced as `<#id>` in `content`, first occurrence
    /// first, without repeats.
    pub fn extract_channel_mentions(content: &str) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::new();
        for capture in CHANNEL_MENTION.captures_iter(content) {
            let Some(id) = capture.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) else {
                continue;
            };
            if id != 0 && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// A raw channel id typed on its own, e.g. `123456789012345678`.
    pub fn parse_channel_id(content: &str) -> Option<u64> {
        content.trim().parse::<u64>().ok().filter(|id| *id != 0)
    }

    pub fn is_keyword(content: &str, keyword: &str) -> bool {
        content.trim().eq_ignore_ascii_case(keyword)
    }
}
