//! Parsing of `grub-editenv list` output.

/// Value of `key` in a `key=value` environment block, if set and non-empty.
pub fn lookup(block: &str, key: &str) -> Option<String> {
    block
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
