use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// Build an `obsidian://open` URI for a note in the configured vault.
/// Pure string construction; the note's `.md` extension is dropped because
/// the app addresses notes by bare path.
pub fn obsidian_open_uri(vault: &str, note_name: &str) -> String {
    let file = note_name.strip_suffix(".md").unwrap_or(note_name);

    format!(
        "obsidian://open?vault={}&file={}",
        utf8_percent_encode(vault, NON_ALPHANUMERIC),
        utf8_percent_encode(file, NON_ALPHANUMERIC)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markdown_extension() {
        assert_eq!(
            obsidian_open_uri("Notes", "daily.md"),
            "obsidian://open?vault=Notes&file=daily"
        );
    }

    #[test]
    fn test_encodes_spaces_and_separators() {
        let uri = obsidian_open_uri("My Vault", "projects/road map.md");

        assert_eq!(
            uri,
            "obsidian://open?vault=My%20Vault&file=projects%2Froad%20map"
        );
    }

    #[test]
    fn test_non_markdown_name_is_kept_whole() {
        assert_eq!(
            obsidian_open_uri("v", "readme"),
            "obsidian://open?vault=v&file=readme"
        );
    }
}
