//! The "saved" persistent-default mode one-time boot depends on.
//!
//! Without `GRUB_DEFAULT=saved` the bootloader ignores the saved entry, so a
//! one-time boot never reverts to the protected kernel.

use std::fs;
use std::path::Path;

const DEFAULT_KEY: &str = "GRUB_DEFAULT";
const SAVED_LINE: &str = "GRUB_DEFAULT=saved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickyDefault {
    AlreadySaved,
    /// The file was rewritten; the bootloader configuration must be
    /// regenerated.
    Amended,
    /// No defaults file exists; nothing was changed.
    MissingFile,
}

/// Whether the defaults text already selects saved mode.
#[must_use]
pub fn is_saved_mode(contents: &str) -> bool {
    contents
        .lines()
        .rev()
        .filter_map(default_value)
        .next()
        .is_some_and(|value| value == "saved")
}

/// Make sure `defaults_file` selects saved mode, amending it in place.
///
/// The previous contents are kept next to it with a `.kbisect.bak` suffix.
///
/// # Errors
///
/// Returns I/O errors from reading or writing the file.
pub fn ensure_saved_default(defaults_file: &Path) -> std::io::Result<StickyDefault> {
    if !defaults_file.exists() {
        return Ok(StickyDefault::MissingFile);
    }
    let contents = fs::read_to_string(defaults_file)?;
    if is_saved_mode(&contents) {
        return Ok(StickyDefault::AlreadySaved);
    }

    let mut backup = defaults_file.as_os_str().to_owned();
    backup.push(".kbisect.bak");
    fs::write(&backup, &contents)?;
    fs::write(defaults_file, amend(&contents))?;
    Ok(StickyDefault::Amended)
}

fn amend(contents: &str) -> String {
    let mut replaced = false;
    let mut out = String::with_capacity(contents.len() + SAVED_LINE.len() + 1);
    for line in contents.lines() {
        if default_value(line).is_some() {
            if !replaced {
                out.push_str(SAVED_LINE);
                out.push('\n');
                replaced = true;
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    if !replaced {
        out.push_str(SAVED_LINE);
        out.push('\n');
    }
    out
}

/// Unquoted value of an uncommented `GRUB_DEFAULT=` assignment.
fn default_value(line: &str) -> Option<&str> {
    let (key, value) = line.trim().split_once('=')?;
    (key.trim() == DEFAULT_KEY).then(|| value.trim().trim_matches(|c| c == '"' || c == '\''))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn recognizes_quoted_saved_mode() {
        assert!(is_saved_mode("GRUB_TIMEOUT=5\nGRUB_DEFAULT=\"saved\"\n"));
        assert!(!is_saved_mode("GRUB_DEFAULT=0\n"));
        assert!(!is_saved_mode("# GRUB_DEFAULT=saved\nGRUB_DEFAULT=0\n"));
        assert!(!is_saved_mode("GRUB_DEFAULT=saved\nGRUB_DEFAULT=0\n"));
    }

    #[test]
    fn amends_existing_assignment_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("grub");
        fs::write(&file, "GRUB_TIMEOUT=5\nGRUB_DEFAULT=0\nGRUB_CMDLINE_LINUX=\"quiet\"\n")
            .expect("write");

        assert_eq!(ensure_saved_default(&file).expect("amend"), StickyDefault::Amended);
        assert_eq!(
            fs::read_to_string(&file).expect("read"),
            "GRUB_TIMEOUT=5\nGRUB_DEFAULT=saved\nGRUB_CMDLINE_LINUX=\"quiet\"\n"
        );
        assert!(dir.path().join("grub.kbisect.bak").exists());
        assert_eq!(
            ensure_saved_default(&file).expect("second pass"),
            StickyDefault::AlreadySaved
        );
    }

    #[test]
    fn appends_when_no_assignment_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("grub");
        fs::write(&file, "GRUB_TIMEOUT=5\n# GRUB_DEFAULT=0\n").expect("write");

        ensure_saved_default(&file).expect("amend");
        assert_eq!(
            fs::read_to_string(&file).expect("read"),
            "GRUB_TIMEOUT=5\n# GRUB_DEFAULT=0\nGRUB_DEFAULT=saved\n"
        );
    }

    #[test]
    fn missing_file_is_reported_not_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("grub");
        assert_eq!(
            ensure_saved_default(&file).expect("probe"),
            StickyDefault::MissingFile
        );
        assert!(!file.exists());
    }
}
