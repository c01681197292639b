//! Parse /etc/rc_maps.cfg. This file associates a driver and default keymap
//! name with the keymap file to load for it.

use std::fs::File;
use std::io::{BufRead, BufReader, Error, ErrorKind};
use std::path::{Path, PathBuf};

/// Directory for keymaps installed by the administrator
pub const IR_KEYTABLE_USER_DIR: &str = "/etc/rc_keymaps";
/// Directory for keymaps installed by the distribution
pub const IR_KEYTABLE_SYSTEM_DIR: &str = "/lib/udev/rc_keymaps";

/// Entry for keymap mapping
#[derive(Debug)]
pub struct KeymapTable {
    /// Name of the driver to match ("*" for any)
    pub driver: String,
    /// Name of the default keymap to match ("*" for any)
    pub table: String,
    /// Path of keymap to load
    pub file: String,
}

impl KeymapTable {
    /// Case-insensitive match against a device's driver and default keymap
    /// names. Either may be absent on exotic devices; an absent name only
    /// matches the "*" pattern.
    pub fn matches(&self, driver: Option<&str>, default_keymap: Option<&str>) -> bool {
        let like = |pattern: &str, name: Option<&str>| {
            pattern == "*" || name.is_some_and(|name| pattern.eq_ignore_ascii_case(name))
        };

        like(&self.driver, driver) && like(&self.table, default_keymap)
    }
}

/// Parse /etc/rc_maps.cfg. A malformed line fails the whole file; a config
/// which silently dropped rules would misconfigure devices.
pub fn parse_rc_maps_file(path: &Path) -> Result<Vec<KeymapTable>, Error> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut res = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;

        let line = line.trim_start();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let elements: Vec<_> = line.split_whitespace().collect();

        if elements.len() != 3 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "{}:{}: error: invalid parameters",
                    path.display(),
                    line_no + 1
                ),
            ));
        }

        res.push(KeymapTable {
            driver: elements[0].to_owned(),
            table: elements[1].to_owned(),
            file: elements[2].to_owned(),
        });
    }

    Ok(res)
}

/// Resolve a keymap filename from rc_maps.cfg: explicit paths are used as-is,
/// anything else is looked up in the user then the system keymap directory.
pub fn keymap_to_filename(filename: &str) -> Result<PathBuf, String> {
    if filename.starts_with('/') || (filename.starts_with('.') && filename.contains('/')) {
        return Ok(PathBuf::from(filename));
    }

    for dir in [IR_KEYTABLE_USER_DIR, IR_KEYTABLE_SYSTEM_DIR] {
        let path = Path::new(dir).join(filename);

        if path.exists() {
            return Ok(path);
        }
    }

    Err(format!(
        "unable to find keymap {filename} in {IR_KEYTABLE_USER_DIR} or {IR_KEYTABLE_SYSTEM_DIR}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bad() {
        let e = parse_rc_maps_file(&PathBuf::from("testdata/rc_maps_cfg/bad.cfg")).unwrap_err();

        assert_eq!(
            format!("{e}"),
            "testdata/rc_maps_cfg/bad.cfg:4: error: invalid parameters"
        );
    }

    #[test]
    fn parse_good() {
        let t = parse_rc_maps_file(&PathBuf::from("testdata/rc_maps_cfg/ttusbir.cfg")).unwrap();

        assert_eq!(t.len(), 2);

        assert!(t[0].matches(Some("ttusbir"), Some("rc-empty")));
        assert!(t[1].matches(Some("ttusbir"), Some("rc-empty")));

        assert!(!t[0].matches(Some("ttusbi"), Some("rc-empty")));
        assert!(t[1].matches(Some("ttusbi"), Some("rc-empty")));
    }

    #[test]
    fn matches_case_insensitive() {
        let rule = KeymapTable {
            driver: String::from("em28xx"),
            table: String::from("*"),
            file: String::from("f.toml"),
        };

        assert!(rule.matches(Some("EM28xx"), Some("anything")));
        assert!(rule.matches(Some("em28xx"), None));
        assert!(!rule.matches(Some("saa7134"), Some("anything")));
        assert!(!rule.matches(None, Some("anything")));

        let any = KeymapTable {
            driver: String::from("*"),
            table: String::from("*"),
            file: String::from("f.toml"),
        };

        assert!(any.matches(None, None));
        assert!(any.matches(Some("em28xx"), Some("rc-hauppauge")));
    }

    #[test]
    fn explicit_paths_resolve_as_is() {
        assert_eq!(
            keymap_to_filename("/tmp/x.toml").unwrap(),
            PathBuf::from("/tmp/x.toml")
        );
        assert_eq!(
            keymap_to_filename("./x.toml").unwrap(),
            PathBuf::from("./x.toml")
        );

        assert!(keymap_to_filename("no-such-keymap-file.toml").is_err());
    }
}
