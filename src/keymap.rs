//! Parsed representation of linux rc keymaps (the toml format installed
//! under /lib/udev/rc_keymaps).

use std::{fs, path::Path};
use toml::{Table, Value};

/// One protocol section of a keymap file. A file may carry several, e.g. a
/// remote with both nec and rc-6 buttons, or several remotes sharing one
/// decoder.
#[derive(PartialEq, Debug, Default)]
pub struct Keymap {
    pub name: String,
    pub protocol: String,
    pub variant: Option<String>,
    /// Decoder parameters
    pub params: Vec<(String, i64)>,
    /// scancode to keycode name
    pub scancodes: Vec<(u64, String)>,
    /// keycode names without a protocol scancode, decoded in software
    pub raw: Vec<String>,
}

/// Keys of a protocol section which are not decoder parameters
const SECTION_KEYS: &[&str] = &["name", "protocol", "variant", "scancodes", "raw"];

impl Keymap {
    pub fn parse_file(path: &Path) -> Result<Vec<Keymap>, String> {
        let contents = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;

        Keymap::parse(&contents, path)
    }

    /// Parse a toml keymap. No validation is done of keycode or protocol
    /// names; the caller resolves those.
    pub fn parse(contents: &str, filename: &Path) -> Result<Vec<Keymap>, String> {
        let top = contents
            .parse::<Table>()
            .map_err(|e| format!("{}: {e}", filename.display()))?;

        let Some(Value::Array(protocols)) = top.get("protocols") else {
            return Err(format!(
                "{}: missing top level protocols array",
                filename.display()
            ));
        };

        let mut res = Vec::new();

        for entry in protocols {
            let Some(Value::String(name)) = entry.get("name") else {
                return Err(format!("{}: missing name", filename.display()));
            };

            let Some(Value::String(protocol)) = entry.get("protocol") else {
                return Err(format!("{}: missing protocol", filename.display()));
            };

            let mut variant = None;
            if let Some(Value::String(entry)) = entry.get("variant") {
                variant = Some(entry.to_owned());
            }

            let mut params = Vec::new();
            for (key, value) in entry.as_table().unwrap() {
                if SECTION_KEYS.contains(&key.as_str()) {
                    continue;
                }

                let Value::Integer(n) = value else {
                    return Err(format!(
                        "{}: parameter {key} must be an integer",
                        filename.display()
                    ));
                };

                params.push((key.to_owned(), *n));
            }

            let mut raw = Vec::new();
            if let Some(value) = entry.get("raw") {
                let Value::Array(entries) = value else {
                    return Err(format!("{}: raw must be an array", filename.display()));
                };

                for e in entries {
                    let Some(Value::String(keycode)) = e.get("keycode") else {
                        return Err(format!("{}: raw entry missing keycode", filename.display()));
                    };

                    raw.push(keycode.to_owned());
                }
            }

            let mut scancodes = Vec::new();
            if let Some(value) = entry.get("scancodes") {
                let Value::Table(codes) = value else {
                    return Err(format!("{}: scancodes must be a table", filename.display()));
                };

                for (scancode, keycode) in codes {
                    let scancode = string_to_scancode(scancode).map_err(|_| {
                        format!("{}: {scancode} is not a valid scancode", filename.display())
                    })?;

                    let Value::String(keycode) = keycode else {
                        return Err(format!(
                            "{}: keycode for {scancode:#x} must be a string",
                            filename.display()
                        ));
                    };

                    scancodes.push((scancode, keycode.to_owned()));
                }
            }

            res.push(Keymap {
                name: name.to_owned(),
                protocol: protocol.to_owned(),
                variant,
                params,
                scancodes,
                raw,
            });
        }

        Ok(res)
    }
}

fn string_to_scancode(s: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        str::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_scancodes() {
        let s = r#"
        [[protocols]]
        name = "hauppauge"
        protocol = "rc-5"
        variant = "rc-5"
        [protocols.scancodes]
        0x1e3b = "KEY_SELECT"
        0x1e3d = "KEY_POWER2"
        "#;

        let k = Keymap::parse(s, &PathBuf::from("x.toml")).unwrap();

        assert_eq!(k.len(), 1);
        assert_eq!(k[0].name, "hauppauge");
        assert_eq!(k[0].protocol, "rc-5");
        assert_eq!(k[0].variant, Some(String::from("rc-5")));
        assert_eq!(
            k[0].scancodes,
            vec![
                (0x1e3b, String::from("KEY_SELECT")),
                (0x1e3d, String::from("KEY_POWER2"))
            ]
        );
    }

    #[test]
    fn parse_raw_and_params() {
        let s = r#"
        [[protocols]]
        name = "dish_network"
        protocol = "manchester"
        toggle_bit = 9

        [[protocols.raw]]
        keycode = "KEY_POWER"

        [[protocols.raw]]
        keycode = "KEY_MUTE"
        "#;

        let k = Keymap::parse(s, &PathBuf::from("x.toml")).unwrap();

        assert_eq!(k.len(), 1);
        assert_eq!(k[0].params, vec![(String::from("toggle_bit"), 9)]);
        assert_eq!(
            k[0].raw,
            vec![String::from("KEY_POWER"), String::from("KEY_MUTE")]
        );
    }

    #[test]
    fn parse_errors() {
        let e = Keymap::parse("protocols = 1", &PathBuf::from("x.toml")).unwrap_err();
        assert_eq!(e, "x.toml: missing top level protocols array");

        let e = Keymap::parse(
            "[[protocols]]\nname = \"x\"\nprotocol = \"nec\"\n[protocols.scancodes]\n\"zz\" = \"KEY_0\"",
            &PathBuf::from("x.toml"),
        )
        .unwrap_err();
        assert_eq!(e, "x.toml: zz is not a valid scancode");
    }
}
