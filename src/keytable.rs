//! In-memory scancode to keycode table, accumulated from keymap files,
//! command line arguments and auto-load matches before it is written to the
//! kernel in one pass.

use crate::{
    keymap::Keymap,
    protocols::{self, Protocols},
};
use evdev::Key;
use std::str::FromStr;

/// One scancode to keycode binding destined for the kernel keytable
#[derive(Debug, PartialEq)]
pub struct KeytableEntry {
    pub scancode: u64,
    pub keycode: u32,
}

/// A binding without a protocol scancode. It has been assigned a synthetic
/// scancode which the software decoder will report.
#[derive(Debug, PartialEq)]
pub struct RawEntry {
    pub scancode: u64,
    pub keycode: u32,
}

/// A protocol which no kernel decoder handles; a BPF program attached to the
/// lirc device decodes it instead.
#[derive(Debug, PartialEq)]
pub struct BpfProtocol {
    pub name: String,
    pub param: Vec<(String, i64)>,
}

/// Everything one invocation accumulates before touching the device
#[derive(Default)]
pub struct Keytable {
    pub entries: Vec<KeytableEntry>,
    pub raw: Vec<RawEntry>,
    pub bpf: Vec<BpfProtocol>,
    /// Kernel protocols requested by keymaps or --protocol
    pub protocols: Protocols,
    /// --parameter values, applied to every BPF protocol
    pub params: Vec<(String, i64)>,
    next_raw_scancode: u64,
}

impl Keytable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a BPF protocol unless an equivalent request is already pending.
    /// A keymap may list the same protocol several times with different
    /// scancodes because two remotes share a decoder; one program suffices.
    pub fn add_bpf_protocol(&mut self, new: BpfProtocol) {
        let exists = self.bpf.iter().any(|b| {
            b.name == new.name
                && params_subset(&b.param, &new.param)
                && params_subset(&new.param, &b.param)
        });

        if !exists {
            self.bpf.push(new);
        }
    }

    /// Merge one parsed keymap into the table. Entries with unresolvable
    /// keycodes are skipped with a diagnostic; they do not fail the merge.
    pub fn merge(&mut self, keymap: &Keymap, filename: &str) {
        match protocols::parse(&keymap.protocol, false) {
            Some(protocol) => self.protocols |= protocol,
            None => {
                if keymap.protocol != "none" {
                    self.add_bpf_protocol(BpfProtocol {
                        name: keymap.protocol.clone(),
                        param: keymap.params.clone(),
                    });
                }
            }
        }

        for (scancode, keycode) in &keymap.scancodes {
            let Some(value) = resolve_keycode(keycode) else {
                log::warn!(
                    "{filename}: keycode `{keycode}' not recognised, no mapping for scancode {scancode:#06x}"
                );
                continue;
            };

            self.entries.push(KeytableEntry {
                scancode: *scancode,
                keycode: value,
            });
        }

        for keycode in &keymap.raw {
            let Some(value) = resolve_keycode(keycode) else {
                log::warn!("{filename}: keycode `{keycode}' not recognised, no mapping");
                continue;
            };

            // Raw entries have no scancode of their own; assign a unique one
            // so several keymaps with raw entries can coexist.
            let scancode = self.next_raw_scancode;
            self.next_raw_scancode += 1;

            self.entries.push(KeytableEntry {
                scancode,
                keycode: value,
            });
            self.raw.push(RawEntry {
                scancode,
                keycode: value,
            });
        }
    }

    /// Merge a `scancode=keycode[,scancode=keycode..]` command line argument.
    /// Unlike keymap files, a malformed pair here fails the invocation.
    pub fn merge_inline(&mut self, arg: &str) -> Result<(), String> {
        for pair in arg.split([',', ';']) {
            let Some((scancode, keycode)) = pair.split_once(['=', ':']) else {
                return Err(format!("missing keycode: {pair}"));
            };

            let scancode =
                parse_number(scancode).map_err(|_| format!("invalid scancode: {scancode}"))?;

            let keycode =
                resolve_keycode(keycode).ok_or_else(|| format!("unknown keycode: {keycode}"))?;

            self.entries.push(KeytableEntry { scancode, keycode });
        }

        Ok(())
    }

    /// Replace requested protocols the kernel has no decoder for with a BPF
    /// decoder where we have one. Returns the mask with the replaced
    /// protocols removed.
    pub fn bpf_for_unsupported(&mut self, requested: Protocols, supported: Protocols) -> Protocols {
        let mut requested = requested;

        // So far the only BPF replacement shipped is for xbox-dvd
        if requested.contains(Protocols::XBOX_DVD) && !supported.contains(Protocols::XBOX_DVD) {
            self.add_bpf_protocol(BpfProtocol {
                name: String::from("xbox-dvd"),
                param: Vec::new(),
            });

            requested.remove(Protocols::XBOX_DVD);
        }

        requested
    }

    /// Parameters for one BPF protocol: command line parameters take
    /// precedence over the keymap's own
    pub fn merged_params(&self, bpf: &BpfProtocol) -> Vec<(String, i64)> {
        let mut merged = self.params.clone();

        for (name, value) in &bpf.param {
            if !merged.iter().any(|(n, _)| n == name) {
                merged.push((name.clone(), *value));
            }
        }

        merged
    }
}

fn params_subset(a: &[(String, i64)], b: &[(String, i64)]) -> bool {
    a.iter().all(|p| b.contains(p))
}

/// Parse a `name=value[,name=value..]` decoder parameter argument
pub fn parse_params(arg: &str) -> Result<Vec<(String, i64)>, String> {
    let mut params = Vec::new();

    for pair in arg.split([',', ';']) {
        let Some((name, value)) = pair.split_once(['=', ':']) else {
            return Err(format!("missing value: {pair}"));
        };

        let value = parse_number(value)
            .map(|v| v as i64)
            .map_err(|_| format!("invalid value: {value}"))?;

        params.push((name.to_owned(), value));
    }

    Ok(params)
}

/// Resolve a keycode, either a symbolic name like KEY_POWER or an integer
pub fn resolve_keycode(keycode: &str) -> Option<u32> {
    if let Ok(key) = Key::from_str(keycode) {
        return Some(key.code().into());
    }

    parse_number(keycode).ok().and_then(|v| v.try_into().ok())
}

/// Integer literal in any base: 0x hex, 0o or a leading zero octal,
/// 0b binary, decimal otherwise
pub fn parse_number(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        u64::from_str_radix(oct, 8)
    } else if let Some(bin) = s.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else if s.len() > 1 && s.starts_with('0') {
        u64::from_str_radix(&s[1..], 8)
    } else {
        s.parse()
    }
}
