//! The IR protocols the kernel rc subsystem knows about, and how they are
//! named in sysfs.

use bitflags::bitflags;

bitflags! {
    /// Set of kernel IR protocols. One bit per protocol the rc sysfs
    /// interface can name; the bit assignment is stable within a run and
    /// round-trips through [`parse`] and [`protocol_names`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Protocols: u32 {
        const UNKNOWN = 1 << 0;
        const OTHER = 1 << 1;
        const LIRC = 1 << 2;
        const RC5 = 1 << 3;
        const RC5_SZ = 1 << 4;
        const JVC = 1 << 5;
        const SONY = 1 << 6;
        const NEC = 1 << 7;
        const SANYO = 1 << 8;
        const MCE_KBD = 1 << 9;
        const RC6 = 1 << 10;
        const SHARP = 1 << 11;
        const XMP = 1 << 12;
        const CEC = 1 << 13;
        const IMON = 1 << 14;
        const RC_MM = 1 << 15;
        const XBOX_DVD = 1 << 16;
    }
}

pub struct ProtocolMapEntry {
    /// Canonical protocol name as the kernel writes it
    pub name: &'static str,
    /// sysfs node name for per-protocol decoder directories (v1 interface)
    pub sysfs1_name: Option<&'static str>,
    /// Protocol bit. Empty for names which are accepted but have no
    /// corresponding sysfs protocol of their own (protocol variants).
    pub protocols: Protocols,
}

pub const PROTOCOL_MAP: &[ProtocolMapEntry] = &[
    ProtocolMapEntry {
        name: "unknown",
        sysfs1_name: None,
        protocols: Protocols::UNKNOWN,
    },
    ProtocolMapEntry {
        name: "other",
        sysfs1_name: None,
        protocols: Protocols::OTHER,
    },
    ProtocolMapEntry {
        name: "lirc",
        sysfs1_name: None,
        protocols: Protocols::LIRC,
    },
    ProtocolMapEntry {
        name: "rc-5",
        sysfs1_name: Some("rc5_decoder"),
        protocols: Protocols::RC5,
    },
    ProtocolMapEntry {
        name: "rc-5x",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "rc-5-sz",
        sysfs1_name: None,
        protocols: Protocols::RC5_SZ,
    },
    ProtocolMapEntry {
        name: "jvc",
        sysfs1_name: Some("jvc_decoder"),
        protocols: Protocols::JVC,
    },
    ProtocolMapEntry {
        name: "sony",
        sysfs1_name: Some("sony_decoder"),
        protocols: Protocols::SONY,
    },
    ProtocolMapEntry {
        name: "sony12",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "sony15",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "sony20",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "nec",
        sysfs1_name: Some("nec_decoder"),
        protocols: Protocols::NEC,
    },
    ProtocolMapEntry {
        name: "sanyo",
        sysfs1_name: None,
        protocols: Protocols::SANYO,
    },
    ProtocolMapEntry {
        name: "mce_kbd",
        sysfs1_name: None,
        protocols: Protocols::MCE_KBD,
    },
    ProtocolMapEntry {
        name: "rc-6",
        sysfs1_name: Some("rc6_decoder"),
        protocols: Protocols::RC6,
    },
    ProtocolMapEntry {
        name: "rc-6-0",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "rc-6-6a-20",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "rc-6-6a-24",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "rc-6-6a-32",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "rc-6-mce",
        sysfs1_name: None,
        protocols: Protocols::empty(),
    },
    ProtocolMapEntry {
        name: "sharp",
        sysfs1_name: None,
        protocols: Protocols::SHARP,
    },
    ProtocolMapEntry {
        name: "xmp",
        sysfs1_name: Some("xmp_decoder"),
        protocols: Protocols::XMP,
    },
    ProtocolMapEntry {
        name: "cec",
        sysfs1_name: None,
        protocols: Protocols::CEC,
    },
    ProtocolMapEntry {
        name: "imon",
        sysfs1_name: None,
        protocols: Protocols::IMON,
    },
    ProtocolMapEntry {
        name: "rc-mm",
        sysfs1_name: None,
        protocols: Protocols::RC_MM,
    },
    ProtocolMapEntry {
        name: "xbox-dvd",
        sysfs1_name: None,
        protocols: Protocols::XBOX_DVD,
    },
];

/// Match protocol names without regard for dashes, underscores or case, so
/// "RC_5", "rc-5" and "rc5" all name the same protocol.
fn name_like(a: &str, b: &str) -> bool {
    let relaxed = |name: &str| -> String {
        name.chars()
            .filter_map(|ch| {
                if matches!(ch, '-' | '_') {
                    None
                } else {
                    Some(ch.to_ascii_lowercase())
                }
            })
            .collect()
    };

    relaxed(a) == relaxed(b)
}

/// Look up a protocol name in the catalog. Returns `None` both for names the
/// catalog does not know and for variant names which carry no sysfs protocol
/// bit; callers treat such names as candidate BPF decoders.
pub fn parse(name: &str, all_allowed: bool) -> Option<Protocols> {
    if all_allowed && name.eq_ignore_ascii_case("all") {
        return Some(Protocols::all());
    }

    let entry = PROTOCOL_MAP.iter().find(|e| name_like(name, e.name))?;

    if entry.protocols.is_empty() {
        None
    } else {
        Some(entry.protocols)
    }
}

/// Canonical names for every bit set in `mask`, in catalog order. Each
/// catalog entry consumes its bits from a working copy, so aliases never
/// produce the same name twice.
pub fn protocol_names(mask: Protocols) -> Vec<&'static str> {
    let mut remaining = mask;
    let mut names = Vec::new();

    for entry in PROTOCOL_MAP {
        if !entry.protocols.is_empty() && remaining.contains(entry.protocols) {
            names.push(entry.name);
            remaining.remove(entry.protocols);
        }
    }

    names
}

/// Names for the `rc_proto` values the lirc scancode interface reports.
/// These are protocol variants, so they do not map onto [`Protocols`] bits.
const LIRC_PROTOCOL_NAMES: &[&str] = &[
    "unknown", "other", "rc-5", "rc-5x-20", "rc-5-sz", "jvc", "sony-12", "sony-15", "sony-20",
    "nec", "nec-x", "nec-32", "sanyo", "mcir2-kbd", "mcir2-mse", "rc-6-0", "rc-6-6a-20",
    "rc-6-6a-24", "rc-6-6a-32", "rc-6-mce", "sharp", "xmp", "cec", "imon", "rc-mm-12", "rc-mm-24",
    "rc-mm-32", "xbox-dvd",
];

/// Name of a `rc_proto` value from a lirc scancode event, if known
pub fn lirc_protocol_name(rc_proto: u16) -> Option<&'static str> {
    LIRC_PROTOCOL_NAMES.get(usize::from(rc_proto)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_separator_and_case_insensitive() {
        assert_eq!(parse("rc-5", false), Some(Protocols::RC5));
        assert_eq!(parse("RC_5", false), Some(Protocols::RC5));
        assert_eq!(parse("rc5", false), Some(Protocols::RC5));
        assert_eq!(parse("Mce-Kbd", false), Some(Protocols::MCE_KBD));
        assert_eq!(parse("XBOX_DVD", false), Some(Protocols::XBOX_DVD));
    }

    #[test]
    fn parse_all() {
        assert_eq!(parse("all", true), Some(Protocols::all()));
        assert_eq!(parse("ALL", true), Some(Protocols::all()));
        assert_eq!(parse("all", false), None);
    }

    #[test]
    fn variants_have_no_bit() {
        for name in [
            "rc-5x",
            "sony12",
            "sony15",
            "sony20",
            "rc-6-0",
            "rc-6-6a-20",
            "rc-6-6a-24",
            "rc-6-6a-32",
            "rc-6-mce",
        ] {
            assert_eq!(parse(name, false), None, "{name}");
        }

        assert_eq!(parse("manchester", false), None);
    }

    #[test]
    fn names_round_trip() {
        for entry in PROTOCOL_MAP {
            if entry.protocols.is_empty() {
                continue;
            }

            let names = protocol_names(entry.protocols);
            assert_eq!(names, vec![entry.name]);
            assert_eq!(parse(names[0], false), Some(entry.protocols));
        }
    }

    #[test]
    fn names_consume_bits() {
        let names = protocol_names(Protocols::NEC | Protocols::RC5 | Protocols::RC6);
        assert_eq!(names, vec!["rc-5", "nec", "rc-6"]);

        assert!(protocol_names(Protocols::empty()).is_empty());
    }

    #[test]
    fn lirc_protocol_names() {
        assert_eq!(lirc_protocol_name(9), Some("nec"));
        assert_eq!(lirc_protocol_name(27), Some("xbox-dvd"));
        assert_eq!(lirc_protocol_name(28), None);
    }
}
