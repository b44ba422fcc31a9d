//! HID keycode and consumer-control tables
//!
//! Key names are used without the `KEY_` prefix. Media codes are HID
//! consumer-page usages as the firmware expects them.

/// Keyboard page usages
pub const KEYS: &[(&str, u8)] = &[
    ("A", 0x04),
    ("B", 0x05),
    ("C", 0x06),
    ("D", 0x07),
    ("E", 0x08),
    ("F", 0x09),
    ("G", 0x0A),
    ("H", 0x0B),
    ("I", 0x0C),
    ("J", 0x0D),
    ("K", 0x0E),
    ("L", 0x0F),
    ("M", 0x10),
    ("N", 0x11),
    ("O", 0x12),
    ("P", 0x13),
    ("Q", 0x14),
    ("R", 0x15),
    ("S", 0x16),
    ("T", 0x17),
    ("U", 0x18),
    ("V", 0x19),
    ("W", 0x1A),
    ("X", 0x1B),
    ("Y", 0x1C),
    ("Z", 0x1D),
    ("1", 0x1E),
    ("2", 0x1F),
    ("3", 0x20),
    ("4", 0x21),
    ("5", 0x22),
    ("6", 0x23),
    ("7", 0x24),
    ("8", 0x25),
    ("9", 0x26),
    ("0", 0x27),
    ("ENTER", 0x28),
    ("ESCAPE", 0x29),
    ("BACKSPACE", 0x2A),
    ("TAB", 0x2B),
    ("SPACE", 0x2C),
    ("CAPS_LOCK", 0x39),
    ("F1", 0x3A),
    ("F2", 0x3B),
    ("F3", 0x3C),
    ("F4", 0x3D),
    ("F5", 0x3E),
    ("F6", 0x3F),
    ("F7", 0x40),
    ("F8", 0x41),
    ("F9", 0x42),
    ("F10", 0x43),
    ("F11", 0x44),
    ("F12", 0x45),
    ("RIGHT", 0x4F),
    ("LEFT", 0x50),
    ("DOWN", 0x51),
    ("UP", 0x52),
    ("F20", 0x6F),
    ("F21", 0x70),
    ("F22", 0x71),
    ("F23", 0x72),
    ("F24", 0x73),
    ("F13", 0x74),
    ("F14", 0x75),
    ("F15", 0x76),
    ("F16", 0x77),
    ("F17", 0x78),
    ("F18", 0x79),
    ("F19", 0x7A),
];

/// Consumer page usages
pub const MEDIA: &[(&str, u8)] = &[
    ("MEDIA_PLAY_PAUSE", 0xCD),
    ("MEDIA_NEXT", 0xB5),
    ("MEDIA_PREV", 0xB6),
    ("MEDIA_STOP", 0xB7),
    ("VOLUME_UP", 0xE9),
    ("VOLUME_DOWN", 0xEA),
    ("VOLUME_MUTE", 0xE2),
    ("BRIGHTNESS_UP", 0x6F),
    ("BRIGHTNESS_DOWN", 0x70),
];

/// Substituted for unknown key names (A)
pub const FALLBACK_KEY: u8 = 0x04;

/// Substituted for unknown media names (play/pause)
pub const FALLBACK_MEDIA: u8 = 0xCD;

fn lookup_code(table: &[(&str, u8)], name: &str) -> Option<u8> {
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, code)| code)
}

fn lookup_name(table: &[(&'static str, u8)], code: u8) -> Option<&'static str> {
    table.iter().find(|&&(_, c)| c == code).map(|&(n, _)| n)
}

/// Key name (without `KEY_`) to usage
pub fn key_code(name: &str) -> Option<u8> {
    lookup_code(KEYS, name)
}

pub fn key_name(code: u8) -> Option<&'static str> {
    lookup_name(KEYS, code)
}

/// Media action name to usage. `MUTE` is accepted for `VOLUME_MUTE`.
pub fn media_code(name: &str) -> Option<u8> {
    if name.eq_ignore_ascii_case("MUTE") {
        return lookup_code(MEDIA, "VOLUME_MUTE");
    }
    lookup_code(MEDIA, name)
}

pub fn media_name(code: u8) -> Option<&'static str> {
    lookup_name(MEDIA, code)
}

/// Names that belong to the media table even when unknown
pub fn looks_like_media(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper == "MUTE"
        || ["MEDIA_", "VOLUME_", "BRIGHTNESS_"]
            .iter()
            .any(|prefix| upper.starts_with(prefix))
}
