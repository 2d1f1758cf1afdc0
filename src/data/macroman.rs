//! MacRoman <-> UTF-8 transcoding.
//!
//! Resource names, type codes and attribute strings are stored as MacRoman
//! on disk.  Bytes below 0x80 are ASCII; the upper half maps through
//! [`HIGH_HALF`].  Characters with no MacRoman equivalent encode as `?`.

const HIGH_HALF: [char; 128] = [
    // 0x80
    'Ä', 'Å', 'Ç', 'É', 'Ñ', 'Ö', 'Ü', 'á', 'à', 'â', 'ä', 'ã', 'å', 'ç', 'é', 'è',
    // 0x90
    'ê', 'ë', 'í', 'ì', 'î', 'ï', 'ñ', 'ó', 'ò', 'ô', 'ö', 'õ', 'ú', 'ù', 'û', 'ü',
    // 0xA0
    '†', '°', '¢', '£', '§', '•', '¶', 'ß', '®', '©', '™', '´', '¨', '≠', 'Æ', 'Ø',
    // 0xB0
    '∞', '±', '≤', '≥', '¥', 'µ', '∂', '∑', '∏', 'π', '∫', 'ª', 'º', 'Ω', 'æ', 'ø',
    // 0xC0
    '¿', '¡', '¬', '√', 'ƒ', '≈', '∆', '«', '»', '…', '\u{A0}', 'À', 'Ã', 'Õ', 'Œ', 'œ',
    // 0xD0
    '–', '—', '“', '”', '‘', '’', '÷', '◊', 'ÿ', 'Ÿ', '⁄', '€', '‹', '›', 'ﬁ', 'ﬂ',
    // 0xE0
    '‡', '·', '‚', '„', '‰', 'Â', 'Ê', 'Á', 'Ë', 'È', 'Í', 'Î', 'Ï', 'Ì', 'Ó', 'Ô',
    // 0xF0
    '\u{F8FF}', 'Ò', 'Ú', 'Û', 'Ù', 'ı', 'ˆ', '˜', '¯', '˘', '˙', '˚', '¸', '˝', '˛', 'ˇ',
];

pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| decode_byte(b)).collect()
}

#[inline]
pub fn decode_byte(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        HIGH_HALF[(byte - 0x80) as usize]
    }
}

pub fn encode(s: &str) -> Vec<u8> {
    s.chars().map(encode_char).collect()
}

pub fn encode_char(c: char) -> u8 {
    if c.is_ascii() {
        return c as u8;
    }
    HIGH_HALF
        .iter()
        .position(|&m| m == c)
        .map(|i| 0x80 + i as u8)
        .unwrap_or(b'?')
}
