//! Wire command string codec.
//!
//! Grammar: `("@" <Kind> "=" [<block:4digits>] <payload>)+`. One transport
//! text message carries one or more concatenated commands. Numeric payloads
//! use `/`-separated tuples with a `.` decimal separator regardless of host
//! locale. There is no escaping: payloads must never contain `@`.

use glam::{Quat, Vec3};

use crate::protocol::{CommandKind, CommandMessage, COMMAND_SIGIL};

/// Width of the zero-padded block index prefix inside a command payload.
pub const BLOCK_DIGITS: usize = 4;

/// Decimal places used for floating-point wire fields.
const FLOAT_PRECISION: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid numeric field: {0:?}")]
    InvalidNumber(String),
    #[error("expected {expected} fields, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("missing or malformed block index")]
    BadBlock,
}

/// Encode one command: `@<Kind>=<block><message>`. The block index, when
/// present, is zero-padded to four digits.
pub fn encode(cmd: &CommandMessage) -> String {
    match cmd.block {
        Some(block) => format!(
            "{}{}={:0width$}{}",
            COMMAND_SIGIL,
            cmd.kind.as_str(),
            block,
            cmd.message,
            width = BLOCK_DIGITS
        ),
        None => format!("{}{}={}", COMMAND_SIGIL, cmd.kind.as_str(), cmd.message),
    }
}

/// Prefix-match one command fragment (the text between sigils, without the
/// leading `@`) against an expected kind. Returns the parameter string on a
/// match; a non-matching prefix is simply `None` so the dispatcher can try
/// the next candidate kind.
pub fn decode<'a>(fragment: &'a str, expected: CommandKind) -> Option<&'a str> {
    let rest = fragment.strip_prefix(expected.as_str())?;
    rest.strip_prefix('=')
}

/// Split a transport text message into command fragments. The message must
/// start with the sigil (otherwise it is chat text, not commands).
pub fn split_commands(wire: &str) -> Vec<&str> {
    wire.split(COMMAND_SIGIL)
        .filter(|f| !f.is_empty())
        .collect()
}

/// Whether a transport text message carries commands (versus plain chat).
pub fn is_command_text(wire: &str) -> bool {
    wire.starts_with(COMMAND_SIGIL)
}

/// Split a 4-digit block index off the front of a command parameter.
pub fn split_block(param: &str) -> Result<(u32, &str), CodecError> {
    if param.len() < BLOCK_DIGITS || !param.is_char_boundary(BLOCK_DIGITS) {
        return Err(CodecError::BadBlock);
    }
    let (digits, rest) = param.split_at(BLOCK_DIGITS);
    let block = digits.parse::<u32>().map_err(|_| CodecError::BadBlock)?;
    Ok((block, rest))
}

fn fmt_f32(v: f32) -> String {
    format!("{:.prec$}", v, prec = FLOAT_PRECISION)
}

fn parse_f32(field: &str) -> Result<f32, CodecError> {
    field
        .trim()
        .parse::<f32>()
        .map_err(|_| CodecError::InvalidNumber(field.to_string()))
}

fn parse_fields(param: &str, expected: usize) -> Result<Vec<f32>, CodecError> {
    let parts: Vec<&str> = param.split('/').collect();
    if parts.len() != expected {
        return Err(CodecError::Arity {
            expected,
            got: parts.len(),
        });
    }
    parts.iter().map(|p| parse_f32(p)).collect()
}

/// `x/y` pair (screen coordinates).
pub fn encode_vec2(x: f32, y: f32) -> String {
    format!("{}/{}", fmt_f32(x), fmt_f32(y))
}

pub fn parse_vec2(param: &str) -> Result<(f32, f32), CodecError> {
    let f = parse_fields(param, 2)?;
    Ok((f[0], f[1]))
}

/// `x/y/z` triple.
pub fn encode_vec3(v: Vec3) -> String {
    format!("{}/{}/{}", fmt_f32(v.x), fmt_f32(v.y), fmt_f32(v.z))
}

pub fn parse_vec3(param: &str) -> Result<Vec3, CodecError> {
    let f = parse_fields(param, 3)?;
    Ok(Vec3::new(f[0], f[1], f[2]))
}

/// `x/y/z/w` quaternion.
pub fn encode_quat(q: Quat) -> String {
    format!(
        "{}/{}/{}/{}",
        fmt_f32(q.x),
        fmt_f32(q.y),
        fmt_f32(q.z),
        fmt_f32(q.w)
    )
}

pub fn parse_quat(param: &str) -> Result<Quat, CodecError> {
    let f = parse_fields(param, 4)?;
    Ok(Quat::from_xyzw(f[0], f[1], f[2], f[3]).normalize())
}

/// `r/g/b` color, unit-interval channels.
pub fn encode_color(r: f32, g: f32, b: f32) -> String {
    format!("{}/{}/{}", fmt_f32(r), fmt_f32(g), fmt_f32(b))
}

pub fn parse_color(param: &str) -> Result<(f32, f32, f32), CodecError> {
    let f = parse_fields(param, 3)?;
    Ok((f[0], f[1], f[2]))
}

/// Integer field (anchor and transfer ids; `-1` means "none").
pub fn parse_i64(field: &str) -> Result<i64, CodecError> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| CodecError::InvalidNumber(field.to_string()))
}

/// Boolean flag: `1`/`0`.
pub fn encode_bool(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

pub fn parse_bool(field: &str) -> Result<bool, CodecError> {
    match field.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(CodecError::InvalidNumber(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_without_block() {
        let cmd = CommandMessage::new(CommandKind::AnchorDeleted, "7");
        assert_eq!(encode(&cmd), "@AnchorDeleted=7");
    }

    #[test]
    fn encode_with_block_pads_to_four_digits() {
        let cmd = CommandMessage::with_block(CommandKind::ResendBlock, "12", 3);
        assert_eq!(encode(&cmd), "@ResendBlock=000312");
    }

    #[test]
    fn decode_matches_expected_kind_only() {
        assert_eq!(
            decode("AnchorMoved=1;2.0/0.0/0.0;0.0/0.0/0.0/1.0", CommandKind::AnchorMoved),
            Some("1;2.0/0.0/0.0;0.0/0.0/0.0/1.0")
        );
        assert_eq!(
            decode("AnchorMoved=1", CommandKind::AnchorDeleted),
            None
        );
        // unknown prefix never matches anything
        for kind in CommandKind::ALL {
            assert_eq!(decode("Bogus=1", kind), None);
        }
    }

    #[test]
    fn split_concatenated_commands() {
        let wire = "@AnchorDeleted=3@ArModeChanged=1";
        assert!(is_command_text(wire));
        let frags = split_commands(wire);
        assert_eq!(frags, vec!["AnchorDeleted=3", "ArModeChanged=1"]);
    }

    #[test]
    fn chat_text_is_not_command() {
        assert!(!is_command_text("hello there"));
    }

    #[test]
    fn block_split() {
        let (block, rest) = split_block("004217").unwrap();
        assert_eq!(block, 42);
        assert_eq!(rest, "17");
        assert!(split_block("ab").is_err());
        assert!(split_block("12x4rest").is_err());
    }

    #[test]
    fn vec3_roundtrip() {
        let v = Vec3::new(1.5, -2.25, 0.125);
        let s = encode_vec3(v);
        assert_eq!(s, "1.50000/-2.25000/0.12500");
        assert_eq!(parse_vec3(&s).unwrap(), v);
    }

    #[test]
    fn quat_roundtrip() {
        let q = Quat::from_rotation_y(0.8);
        let back = parse_quat(&encode_quat(q)).unwrap();
        assert!(q.abs_diff_eq(back, 1e-4));
    }

    #[test]
    fn vec2_and_color_roundtrip() {
        assert_eq!(parse_vec2(&encode_vec2(0.5, 0.75)).unwrap(), (0.5, 0.75));
        assert_eq!(
            parse_color(&encode_color(1.0, 0.0, 0.5)).unwrap(),
            (1.0, 0.0, 0.5)
        );
    }

    #[test]
    fn malformed_numbers_are_errors_not_panics() {
        assert!(parse_vec3("a/b/c").is_err());
        assert!(parse_vec3("1.0/2.0").is_err());
        assert!(parse_i64("x").is_err());
        assert!(parse_bool("yes").is_err());
    }
}
