//! OSC message encoding
//!
//! OSC (Open Sound Control) is the binary message format the VMC protocol is
//! layered on. Messages are self-describing: a padded address string, a type
//! tag string (`,` followed by one tag per argument), then the arguments.
//! All fields are 4-byte aligned and numeric values are big-endian.
//!
//! The encoder is pure and transport-independent; the UDP side lives in
//! [`super::vmc`].

/// A typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// 32-bit signed integer (tag `i`)
    Int(i32),
    /// 32-bit IEEE-754 float (tag `f`)
    Float(f32),
    /// UTF-8 string (tag `s`)
    Str(String),
}

impl OscArg {
    fn type_tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::Str(_) => 's',
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Encode a single OSC message.
pub fn encode_message(address: &str, args: &[OscArg]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    append_padded_str(&mut buf, address);

    let mut tags = String::with_capacity(args.len() + 1);
    tags.push(',');
    for arg in args {
        tags.push(arg.type_tag());
    }
    append_padded_str(&mut buf, &tags);

    for arg in args {
        match arg {
            OscArg::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscArg::Str(s) => append_padded_str(&mut buf, s),
        }
    }

    buf
}

/// Append a NUL-terminated string padded with NULs to a 4-byte boundary.
/// An empty string encodes to exactly 4 NUL bytes.
pub fn append_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);

    let padding = (4 - (s.len() + 1) % 4) % 4;
    buf.resize(buf.len() + padding, 0);
}
