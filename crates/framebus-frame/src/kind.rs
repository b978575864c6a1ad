//! Frame kinds carried in the frame header.

/// Connection greeting (socket handshake).
pub const GREETING: u16 = 0;

/// Application message: one serialized framebus message per frame.
pub const MESSAGE: u16 = 1;

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        GREETING => "GREETING",
        MESSAGE => "MESSAGE",
        _ => "UNKNOWN",
    }
}
