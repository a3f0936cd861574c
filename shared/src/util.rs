/// Current UTC timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Render an unsigned value as lowercase base-36 text.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    // Only ASCII digits are pushed
    String::from_utf8(buf).unwrap_or_default()
}

/// Parse lowercase or uppercase base-36 text.
pub fn from_base36(text: &str) -> Option<u64> {
    if text.is_empty() || text.len() > 13 {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u64::MAX), "3w5e11264sgsf");
    }

    #[test]
    fn test_base36_parse() {
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36("3w5e11264sgsf"), Some(u64::MAX));
        assert_eq!(from_base36(""), None);
        assert_eq!(from_base36("not-base36"), None);
    }
}
