/// Interpret a user-supplied on/off value, falling back to `default` for anything unrecognised.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognised_flags() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_boolean_flag(Some(v.to_string()), false));
        }
        for v in ["0", "false", "No", "off"] {
            assert!(!parse_boolean_flag(Some(v.to_string()), true));
        }
    }

    #[test]
    fn garbage_and_absence_use_the_default() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("banana".to_string()), true));
    }
}
