//! Мелкие хелперы для CLI: разбор чисел с префиксом и hex-дамп.

/// Разобрать u64: `0x..` (hex), `0o..`, `0b..` или десятичное.
pub fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    if let Some(x) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(x, 16).map_err(|e| e.to_string())
    } else if let Some(x) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        u64::from_str_radix(x, 8).map_err(|e| e.to_string())
    } else if let Some(x) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(x, 2).map_err(|e| e.to_string())
    } else {
        s.parse::<u64>().map_err(|e| e.to_string())
    }
}

pub fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s)?;
    u32::try_from(v).map_err(|_| format!("{} does not fit in u32", v))
}

/// Классический дамп: адрес, 16 байт hex, ASCII-колонка.
pub fn hex_dump(base: u64, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("{:016x}  ", base.wrapping_add((i * 16) as u64)));
        for j in 0..16 {
            match chunk.get(j) {
                Some(b) => out.push_str(&format!("{:02x} ", b)),
                None => out.push_str("   "),
            }
            if j == 7 {
                out.push(' ');
            }
        }
        out.push(' ');
        for &b in chunk {
            out.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefixes() {
        assert_eq!(parse_u64("0x7ff6_0000"), Ok(0x7ff6_0000));
        assert_eq!(parse_u64("0b101"), Ok(5));
        assert_eq!(parse_u64("  42 "), Ok(42));
        assert!(parse_u64("0xzz").is_err());
        assert!(parse_u32("0x1_0000_0000").is_err());
    }

    #[test]
    fn dump_layout() {
        let text = hex_dump(0x1000, b"MZ\x90\x00abcdefghijklmnop");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000000000001000  4d 5a 90 00 "));
        assert!(lines[0].ends_with("MZ..abcdefghijkl"));
        assert!(lines[1].starts_with("0000000000001010  6d 6e 6f 70 "));
        assert!(lines[1].ends_with("mnop"));
    }
}
