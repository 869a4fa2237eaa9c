//! Numeric string conversions.
//!
//! String-to-number follows the scripting language's prefix rules: an
//! optional leading `-`, then `0x`/`0X` hex, `0b`/`0B` binary, `0o`/`0O` or
//! bare leading-zero octal, else decimal. Trailing text is ignored and the
//! magnitude clamps instead of wrapping. Float formatting reproduces the
//! display rules scripts round-trip through (`1.0`, not `1`).

/// Result of scanning a leading number: the value and how many bytes the
/// number occupied (sign and radix prefix included).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScannedNumber {
    pub value: i64,
    pub len: usize,
}

fn is_odigit(b: u8) -> bool {
    (b'0'..=b'7').contains(&b)
}

fn hex_val(b: u8) -> u64 {
    match b {
        b'0'..=b'9' => u64::from(b - b'0'),
        b'a'..=b'f' => u64::from(b - b'a') + 10,
        _ => u64::from(b - b'A') + 10,
    }
}

/// Accumulate digits in `base`, clamping at `u64::MAX` on overflow.
fn accumulate(bytes: &[u8], mut i: usize, base: u64, pred: fn(u8) -> bool, conv: fn(u8) -> u64) -> (u64, usize) {
    let mut un: u64 = 0;
    while i < bytes.len() && pred(bytes[i]) {
        let digit = conv(bytes[i]);
        if un < u64::MAX / base || (un == u64::MAX / base && (base != 10 || digit <= u64::MAX % 10)) {
            un = base * un + digit;
        } else {
            un = u64::MAX;
        }
        i += 1;
    }
    (un, i)
}

/// Scan a number at the start of `s`.
///
/// Returns value 0 with length 0 when `s` does not start with a number
/// (after an optional `-`).
pub fn scan_number(s: &str) -> ScannedNumber {
    let bytes = s.as_bytes();
    let negative = bytes.first() == Some(&b'-');
    let start = usize::from(negative);

    let (un, end) = scan_unsigned(bytes, start);
    if end == start {
        // No digits at all; the sign alone does not count.
        return ScannedNumber { value: 0, len: 0 };
    }

    let value = if negative {
        i64::try_from(un).map_or(i64::MIN, i64::wrapping_neg)
    } else {
        i64::try_from(un).unwrap_or(i64::MAX)
    };
    ScannedNumber { value, len: end }
}

fn scan_unsigned(bytes: &[u8], i: usize) -> (u64, usize) {
    let rest = &bytes[i..];
    if rest.len() >= 2 && rest[0] == b'0' && rest[1] != b'8' && rest[1] != b'9' {
        let pre = rest[1];
        if (pre == b'x' || pre == b'X') && rest.len() >= 3 && rest[2].is_ascii_hexdigit() {
            return accumulate(bytes, i + 2, 16, |b| b.is_ascii_hexdigit(), hex_val);
        }
        if (pre == b'b' || pre == b'B') && rest.len() >= 3 && (rest[2] == b'0' || rest[2] == b'1') {
            return accumulate(bytes, i + 2, 2, |b| b == b'0' || b == b'1', |b| u64::from(b - b'0'));
        }
        if (pre == b'o' || pre == b'O') && rest.len() >= 3 && is_odigit(rest[2]) {
            return accumulate(bytes, i + 2, 8, is_odigit, |b| u64::from(b - b'0'));
        }
        // Old-style octal: a leading zero followed only by octal digits.
        // "019" stays decimal, "017" is octal.
        if is_odigit(pre) {
            let mut k = 2;
            let mut octal = true;
            while k < rest.len() && rest[k].is_ascii_digit() {
                if rest[k] > b'7' {
                    octal = false;
                    break;
                }
                k += 1;
            }
            if octal {
                return accumulate(bytes, i, 8, is_odigit, |b| u64::from(b - b'0'));
            }
        }
    }
    accumulate(bytes, i, 10, |b| b.is_ascii_digit(), |b| u64::from(b - b'0'))
}

/// String-to-number coercion: parse a leading number, ignore the rest.
pub fn parse_leading_number(s: &str) -> i64 {
    scan_number(s).value
}

/// Scan a float literal of the shape `digits '.' digits [eE [+-] digits]`.
///
/// The caller guarantees the text starts with a digit; returns `None` when
/// the dot/fraction shape is not met (the text is an integer instead).
pub fn scan_float(s: &str) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == 0 || i + 1 >= bytes.len() || bytes[i] != b'.' || !bytes[i + 1].is_ascii_digit() {
        return None;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    // Optional exponent; only consumed when a digit actually follows.
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut k = i + 1;
        if k < bytes.len() && (bytes[k] == b'+' || bytes[k] == b'-') {
            k += 1;
        }
        if k < bytes.len() && bytes[k].is_ascii_digit() {
            while k < bytes.len() && bytes[k].is_ascii_digit() {
                k += 1;
            }
            i = k;
        }
    }
    s[..i].parse::<f64>().ok().map(|f| (f, i))
}

/// Lenient string-to-float: recognizes `inf`, `-inf`, `nan` (any case),
/// otherwise parses the longest leading float, integer part optional.
///
/// Returns the value and the number of bytes consumed (0 when no float is
/// present, with value 0.0).
pub fn str_to_float(s: &str) -> (f64, usize) {
    let lower = s.as_bytes();
    if lower.len() >= 3 && s[..3].eq_ignore_ascii_case("inf") {
        return (f64::INFINITY, 3);
    }
    if lower.len() >= 4 && s[..4].eq_ignore_ascii_case("-inf") {
        return (f64::NEG_INFINITY, 4);
    }
    if lower.len() >= 3 && s[..3].eq_ignore_ascii_case("nan") {
        return (f64::NAN, 3);
    }

    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i == int_start {
        return (0.0, 0);
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut k = i + 1;
        if k < bytes.len() && (bytes[k] == b'+' || bytes[k] == b'-') {
            k += 1;
        }
        if k < bytes.len() && bytes[k].is_ascii_digit() {
            while k < bytes.len() && bytes[k].is_ascii_digit() {
                k += 1;
            }
            i = k;
        }
    }
    match s[..i].parse::<f64>() {
        Ok(f) => (f, i),
        Err(_) => (0.0, 0),
    }
}

/// Format a float the way scripts see it: `%g` with six significant digits,
/// but whole numbers keep a trailing `.0` and exponents drop their sign
/// padding (`1.0e15`, `1.0e-5`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf".to_owned() } else { "inf".to_owned() };
    }

    let abs = value.abs();
    let mut s = if (0.001..10_000_000.0).contains(&abs) || abs == 0.0 {
        format!("{value:.6}")
    } else {
        format!("{value:.6e}")
    };

    // Strip superfluous zeroes, keeping the first digit after the dot.
    let stop = s.find('e').unwrap_or(s.len());
    let mut tp = stop - 1;
    while tp > 2 && s.as_bytes()[tp] == b'0' && s.as_bytes()[tp - 1] != b'.' {
        s.remove(tp);
        tp -= 1;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_scan_number_radixes() {
        assert_eq!(scan_number("123").value, 123);
        assert_eq!(scan_number("0x1f").value, 31);
        assert_eq!(scan_number("0b101").value, 5);
        assert_eq!(scan_number("0o17").value, 15);
        assert_eq!(scan_number("017").value, 15);
        assert_eq!(scan_number("019").value, 19);
        assert_eq!(scan_number("-42").value, -42);
    }

    #[test]
    fn test_scan_number_trailing_text_ignored() {
        let n = scan_number("12abc");
        assert_eq!(n.value, 12);
        assert_eq!(n.len, 2);
        assert_eq!(scan_number("abc").len, 0);
        assert_eq!(scan_number("-").len, 0);
        // '+' is not consumed as a sign
        assert_eq!(scan_number("+5").len, 0);
    }

    #[test]
    fn test_scan_number_clamps() {
        assert_eq!(scan_number("99999999999999999999999").value, i64::MAX);
        assert_eq!(scan_number("-99999999999999999999999").value, i64::MIN);
    }

    #[test]
    fn test_scan_float_shape() {
        assert_eq!(scan_float("1.5"), Some((1.5, 3)));
        assert_eq!(scan_float("1.5e3"), Some((1500.0, 5)));
        assert_eq!(scan_float("1.5e-2"), Some((0.015, 6)));
        // "1." is not a float (concat must still work)
        assert_eq!(scan_float("1."), None);
        assert_eq!(scan_float("1..2"), None);
        // exponent without digits is left unconsumed
        assert_eq!(scan_float("1.5e"), Some((1.5, 3)));
        assert_eq!(scan_float("1.5ex"), Some((1.5, 3)));
    }

    #[test]
    fn test_str_to_float_specials() {
        assert_eq!(str_to_float("inf"), (f64::INFINITY, 3));
        assert_eq!(str_to_float("-inf"), (f64::NEG_INFINITY, 4));
        assert!(str_to_float("NaN").0.is_nan());
        assert_eq!(str_to_float("3.25pt"), (3.25, 4));
        assert_eq!(str_to_float("x"), (0.0, 0));
    }

    #[test]
    fn test_format_float_fixed_range() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(123_456.789), "123456.789");
        assert_eq!(format_float(10.0), "10.0");
        assert_eq!(format_float(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_format_float_exponent_range() {
        assert_eq!(format_float(1e15), "1.0e15");
        assert_eq!(format_float(1e-5), "1.0e-5");
        assert_eq!(format_float(10_000_000.0), "1.0e7");
        assert_eq!(format_float(0.0009), "9.0e-4");
    }

    #[test]
    fn test_format_float_specials() {
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    }

    proptest! {
        /// Every `i64` display form scans back to the same value, whole.
        #[test]
        fn prop_scan_decimal_matches_display(n in any::<i64>()) {
            let text = n.to_string();
            let scanned = scan_number(&text);
            prop_assert_eq!(scanned.value, n);
            prop_assert_eq!(scanned.len, text.len());
        }

        /// Hex literals scan back exactly for the non-negative range.
        #[test]
        fn prop_scan_hex_matches_format(n in 0i64..=i64::MAX) {
            let text = format!("0x{n:x}");
            prop_assert_eq!(scan_number(&text).value, n);
        }
    }
}
