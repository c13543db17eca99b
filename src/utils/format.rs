use num_format::{Locale, ToFormattedString};

/// Returns a formatter that rounds to `decimals` places and renders the
/// value in fixed notation without grouping.
///
/// The exact binary value is rounded, so `1.005` (stored just below the
/// literal) becomes `"1.00"`. Values exactly halfway between two results
/// round away from zero: `1234.5` becomes `"1235"` and `0.125` becomes
/// `"0.13"`. Non-finite values come out as `NaN`, `inf` or `-inf`.
pub fn fixed_decimals(decimals: usize) -> impl Fn(f64) -> String {
    move |value| {
        if is_exact_tie(value, decimals) {
            let mut exact = format!("{:.*}", decimals + 1, value);
            exact.pop();
            if exact.ends_with('.') {
                exact.pop();
            }
            increment_magnitude(&exact)
        } else {
            format!("{:.*}", decimals, value)
        }
    }
}

/// True when `value` lies exactly halfway between two multiples of
/// `10^-decimals`, i.e. `value * 2 * 10^decimals` is an odd integer.
///
/// With `value = m * 2^e` and `m` odd that product is `m * 5^decimals *
/// 2^(e + decimals + 1)`, which is an odd integer only for
/// `e == -(decimals + 1)`.
fn is_exact_tie(value: f64, decimals: usize) -> bool {
    if !value.is_finite() || value == 0.0 {
        return false;
    }

    let bits = value.to_bits();
    let exponent_bits = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if exponent_bits == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exponent_bits - 1075)
    };

    let shift = mantissa.trailing_zeros();
    exponent + i64::from(shift) == -(decimals as i64 + 1)
}

/// Adds one unit in the last place to a fixed-decimal string, keeping its
/// sign and decimal point.
fn increment_magnitude(value: &str) -> String {
    let mut chars: Vec<char> = value.chars().collect();
    let first_digit = chars.iter().position(char::is_ascii_digit).unwrap_or(chars.len());

    for index in (first_digit..chars.len()).rev() {
        match chars[index] {
            '9' => chars[index] = '0',
            '.' => continue,
            digit => {
                chars[index] = (digit as u8 + 1) as char;
                return chars.into_iter().collect();
            }
        }
    }

    chars.insert(first_digit, '1');
    chars.into_iter().collect()
}

/// Inserts thousands separators into the integer part of a fixed-decimal
/// string. The sign and everything after the integer digits are kept as is.
/// Integer parts too long for a `u128` are returned unchanged.
pub fn with_comma(value: &str) -> String {
    let (sign, unsigned) = match value.strip_prefix(|c: char| c == '-' || c == '+') {
        Some(rest) => value.split_at(value.len() - rest.len()),
        None => ("", value),
    };

    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let (integer, remainder) = unsigned.split_at(digits_end);

    if integer.len() < 4 {
        return value.to_string();
    }

    match integer.parse::<u128>() {
        Ok(number) => format!(
            "{}{}{}",
            sign,
            number.to_formatted_string(&Locale::en),
            remainder
        ),
        Err(_) => value.to_string(),
    }
}
