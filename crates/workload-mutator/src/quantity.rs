//! Numeric evaluation of Kubernetes resource quantities.
//!
//! Quantities are compared by value, so `1Gi` and `1024Mi` are the same
//! amount of memory. The value is the amount expressed in base units,
//! rounded up to the next integer.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::errors::QuantityError;

/// Return the integer value of a quantity, rounding fractions up.
pub fn value(quantity: &Quantity) -> Result<i128, QuantityError> {
    parse(&quantity.0)
}

pub(crate) fn parse(raw: &str) -> Result<i128, QuantityError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = raw
        .char_indices()
        .find(|(idx, c)| {
            let sign = *idx == 0 && (*c == '+' || *c == '-');
            !(c.is_ascii_digit() || *c == '.' || sign)
        })
        .map(|(idx, _)| idx)
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };
    let (integer, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if (integer.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(QuantityError::InvalidNumber(raw.to_owned()));
    }

    let out_of_range = || QuantityError::OutOfRange(raw.to_owned());

    let mut mantissa: i128 = 0;
    for digit in integer.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit - b'0')))
            .ok_or_else(out_of_range)?;
    }
    if negative {
        mantissa = -mantissa;
    }

    let (exp10, exp2) =
        suffix_exponents(suffix).ok_or_else(|| QuantityError::UnknownSuffix(raw.to_owned()))?;
    if mantissa == 0 {
        return Ok(0);
    }

    let scaled = mantissa
        .checked_mul(1i128.checked_shl(exp2).ok_or_else(out_of_range)?)
        .ok_or_else(out_of_range)?;

    let exponent = exp10 - fraction.len() as i32;
    if exponent >= 0 {
        let factor = pow10(exponent as u32).ok_or_else(out_of_range)?;
        scaled.checked_mul(factor).ok_or_else(out_of_range)
    } else {
        match pow10(exponent.unsigned_abs()) {
            Some(divisor) => {
                let quotient = scaled.div_euclid(divisor);
                if scaled.rem_euclid(divisor) == 0 {
                    Ok(quotient)
                } else {
                    Ok(quotient + 1)
                }
            }
            // the divisor exceeds any representable mantissa
            None if scaled > 0 => Ok(1),
            None => Ok(0),
        }
    }
}

/// Map a suffix to its decimal and binary exponents.
fn suffix_exponents(suffix: &str) -> Option<(i32, u32)> {
    let exponents = match suffix {
        "" => (0, 0),
        "Ki" => (0, 10),
        "Mi" => (0, 20),
        "Gi" => (0, 30),
        "Ti" => (0, 40),
        "Pi" => (0, 50),
        "Ei" => (0, 60),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            (exponent.parse::<i32>().ok().filter(|e| e.abs() <= 64)?, 0)
        }
    };
    Some(exponents)
}

fn pow10(exponent: u32) -> Option<i128> {
    10i128.checked_pow(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("1500", 1500)]
    #[case::zero("0", 0)]
    #[case::zero_with_large_exponent("0e64", 0)]
    #[case::zero_with_tiny_exponent("0.0e-64", 0)]
    #[case::kibi("1Ki", 1024)]
    #[case::mebi("128Mi", 128 * 1024 * 1024)]
    #[case::gibi("1Gi", 1 << 30)]
    #[case::exbi("2Ei", 2 << 60)]
    #[case::kilo("1k", 1000)]
    #[case::mega("1.5M", 1_500_000)]
    #[case::giga("2G", 2_000_000_000)]
    #[case::milli_rounds_up("1500m", 2)]
    #[case::milli_exact("2000m", 2)]
    #[case::nano("1n", 1)]
    #[case::fraction_binary("0.5Gi", 1 << 29)]
    #[case::exponent("12e6", 12_000_000)]
    #[case::upper_exponent("1E3", 1000)]
    #[case::negative_exponent("15e-1", 2)]
    #[case::explicit_plus("+5", 5)]
    #[case::leading_dot(".5k", 500)]
    #[case::trailing_dot("5.", 5)]
    #[case::surrounding_spaces(" 64Mi ", 64 * 1024 * 1024)]
    fn parse_valid_quantities(#[case] input: &str, #[case] expected: i128) {
        assert_eq!(parse(input), Ok(expected));
    }

    #[rstest]
    #[case::empty("", QuantityError::Empty)]
    #[case::only_suffix("Mi", QuantityError::InvalidNumber("Mi".to_owned()))]
    #[case::only_sign("-", QuantityError::InvalidNumber("-".to_owned()))]
    #[case::unknown_suffix("12MB", QuantityError::UnknownSuffix("12MB".to_owned()))]
    #[case::lowercase_binary("1ki", QuantityError::UnknownSuffix("1ki".to_owned()))]
    #[case::double_dot("1.2.3", QuantityError::InvalidNumber("1.2.3".to_owned()))]
    #[case::huge("999999999999999999999999Ei", QuantityError::OutOfRange("999999999999999999999999Ei".to_owned()))]
    fn parse_invalid_quantities(#[case] input: &str, #[case] expected: QuantityError) {
        assert_eq!(parse(input), Err(expected));
    }

    #[test]
    fn binary_and_decimal_forms_compare_equal() {
        let gibi = value(&Quantity("1Gi".to_owned())).unwrap();
        let mebi = value(&Quantity("1024Mi".to_owned())).unwrap();
        let plain = value(&Quantity("1073741824".to_owned())).unwrap();

        assert_eq!(gibi, mebi);
        assert_eq!(gibi, plain);
    }
}
