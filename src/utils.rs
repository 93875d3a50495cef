use itertools::Itertools;

const G_PRECISION: i32 = 6;

/// Format like C's `%g`: six significant digits, trailing zeros dropped,
/// scientific notation for exponents below -4 or from 6 on.
pub fn format_g(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }
    // the exponent is the one of the value rounded to the output precision
    let sci = format!("{:.*e}", (G_PRECISION - 1) as usize, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if exp < -4 || exp >= G_PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (G_PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// One matrix row as `%g ` per entry.
pub(crate) fn format_row(row: &[f64]) -> String {
    let mut line = row.iter().map(|v| format_g(*v)).join(" ");
    if !row.is_empty() {
        line.push(' ');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values() {
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(-2.5), "-2.5");
        assert_eq!(format_g(100.0), "100");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(123456.0), "123456");
        assert_eq!(format_g(3.14159265), "3.14159");
        assert_eq!(format_g(0.1 + 0.2), "0.3");
    }

    #[test]
    fn scientific_values() {
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(1e6), "1e+06");
        assert_eq!(format_g(0.00001), "1e-05");
        assert_eq!(format_g(-2.5e-7), "-2.5e-07");
        assert_eq!(format_g(1e100), "1e+100");
    }

    #[test]
    fn rounding_moves_the_exponent() {
        assert_eq!(format_g(999999.5), "1e+06");
        assert_eq!(format_g(0.000099999999), "0.0001");
    }

    #[test]
    fn special_values() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(-0.0), "-0");
        assert_eq!(format_g(f64::NAN), "nan");
        assert_eq!(format_g(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn rows_end_with_a_space() {
        assert_eq!(format_row(&[1.0, 2.5, 0.0]), "1 2.5 0 ");
        assert_eq!(format_row(&[]), "");
    }
}
