//! Kubernetes resource quantity parsing
//!
//! Quantities are `<signed number><suffix>` where the suffix is a binary SI
//! suffix (`Ki`..`Ei`), a decimal SI suffix (`m`, `k`, `M`..`E`) or a decimal
//! exponent (`e3`, `E-2`). Anything unparseable yields 0.

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millis(quantity: &str) -> u64 {
    to_units(parse(quantity).map(|cores| cores * 1000.0))
}

/// Parse a memory or storage quantity into bytes
pub fn parse_bytes(quantity: &str) -> u64 {
    to_units(parse(quantity))
}

fn to_units(value: Option<f64>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => {
            if v >= u64::MAX as f64 {
                u64::MAX
            } else {
                v.round() as u64
            }
        }
        _ => 0,
    }
}

fn parse(quantity: &str) -> Option<f64> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return None;
    }

    let split = number_len(quantity);
    if split == 0 {
        return None;
    }

    let (number, suffix) = quantity.split_at(split);
    let number: f64 = number.parse().ok()?;
    Some(number * multiplier(suffix)?)
}

/// Length of the leading `[+-]digits[.digits]` part
fn number_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i == digits_start {
        0
    } else {
        i
    }
}

fn multiplier(suffix: &str) -> Option<f64> {
    let value = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        exponent => {
            let digits = exponent.strip_prefix(&['e', 'E'][..])?;
            let power: i32 = digits.parse().ok()?;
            10f64.powi(power)
        }
    };
    Some(value)
}
