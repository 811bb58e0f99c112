//! Piecewise linear mapping between integer ranges.

use pedal_proto::ConfigError;

/// Affine map of `value` from `low_in..high_in` onto `low_out..high_out`.
///
/// The result is truncated toward zero and saturates at the `i32` bounds.
/// Fails when the input range is empty.
pub fn scale_linear(
    value: i32,
    low_in: i32,
    high_in: i32,
    low_out: i32,
    high_out: i32,
) -> Result<i32, ConfigError> {
    if low_in == high_in {
        return Err(ConfigError::DegenerateRange);
    }
    // Spans reach 2^32, so their products need 128 bits.
    let span_in = i128::from(high_in) - i128::from(low_in);
    let span_out = i128::from(high_out) - i128::from(low_out);
    // Fold low_out into the numerator so truncation applies to the final sum.
    let num = (i128::from(value) - i128::from(low_in)) * span_out + i128::from(low_out) * span_in;
    Ok(saturate(num / span_in))
}

/// Map `value` through the breakpoint tables `inputs` -> `outputs`.
///
/// Values at or beyond either end return the corresponding end output, and
/// a value equal to a breakpoint returns that breakpoint's output exactly.
/// `inputs` must be strictly increasing and the same length as `outputs`.
pub fn interpolate(value: i32, inputs: &[i32], outputs: &[i32]) -> Result<i32, ConfigError> {
    if inputs.len() != outputs.len() || inputs.is_empty() {
        return Err(ConfigError::LengthMismatch);
    }
    if inputs.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ConfigError::NotIncreasing);
    }

    let last = inputs.len() - 1;
    if value <= inputs[0] {
        return Ok(outputs[0]);
    }
    if value >= inputs[last] {
        return Ok(outputs[last]);
    }

    for i in 0..last {
        if value == inputs[i] {
            return Ok(outputs[i]);
        }
        if value < inputs[i + 1] {
            return scale_linear(value, inputs[i], inputs[i + 1], outputs[i], outputs[i + 1]);
        }
    }
    Ok(outputs[last])
}

fn saturate(v: i128) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}
