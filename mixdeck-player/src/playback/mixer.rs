//! Two-stream sample mixer
//!
//! Stateless: the producer calls [`mix`] once per block on its own thread.

/// Blend `secondary` into `primary`, returning a block of `primary.len()` samples.
///
/// For the first `secondary_len` positions (when a secondary is present) the
/// output is the integer mean of both samples, truncated toward zero; every
/// other position passes the primary through unchanged. The mean of two `i16`
/// values always fits in `i16`, so no clamping is required.
///
/// Truncation biases odd sums by at most one unit toward zero. This is the
/// accepted rounding behaviour, not a defect.
///
/// # Examples
///
/// ```
/// use mixdeck_player::playback::mixer::mix;
///
/// let out = mix(&[100, -100, 32767], Some(&[10, 10, 10]), 3);
/// assert_eq!(out, vec![55, -45, 16388]);
/// ```
pub fn mix(primary: &[i16], secondary: Option<&[i16]>, secondary_len: usize) -> Vec<i16> {
    let mut output = Vec::with_capacity(primary.len());
    mix_into(primary, secondary, secondary_len, &mut output);
    output
}

/// Same as [`mix`], writing into a reusable buffer (cleared first)
pub fn mix_into(
    primary: &[i16],
    secondary: Option<&[i16]>,
    secondary_len: usize,
    output: &mut Vec<i16>,
) {
    output.clear();

    let blended = match secondary {
        Some(secondary) => secondary_len.min(secondary.len()).min(primary.len()),
        None => 0,
    };

    if let Some(secondary) = secondary {
        output.extend(
            primary[..blended]
                .iter()
                .zip(&secondary[..blended])
                .map(|(&a, &b)| ((i32::from(a) + i32::from(b)) / 2) as i16),
        );
    }
    output.extend_from_slice(&primary[blended..]);
}
