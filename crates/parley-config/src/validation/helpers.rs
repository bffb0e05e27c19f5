//! Shared range-validation helpers used by all section validators.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if an ideal value exceeds its cap.
pub(crate) fn validate_ideal_within_max(errors: &mut Vec<String>, name: &str, ideal: u32, max: u32) {
    if ideal > max {
        errors.push(format!("{name}: ideal {ideal} exceeds max {max}"));
    }
}

/// Push an error unless `url` starts with one of `schemes`.
pub(crate) fn validate_scheme(errors: &mut Vec<String>, name: &str, url: &str, schemes: &[&str]) {
    if !schemes.iter().any(|s| url.starts_with(s)) {
        errors.push(format!(
            "{name} = \"{url}\" must start with one of {}",
            schemes.join(", ")
        ));
    }
}
