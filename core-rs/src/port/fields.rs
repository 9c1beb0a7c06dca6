//! Bounded protocol fields
//!
//! Port-mapping fields read back from the gateway are held to the capacities
//! of the wire buffers they travel in (capacity includes the terminator).

/// Description buffer capacity
pub const DESCRIPTION_CAPACITY: usize = 80;
/// Remote host buffer capacity
pub const REMOTE_HOST_CAPACITY: usize = 64;
/// Internal client address buffer capacity
pub const INTERNAL_CLIENT_CAPACITY: usize = 40;

/// Truncate `value` to at most `capacity - 1` bytes on a char boundary
pub fn bounded(value: &str, capacity: usize) -> String {
    let max = capacity.saturating_sub(1);
    if value.len() <= max {
        return value.to_string();
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Strip a vendor-added prefix, only when it is a true prefix
pub fn strip_vendor_prefix<'a>(description: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return description;
    }
    description.strip_prefix(prefix).unwrap_or(description)
}
