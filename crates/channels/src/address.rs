/// Bring a recipient into the transport's address form by appending `suffix`
/// when it is not already present.
///
/// Surrounding whitespace is dropped. Idempotent:
/// `normalize_address(&normalize_address(x, s), s) == normalize_address(x, s)`.
pub fn normalize_address(recipient: &str, suffix: &str) -> String {
    let recipient = recipient.trim();
    if suffix.is_empty() || recipient.contains(suffix) {
        recipient.to_string()
    } else {
        format!("{recipient}{suffix}")
    }
}
