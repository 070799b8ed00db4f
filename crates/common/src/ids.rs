//! Conversation id helpers.
//!
//! Conversation ids are opaque tokens owned by the transport. The only shape
//! this crate relies on is the `<digits>@c.us` form used for individual
//! peers, which lets operators address a peer by phone number.

/// Suffix the transport uses for individual (non-group) peers.
pub const USER_ID_SUFFIX: &str = "@c.us";

/// Turn a free-form phone number into a transport user id.
///
/// Non-digits are stripped; the country code is prepended unless the number
/// already starts with it. Returns `None` when no digits remain.
pub fn phone_to_chat_id(raw: &str, country_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let full = if digits.starts_with(country_code) {
        digits
    } else {
        format!("{country_code}{digits}")
    };
    Some(format!("{full}{USER_ID_SUFFIX}"))
}

/// Accept either an already-qualified id or a bare phone number.
pub fn normalize_chat_input(input: &str, country_code: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.contains('@') {
        return Some(input.to_string());
    }
    phone_to_chat_id(input, country_code)
}

/// Synthesize a message id for messages the transport has not numbered yet.
pub fn local_message_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
