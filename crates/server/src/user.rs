//! The authenticated caller attached to every request by the auth gate.

/// Identity resolved from the `Authorization: Basic` header.
///
/// Handlers read it as an `Extension` and pass `username` as the owner of
/// every engine call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
}
