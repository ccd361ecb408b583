//! Key namespaces in the backing store.

/// Key holding the serialized session record.
pub fn session(session_id: &str) -> String {
    format!("session:session:{}", session_id)
}

/// Key holding the set of session ids owned by a user.
pub fn user_sessions(user_id: &str) -> String {
    format!("session:user:{}", user_id)
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_namespaces() {
        assert_eq!(super::session("abc"), "session:session:abc");
        assert_eq!(super::user_sessions("u1"), "session:user:u1");
    }
}
