//! GitHub `noreply` e-mail addresses.

/// Domain of GitHub-generated commit e-mail addresses.
pub const NOREPLY_DOMAIN: &str = "users.noreply.github.com";

/// Identity encoded in a `noreply` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoreplyAddress {
    /// `12345+login@users.noreply.github.com`
    IdAndLogin {
        /// Numeric user id.
        id: i64,
        /// Login.
        login: String,
    },
    /// `login@users.noreply.github.com`
    Login(String),
}

impl NoreplyAddress {
    /// Parses an e-mail address, returning `None` unless it is a GitHub
    /// `noreply` address.
    pub fn parse(email: &str) -> Option<Self> {
        let (local, domain) = email.rsplit_once('@')?;
        if !domain.eq_ignore_ascii_case(NOREPLY_DOMAIN) || local.is_empty() {
            return None;
        }

        if let Some((id, login)) = local.split_once('+') {
            if let Ok(id) = id.parse::<i64>() {
                if !login.is_empty() {
                    return Some(Self::IdAndLogin {
                        id,
                        login: login.to_string(),
                    });
                }
            }
        }

        Some(Self::Login(local.to_string()))
    }
}
