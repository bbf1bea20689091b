use mqtt_core::codec::ConnectPacket;

use crate::config::BrokerConfig;

/// Derived once at load time from `[auth]`: whether the broker accepts
/// anonymous clients, requires only a known username, or requires a
/// username/password pair.
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    Anonymous,
    UsernameOnly { allowed_users: Vec<String> },
    UsernameAndPassword { allowed_users: Vec<String>, password: String },
}

impl AuthPolicy {
    pub fn from_config(config: &BrokerConfig) -> Self {
        let allowed_users: Vec<String> = config
            .auth
            .allowed_users
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(|user| user.trim().to_lowercase())
                    .filter(|user| !user.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        match (&config.auth.password, allowed_users.is_empty()) {
            (_, true) => Self::Anonymous,
            (Some(password), false) => Self::UsernameAndPassword {
                allowed_users,
                password: password.clone(),
            },
            (None, false) => Self::UsernameOnly { allowed_users },
        }
    }

    /// Checks a CONNECT packet's credentials against this policy. Never
    /// logs the password, only the outcome.
    pub fn authorize(&self, connect: &ConnectPacket) -> bool {
        match self {
            Self::Anonymous => true,
            Self::UsernameOnly { allowed_users } => connect
                .username
                .as_deref()
                .map(|user| allowed_users.contains(&user.to_lowercase()))
                .unwrap_or(false),
            Self::UsernameAndPassword {
                allowed_users,
                password,
            } => {
                let username_ok = connect
                    .username
                    .as_deref()
                    .map(|user| allowed_users.contains(&user.to_lowercase()))
                    .unwrap_or(false);
                let password_ok = connect
                    .password
                    .as_deref()
                    .map(|given| given == password.as_bytes())
                    .unwrap_or(false);
                username_ok && password_ok
            }
        }
    }
}
