//! Secret references
//!
//! Secrets live outside the engine. Compiled stages only carry references
//! to them, resolved by the cluster when a container starts.

use crate::domain::workflow::{EnvVarSource, SecretKeySelector};

/// Key under which every secret stores its value
pub const SECRET_KEY: &str = "secret";

/// Builds the environment-variable source for the secret called `secret_name`
pub fn secret_env_source(secret_name: &str) -> EnvVarSource {
    EnvVarSource {
        secret_key_ref: Some(SecretKeySelector {
            name: secret_name.to_string(),
            key: SECRET_KEY.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_env_source() {
        let source = secret_env_source("hf-token");
        let selector = source.secret_key_ref.unwrap();
        assert_eq!(selector.name, "hf-token");
        assert_eq!(selector.key, SECRET_KEY);
    }
}
