use tracing::warn;

use crate::cli::{KeySourceArgs, ScopeArg};
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::{Credential, KeySourceRef};

/// Turn the mutually exclusive key source flags into a [`KeySourceRef`].
pub fn from_args(args: &KeySourceArgs, password: Option<&str>) -> Result<KeySourceRef> {
    // The secret may come from SCOPESEAL_PASSWORD, so it is not an argument error.
    if password.is_some() && args.user.is_none() {
        warn!("--password ignored without --user");
    }
    if let Some(scope) = args.scope {
        return Ok(match scope {
            ScopeArg::CurrentUser => KeySourceRef::CurrentUserScope,
            ScopeArg::LocalMachine => KeySourceRef::LocalMachineScope,
        });
    }
    if let Some(user) = &args.user {
        let secret = password.ok_or_else(|| ScopeSealError::InvalidConfig {
            detail: format!(
                "--user {user} needs a secret. Pass --password or set SCOPESEAL_PASSWORD."
            ),
        })?;
        return Ok(KeySourceRef::ImpersonatedCredential(Credential::new(
            user.as_str(),
            secret,
        )));
    }
    if let Some(cert) = &args.cert {
        return Ok(KeySourceRef::CertificateByPath(cert.clone()));
    }
    if let Some(thumbprint) = &args.thumbprint {
        return Ok(KeySourceRef::CertificateByThumbprint(thumbprint.clone()));
    }
    if let Some(path) = &args.key_file {
        return Ok(KeySourceRef::RawKeyFilePath(path.clone()));
    }
    Err(ScopeSealError::InvalidConfig {
        detail: "no key source given. Use --scope, --user, --cert, --thumbprint or --key-file."
            .into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> KeySourceArgs {
        KeySourceArgs {
            scope: None,
            user: None,
            cert: None,
            thumbprint: None,
            key_file: None,
        }
    }

    #[test]
    fn password_without_user_keeps_the_chosen_source() {
        let source = from_args(
            &KeySourceArgs {
                scope: Some(ScopeArg::LocalMachine),
                ..args()
            },
            Some("unused"),
        )
        .unwrap();
        assert!(matches!(source, KeySourceRef::LocalMachineScope));
    }

    #[test]
    fn user_without_password_is_rejected() {
        let err = from_args(
            &KeySourceArgs {
                user: Some("svc_web".into()),
                ..args()
            },
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("needs a secret"));
    }
}
