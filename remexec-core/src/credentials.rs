//! Account names and passwords for the remote host

use std::fmt;

use tracing::warn;

use crate::backend::ArgStyle;

/// A Windows account name, optionally qualified with a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username {
    pub domain: Option<String>,
    pub user: String,
}

impl Username {
    /// Parse `user`, `DOMAIN\user` or `DOMAIN/user`.
    ///
    /// Returns `None` for empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match raw.split_once(['\\', '/']) {
            Some((domain, user)) if !domain.trim().is_empty() && !user.trim().is_empty() => {
                Some(Self {
                    domain: Some(domain.trim().to_string()),
                    user: user.trim().to_string(),
                })
            }
            Some((_, user)) if !user.trim().is_empty() => Some(Self {
                domain: None,
                user: user.trim().to_string(),
            }),
            Some(_) => None,
            None => Some(Self {
                domain: None,
                user: raw.to_string(),
            }),
        }
    }

    /// Render the name the way a backend expects it.
    ///
    /// Samba and impacket take `DOMAIN/user`; psexec and paexec take
    /// `DOMAIN\user`.
    pub fn render(&self, style: ArgStyle) -> String {
        match &self.domain {
            None => self.user.clone(),
            Some(domain) => {
                let sep = match style {
                    ArgStyle::PsExec => '\\',
                    ArgStyle::WinExe | ArgStyle::Impacket => '/',
                };
                format!("{}{}{}", domain, sep, self.user)
            }
        }
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}\\{}", domain, self.user),
            None => f.write_str(&self.user),
        }
    }
}

/// Username and password handed to the backend
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<Username>,
    password: Option<String>,
}

impl Credentials {
    /// A name with no account part (`CORP\`) is anonymous and drops the
    /// password
    pub fn new(username: Option<&str>, password: Option<&str>) -> Self {
        let raw = username.map(str::trim).filter(|name| !name.is_empty());
        let parsed = raw.and_then(Username::parse);
        let mut password = password.filter(|p| !p.is_empty()).map(str::to_string);

        if let (Some(raw), None) = (raw, &parsed) {
            warn!(username = %raw, "username has no account part, connecting anonymously");
            password = None;
        }

        Self {
            username: parsed,
            password,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Same account with the password masked, for logs and dry runs
    pub fn redacted(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: self.password.as_ref().map(|_| "****".to_string()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_qualified() {
        assert_eq!(
            Username::parse("Administrator"),
            Some(Username {
                domain: None,
                user: "Administrator".into()
            })
        );

        let qualified = Username::parse(r"CORP\builder").unwrap();
        assert_eq!(qualified.domain.as_deref(), Some("CORP"));
        assert_eq!(qualified.user, "builder");

        let slashed = Username::parse("CORP/builder").unwrap();
        assert_eq!(slashed, qualified);
    }

    #[test]
    fn test_parse_blank_is_none() {
        assert_eq!(Username::parse(""), None);
        assert_eq!(Username::parse("   "), None);
        assert_eq!(Username::parse(r"CORP\"), None);
        assert_eq!(Username::parse(r"\admin").unwrap().domain, None);
    }

    #[test]
    fn test_render_per_style() {
        let name = Username::parse(r"CORP\builder").unwrap();
        assert_eq!(name.render(ArgStyle::PsExec), r"CORP\builder");
        assert_eq!(name.render(ArgStyle::WinExe), "CORP/builder");
        assert_eq!(name.render(ArgStyle::Impacket), "CORP/builder");
    }

    #[test]
    fn test_empty_password_is_absent() {
        let creds = Credentials::new(Some("admin"), Some(""));
        assert!(!creds.has_password());
        assert_eq!(creds.password(), None);
    }

    #[test]
    fn test_domain_only_name_drops_password() {
        let creds = Credentials::new(Some(r"CORP\"), Some("pw"));
        assert_eq!(creds.username, None);
        assert!(!creds.has_password());

        let args = crate::args::build_args(
            crate::backend::BackendKind::PsExec,
            "srv01",
            &creds,
            &crate::options::ExecOptions::default(),
            "ver",
        );
        assert!(!args.contains(&"-p".to_string()));
        assert!(!args.contains(&"pw".to_string()));

        let blank = Credentials::new(Some("  "), Some("pw"));
        assert_eq!(blank.password(), Some("pw"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new(Some("admin"), Some("hunter2"));
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
