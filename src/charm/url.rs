use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static USER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-zA-Z0-9+.\-]+$").expect("valid user regex"));
static SERIES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+([a-z0-9]+)?$").expect("valid series regex"));
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]*[a-z][a-z0-9]*)*$").expect("valid name regex")
});

/// Where a charm comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// The charm store (`cs:`).
    Store,
    /// A local repository (`local:`).
    Local,
}

impl Schema {
    pub fn as_str(self) -> &'static str {
        match self {
            Schema::Store => "cs",
            Schema::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharmUrlError {
    #[error("charm url has invalid schema: {0:?}")]
    Schema(String),
    #[error("charm url has invalid user name: {0:?}")]
    User(String),
    #[error("local charm url with user name: {0:?}")]
    LocalUser(String),
    #[error("charm url has invalid series: {0:?}")]
    Series(String),
    #[error("charm url has invalid charm name: {0:?}")]
    Name(String),
    #[error("charm url has invalid form: {0:?}")]
    Form(String),
}

/// Identity of a deployed charm, e.g. `cs:~user/precise/wordpress-12`.
///
/// The revision is optional; a url without one names "any revision".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharmUrl {
    pub schema: Schema,
    pub user: Option<String>,
    pub series: String,
    pub name: String,
    pub revision: Option<u32>,
}

impl CharmUrl {
    /// Same url pinned to `revision`.
    pub fn with_revision(&self, revision: u32) -> Self {
        CharmUrl {
            revision: Some(revision),
            ..self.clone()
        }
    }
}

impl FromStr for CharmUrl {
    type Err = CharmUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (schema, rest) = s
            .split_once(':')
            .ok_or_else(|| CharmUrlError::Schema(s.to_string()))?;
        let schema = match schema {
            "cs" => Schema::Store,
            "local" => Schema::Local,
            _ => return Err(CharmUrlError::Schema(s.to_string())),
        };

        let parts: Vec<&str> = rest.split('/').collect();
        let (user, series, name_rev) = match parts.as_slice() {
            [series, name_rev] => (None, *series, *name_rev),
            [user, series, name_rev] => {
                let user = user
                    .strip_prefix('~')
                    .ok_or_else(|| CharmUrlError::Form(s.to_string()))?;
                if !USER_RE.is_match(user) {
                    return Err(CharmUrlError::User(user.to_string()));
                }
                if schema == Schema::Local {
                    return Err(CharmUrlError::LocalUser(s.to_string()));
                }
                (Some(user.to_string()), *series, *name_rev)
            }
            _ => return Err(CharmUrlError::Form(s.to_string())),
        };

        if !SERIES_RE.is_match(series) {
            return Err(CharmUrlError::Series(series.to_string()));
        }

        let (name, revision) = split_revision(name_rev);
        if !NAME_RE.is_match(name) {
            return Err(CharmUrlError::Name(name.to_string()));
        }

        Ok(CharmUrl {
            schema,
            user,
            series: series.to_string(),
            name: name.to_string(),
            revision,
        })
    }
}

/// Split a trailing `-<digits>` revision off a charm name.
fn split_revision(name_rev: &str) -> (&str, Option<u32>) {
    if let Some((name, rev)) = name_rev.rsplit_once('-')
        && !rev.is_empty()
        && rev.bytes().all(|b| b.is_ascii_digit())
        && let Ok(rev) = rev.parse()
    {
        return (name, Some(rev));
    }
    (name_rev, None)
}

impl fmt::Display for CharmUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.schema.as_str())?;
        if let Some(user) = &self.user {
            write!(f, "~{}/", user)?;
        }
        write!(f, "{}/{}", self.series, self.name)?;
        if let Some(rev) = self.revision {
            write!(f, "-{}", rev)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_url_with_revision() {
        let url: CharmUrl = "cs:series/blah-blah-123".parse().unwrap();
        assert_eq!(url.schema, Schema::Store);
        assert_eq!(url.user, None);
        assert_eq!(url.series, "series");
        assert_eq!(url.name, "blah-blah");
        assert_eq!(url.revision, Some(123));
        assert_eq!(url.to_string(), "cs:series/blah-blah-123");
    }

    #[test]
    fn parses_user_and_missing_revision() {
        let url: CharmUrl = "cs:~joe/precise/wordpress".parse().unwrap();
        assert_eq!(url.user.as_deref(), Some("joe"));
        assert_eq!(url.revision, None);
        assert_eq!(url.to_string(), "cs:~joe/precise/wordpress");
        assert_eq!(
            url.with_revision(7).to_string(),
            "cs:~joe/precise/wordpress-7"
        );
    }

    #[test]
    fn local_urls_reject_users() {
        let err = "local:~joe/precise/wordpress".parse::<CharmUrl>().unwrap_err();
        assert!(matches!(err, CharmUrlError::LocalUser(_)));
        let url: CharmUrl = "local:trusty/mysql-1".parse().unwrap();
        assert_eq!(url.schema, Schema::Local);
    }

    #[test]
    fn rejects_malformed_urls() {
        for (input, check) in [
            ("series/name-1", "schema"),
            ("bs:series/name-1", "schema"),
            ("cs:name-1", "form"),
            ("cs:a/b/c/d", "form"),
            ("cs:joe/series/name", "form"),
            ("cs:Series/name", "series"),
            ("cs:series/1name", "name"),
            ("cs:series/name-", "name"),
        ] {
            let err = input.parse::<CharmUrl>().unwrap_err();
            let ok = match check {
                "schema" => matches!(err, CharmUrlError::Schema(_)),
                "form" => matches!(err, CharmUrlError::Form(_)),
                "series" => matches!(err, CharmUrlError::Series(_)),
                "name" => matches!(err, CharmUrlError::Name(_)),
                _ => false,
            };
            assert!(ok, "{input}: unexpected {err:?}");
        }
    }
}
