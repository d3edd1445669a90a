use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use rand::RngCore;

use crate::{
    constants::{
        MAX_COUNT_PER_PAGE, MAX_SESSION_LIFETIME_HOURS, RECIPE_COUNT_PER_PAGE,
        SESSION_LIFETIME_HOURS,
    },
    error::Error,
    pagination::PageRequest,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt_secret: Vec<u8>,
    pub session_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub page_size: i64,
}

impl Config {
    /// Reads the process environment.
    pub fn load() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| Error::Config(String::from("DATABASE_URL must be set")))?;

        let jwt_secret = match lookup("FOODGRAM_JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                log::warn!("FOODGRAM_JWT_SECRET not set, sessions won't survive a restart");
                let mut secret = vec![0u8; 64];
                rand::thread_rng().fill_bytes(&mut secret);
                secret
            }
        };

        let page_size: i64 =
            try_load(&lookup, "FOODGRAM_PAGE_SIZE", RECIPE_COUNT_PER_PAGE.to_string())?;
        if !(1..=MAX_COUNT_PER_PAGE).contains(&page_size) {
            return Err(Error::Config(format!(
                "FOODGRAM_PAGE_SIZE must be between 1 and {MAX_COUNT_PER_PAGE}"
            )));
        }

        let session_lifetime_hours: i64 = try_load(
            &lookup,
            "FOODGRAM_SESSION_HOURS",
            SESSION_LIFETIME_HOURS.to_string(),
        )?;
        if !(1..=MAX_SESSION_LIFETIME_HOURS).contains(&session_lifetime_hours) {
            return Err(Error::Config(format!(
                "FOODGRAM_SESSION_HOURS must be between 1 and {MAX_SESSION_LIFETIME_HOURS}"
            )));
        }

        Ok(Self {
            database_url,
            max_connections: try_load(&lookup, "FOODGRAM_MAX_CONNECTIONS", "5")?,
            jwt_secret,
            session_lifetime_hours,
            media_root: try_load(&lookup, "FOODGRAM_MEDIA_ROOT", "media")?,
            page_size,
        })
    }

    /// Page request whose size falls back to `page_size`.
    pub fn page_request(&self, page: Option<i64>, limit: Option<i64>) -> Result<PageRequest, Error> {
        PageRequest::new(page, limit.or(Some(self.page_size)))
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: impl Into<String>,
) -> Result<T, Error>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        let default = default.into();
        log::info!("{key} not set, using default: {default}");
        default
    });

    value.parse().map_err(|e| {
        log::warn!("Invalid {key} value: {e}");
        Error::Config(format!("Invalid {key} value: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_fill_missing_values() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/db")]))
            .unwrap();

        assert_eq!(config.max_connections, 5);
        assert_eq!(config.session_lifetime_hours, SESSION_LIFETIME_HOURS);
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.page_size, RECIPE_COUNT_PER_PAGE);
        assert_eq!(config.jwt_secret.len(), 64);
    }

    #[test]
    fn page_size_is_the_default_limit() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_PAGE_SIZE", "12"),
        ]))
        .unwrap();

        assert_eq!(config.page_request(None, None).unwrap().limit, 12);
        assert_eq!(config.page_request(Some(2), Some(3)).unwrap().offset(), 3);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn invalid_numbers_fail() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_MAX_CONNECTIONS", "many"),
        ]));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_PAGE_SIZE", "0"),
        ]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn out_of_range_values_fail() {
        for (key, value) in [
            ("FOODGRAM_PAGE_SIZE", "101"),
            ("FOODGRAM_SESSION_HOURS", "0"),
            ("FOODGRAM_SESSION_HOURS", "-1"),
            ("FOODGRAM_SESSION_HOURS", "1000000000000"),
        ] {
            let result = Config::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/db"),
                (key, value),
            ]));
            assert!(matches!(result, Err(Error::Config(_))), "{key}={value}");
        }

        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_PAGE_SIZE", "100"),
            ("FOODGRAM_SESSION_HOURS", "720"),
        ]))
        .unwrap();
        assert_eq!(config.page_request(None, None).unwrap().limit, 100);
        assert_eq!(config.session_lifetime_hours, 720);
    }

    #[test]
    fn explicit_secret_is_used() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_JWT_SECRET", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(config.jwt_secret, b"hunter2".to_vec());
    }
}
