use anyhow::Context;

/// Teacher accounts used for internal testing; their data is left out of every page.
pub const DEFAULT_EXCLUDED_AUTH_IDS: &[&str] = &[
    "3", "6", "18", "64", "1466346", "1581795", "5844577", "5273215", "6317922", "175689",
    "1980922", "2051263", "2241909", "2347872", "2607842", "2988478", "3457137", "3693288",
    "3693431", "3912304", "4681737", "4813648", "5106338", "5326020", "5331581", "5722986",
    "5726715", "5740041", "6132779", "6183405", "6361801", "6447188", "6470829", "6491287",
];

const DEFAULT_MYSQL_PORT: u16 = 3306;

#[derive(Debug, Clone, PartialEq)]
pub struct DbTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbTarget {
    /// Connection description safe to log.
    pub fn redacted(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub primary: DbTarget,
    pub dashboard: Option<DbTarget>,
    pub excluded_auth_ids: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("{key} must be set to reach the platform database"))
        };
        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_PORT `{raw}` is not a port number"))?,
            None => DEFAULT_MYSQL_PORT,
        };

        let primary = DbTarget {
            host: required("DB_HOST")?,
            port,
            user: required("DB_USER")?,
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            database: required("DB_NAME")?,
        };

        let dashboard = match (
            lookup("DB_HOST_DASH"),
            lookup("DB_USER_DASH"),
            lookup("DB_DATABASE_DASH"),
        ) {
            (Some(host), Some(user), Some(database)) => Some(DbTarget {
                host,
                port,
                user,
                password: lookup("DB_PASSWORD_DASH").unwrap_or_default(),
                database,
            }),
            _ => None,
        };

        let excluded_auth_ids = match lookup("REPORT_EXCLUDED_AUTH_IDS") {
            Some(raw) => parse_id_list(&raw),
            None => DEFAULT_EXCLUDED_AUTH_IDS
                .iter()
                .map(|id| id.to_string())
                .collect(),
        };

        Ok(Self {
            primary,
            dashboard,
            excluded_auth_ids,
        })
    }
}

pub fn parse_id_list(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_primary_target_with_default_port() {
        let config = Config::from_lookup(lookup(&[
            ("DB_HOST", "db.internal"),
            ("DB_USER", "report"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "sondagem"),
        ]))
        .unwrap();

        assert_eq!(config.primary.password, "secret");
        assert_eq!(config.primary.redacted(), "report@db.internal:3306/sondagem");
        assert!(config.dashboard.is_none());
        assert_eq!(config.excluded_auth_ids.len(), DEFAULT_EXCLUDED_AUTH_IDS.len());
    }

    #[test]
    fn missing_host_is_an_error() {
        let error = Config::from_lookup(lookup(&[("DB_USER", "report"), ("DB_NAME", "x")]))
            .unwrap_err();
        assert!(error.to_string().contains("DB_HOST"));
    }

    #[test]
    fn dashboard_target_and_exclusions_are_optional_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DB_HOST", "db"),
            ("DB_USER", "report"),
            ("DB_NAME", "sondagem"),
            ("DB_HOST_DASH", "dash"),
            ("DB_USER_DASH", "viewer"),
            ("DB_DATABASE_DASH", "dashboard"),
            ("REPORT_EXCLUDED_AUTH_IDS", " 3, 6,,3 "),
        ]))
        .unwrap();

        let dashboard = config.dashboard.unwrap();
        assert_eq!(dashboard.database, "dashboard");
        assert_eq!(dashboard.password, "");
        assert_eq!(config.excluded_auth_ids, vec!["3", "6"]);
    }
}
